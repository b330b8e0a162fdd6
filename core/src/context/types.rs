//! Core types for the context system.
//!
//! - ChatMessage: one immutable entry of a session's message log
//! - ContextWindow: the bounded message list sent to the LLM for one turn

use serde::{Deserialize, Serialize};

/// Roles for messages in conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

/// A message in a session's log.
///
/// Messages are append-only: once created they are never edited. `hidden_content`
/// carries internal material (e.g. a confirmed intent payload) that the UI does not
/// show but that is replayed to the LLM as part of history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden_content: Option<String>,
    pub timestamp_ms: i64,
}

impl ChatMessage {
    /// Create a new message with a generated id
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            role,
            content: content.into(),
            hidden_content: None,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn with_hidden(mut self, hidden: impl Into<String>) -> Self {
        self.hidden_content = Some(hidden.into());
        self
    }

    /// Text as the LLM should see it: visible content followed by any hidden content.
    pub fn llm_content(&self) -> String {
        match &self.hidden_content {
            Some(hidden) if !hidden.is_empty() => format!("{}\n\n{}", self.content, hidden),
            _ => self.content.clone(),
        }
    }
}

/// Generate a unique id from the current timestamp plus a process-wide counter
pub(crate) fn new_message_id() -> String {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("msg-{}-{}", chrono::Utc::now().timestamp_millis(), counter)
}

/// The bounded, ordered message list for a single LLM call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextWindow {
    /// System prompt, optional summary, history suffix, new user message
    pub messages: Vec<ChatMessage>,

    /// Estimated tokens of `messages`
    pub total_tokens: usize,

    /// Number of history messages left out of the window
    pub trimmed_count: usize,

    /// Summary text substituted for the trimmed history, if it fit
    pub summary: Option<String>,

    /// Budget the window was built against
    pub budget: usize,
}

impl ContextWindow {
    pub fn was_trimmed(&self) -> bool {
        self.trimmed_count > 0
    }
}
