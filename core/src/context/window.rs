//! Window Building
//!
//! Fits a system prompt, prior history and the new user message into a model's
//! token budget. History is taken as a most-recent-first sliding window; whatever
//! falls off the front is replaced by a short summary when there is room for it.

use std::sync::Arc;

use tracing::{debug, warn};

use super::token_counter::{ModelLimits, TokenCounter, MESSAGE_OVERHEAD_TOKENS};
use super::types::{ChatMessage, ContextWindow, MessageRole};

/// Per-message character cap inside the history summary
pub const SUMMARY_MESSAGE_CHAR_CAP: usize = 200;

/// Builds bounded context windows for LLM calls
pub struct ContextWindowBuilder {
    counter: Arc<dyn TokenCounter>,
    limits: ModelLimits,
    summary_char_cap: usize,
}

impl ContextWindowBuilder {
    pub fn new(counter: Arc<dyn TokenCounter>, limits: ModelLimits) -> Self {
        Self {
            counter,
            limits,
            summary_char_cap: SUMMARY_MESSAGE_CHAR_CAP,
        }
    }

    /// Create with the heuristic counter and default model table
    pub fn with_defaults() -> Self {
        Self::new(super::token_counter::create_counter(), ModelLimits::default())
    }

    pub fn with_summary_char_cap(mut self, cap: usize) -> Self {
        self.summary_char_cap = cap;
        self
    }

    pub fn limits(&self) -> &ModelLimits {
        &self.limits
    }

    pub fn counter(&self) -> &Arc<dyn TokenCounter> {
        &self.counter
    }

    fn cost(&self, message: &ChatMessage) -> usize {
        self.counter
            .count_message(message.role, &message.llm_content())
    }

    /// Build the window for one turn.
    ///
    /// The returned `total_tokens` never exceeds `limit_for(model) - reserved_response_tokens`.
    pub fn build(
        &self,
        model: &str,
        system_prompt: &str,
        history: &[ChatMessage],
        new_user_message: &str,
        reserved_response_tokens: usize,
    ) -> ContextWindow {
        let budget = self
            .limits
            .limit_for(model)
            .saturating_sub(reserved_response_tokens);

        // The new message has priority over the system prompt when space is short
        let user = self.fit_message(MessageRole::User, new_user_message, budget);
        let user_tokens = user.as_ref().map(|m| self.cost(m)).unwrap_or(0);
        let system = self.fit_message(
            MessageRole::System,
            system_prompt,
            budget.saturating_sub(user_tokens),
        );
        let system_tokens = system.as_ref().map(|m| self.cost(m)).unwrap_or(0);

        let available_for_history = budget.saturating_sub(user_tokens + system_tokens);

        // Newest to oldest, stop at the first message that does not fit
        let mut history_tokens = 0;
        let mut start = history.len();
        for (idx, message) in history.iter().enumerate().rev() {
            let tokens = self.cost(message);
            if history_tokens + tokens > available_for_history {
                break;
            }
            history_tokens += tokens;
            start = idx;
        }
        let (excluded, included) = history.split_at(start);

        let mut summary_message = None;
        let mut summary_tokens = 0;
        if !excluded.is_empty() {
            let slack = available_for_history - history_tokens;
            let full = self.summarize(excluded);
            let compact = format!("[{} earlier messages omitted]", excluded.len());
            for candidate in [full, compact] {
                let tokens = self.counter.count_message(MessageRole::System, &candidate);
                if tokens <= slack {
                    summary_tokens = tokens;
                    summary_message = Some(candidate);
                    break;
                }
            }
            debug!(
                target: "context_window",
                trimmed = excluded.len(),
                summarized = summary_message.is_some(),
                "History trimmed to fit budget"
            );
        }

        let mut messages = Vec::with_capacity(included.len() + 3);
        messages.extend(system);
        if let Some(ref text) = summary_message {
            messages.push(ChatMessage::system(text.clone()));
        }
        messages.extend(included.iter().cloned());
        messages.extend(user);

        ContextWindow {
            messages,
            total_tokens: system_tokens + summary_tokens + history_tokens + user_tokens,
            trimmed_count: excluded.len(),
            summary: summary_message,
            budget,
        }
    }

    /// Truncate `text` so the message costs at most `max_tokens`; `None` if even an
    /// empty message would not fit.
    fn fit_message(&self, role: MessageRole, text: &str, max_tokens: usize) -> Option<ChatMessage> {
        if self.counter.count_message(role, text) <= max_tokens {
            return Some(ChatMessage::new(role, text));
        }
        if max_tokens < MESSAGE_OVERHEAD_TOKENS {
            warn!(target: "context_window", role = role.as_str(), "Message dropped: no room in budget");
            return None;
        }

        // Shrink by characters until the estimate fits
        let mut keep = text.chars().count();
        let mut truncated = String::new();
        while keep > 0 {
            keep = keep * 3 / 4;
            truncated = text.chars().take(keep).collect();
            if self.counter.count_message(role, &truncated) <= max_tokens {
                break;
            }
        }
        if self.counter.count_message(role, &truncated) > max_tokens {
            truncated.clear();
        }
        warn!(
            target: "context_window",
            role = role.as_str(),
            kept_chars = truncated.chars().count(),
            "Message truncated to fit budget"
        );
        Some(ChatMessage::new(role, truncated))
    }

    /// Plain-text digest of messages dropped from the window
    fn summarize(&self, excluded: &[ChatMessage]) -> String {
        let mut out = String::from("Summary of earlier conversation:\n");
        for message in excluded {
            let label = match message.role {
                MessageRole::User => "User asked",
                MessageRole::Assistant => "Assistant replied",
                MessageRole::System => continue,
            };
            let text = message.content.trim();
            let snippet: String = text.chars().take(self.summary_char_cap).collect();
            out.push_str("- ");
            out.push_str(label);
            out.push_str(": ");
            out.push_str(&snippet);
            if text.chars().count() > self.summary_char_cap {
                out.push('…');
            }
            out.push('\n');
        }
        out
    }
}
