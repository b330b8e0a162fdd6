//! Per-session conversation state machine.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::intent::ConfirmedIntent;

/// Phase of a session's flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FlowPhase {
    /// Talking with the user until an intent is confirmed
    #[default]
    Conversation,
    /// Carrying out a confirmed intent; always returns to `Conversation`
    Execution,
}

/// In-memory state for one session
#[derive(Debug, Clone)]
pub struct ConversationFlow {
    session_id: String,
    phase: FlowPhase,
    last_intent: Option<ConfirmedIntent>,
    context: HashMap<String, String>,
    executions: u64,
    updated_at_ms: i64,
}

impl ConversationFlow {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            phase: FlowPhase::Conversation,
            last_intent: None,
            context: HashMap::new(),
            executions: 0,
            updated_at_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn phase(&self) -> FlowPhase {
        self.phase
    }

    /// Latest confirmed intent, kept after the flow resets
    pub fn last_intent(&self) -> Option<&ConfirmedIntent> {
        self.last_intent.as_ref()
    }

    /// Number of completed execution attempts
    pub fn executions(&self) -> u64 {
        self.executions
    }

    pub fn updated_at_ms(&self) -> i64 {
        self.updated_at_ms
    }

    pub fn set_context(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.context.insert(key.into(), value.into());
        self.touch();
    }

    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context.get(key).map(String::as_str)
    }

    pub fn context(&self) -> &HashMap<String, String> {
        &self.context
    }

    /// `Conversation -> Execution`. Only a confirmed intent can get here.
    pub fn begin_execution(&mut self, intent: ConfirmedIntent) {
        if self.phase == FlowPhase::Execution {
            warn!(target: "flow", session = %self.session_id, "Execution started while already executing");
        }
        debug!(target: "flow", session = %self.session_id, intent = intent.category().label(), "Entering execution phase");
        self.last_intent = Some(intent);
        self.phase = FlowPhase::Execution;
        self.touch();
    }

    /// `Execution -> Conversation`, regardless of how the attempt went
    pub fn finish_execution(&mut self) {
        if self.phase == FlowPhase::Execution {
            self.executions += 1;
        }
        self.phase = FlowPhase::Conversation;
        self.touch();
        debug!(target: "flow", session = %self.session_id, "Back to conversation phase");
    }

    fn touch(&mut self) {
        self.updated_at_ms = chrono::Utc::now().timestamp_millis();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::intent::{ConversationSummary, IntentCategory};

    fn confirmed() -> ConfirmedIntent {
        ConversationSummary {
            confirmed: true,
            ..ConversationSummary::new(IntentCategory::Reorder)
        }
        .confirm()
        .unwrap()
    }

    #[test]
    fn test_initial_state() {
        let flow = ConversationFlow::new("s1");
        assert_eq!(flow.phase(), FlowPhase::Conversation);
        assert!(flow.last_intent().is_none());
        assert_eq!(flow.session_id(), "s1");
    }

    #[test]
    fn test_execution_round_trip() {
        let mut flow = ConversationFlow::new("s1");
        flow.begin_execution(confirmed());
        assert_eq!(flow.phase(), FlowPhase::Execution);

        flow.finish_execution();
        assert_eq!(flow.phase(), FlowPhase::Conversation);
        assert_eq!(flow.executions(), 1);
        assert_eq!(
            flow.last_intent().map(|i| i.category()),
            Some(IntentCategory::Reorder)
        );
    }

    #[test]
    fn test_unconfirmed_summary_cannot_be_confirmed() {
        assert!(ConversationSummary::new(IntentCategory::Reorder)
            .confirm()
            .is_none());
    }

    #[test]
    fn test_context_map() {
        let mut flow = ConversationFlow::new("s1");
        flow.set_context("tone", "energetic");
        assert_eq!(flow.context_value("tone"), Some("energetic"));
        assert_eq!(flow.context().len(), 1);
    }
}
