//! Token Counting
//!
//! Provides token estimation and per-model context limits for window management.

use std::collections::HashMap;
use std::sync::Arc;

use super::types::{ChatMessage, MessageRole};

/// Fixed cost charged for every message on top of its content (role, separators)
pub const MESSAGE_OVERHEAD_TOKENS: usize = 4;

/// Context size assumed for models missing from the table
pub const DEFAULT_CONTEXT_LIMIT: usize = 8_192;

/// Token counting interface. Results are upper-bound approximations, not exact counts.
pub trait TokenCounter: Send + Sync {
    /// Count tokens in text
    fn count_text(&self, text: &str) -> usize;

    /// Count tokens of a role-tagged message, including per-message overhead
    fn count_message(&self, _role: MessageRole, text: &str) -> usize {
        self.count_text(text) + MESSAGE_OVERHEAD_TOKENS
    }

    /// Sum of `count_message` over a list
    fn count_messages(&self, messages: &[ChatMessage]) -> usize {
        messages
            .iter()
            .map(|m| self.count_message(m.role, &m.llm_content()))
            .sum()
    }
}

/// Character-based estimator: ~4 characters per token, rounded up.
///
/// Counts Unicode scalar values so that truncation by `chars()` stays consistent
/// with the estimate.
#[derive(Debug, Clone, Copy)]
pub struct HeuristicCounter {
    chars_per_token: usize,
}

impl Default for HeuristicCounter {
    fn default() -> Self {
        Self { chars_per_token: 4 }
    }
}

impl HeuristicCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chars_per_token(&self) -> usize {
        self.chars_per_token
    }
}

impl TokenCounter for HeuristicCounter {
    fn count_text(&self, text: &str) -> usize {
        text.chars().count().div_ceil(self.chars_per_token)
    }
}

/// Create the default shared counter
pub fn create_counter() -> Arc<dyn TokenCounter> {
    Arc::new(HeuristicCounter::default())
}

/// Context-window sizes per model family, matched by longest prefix.
#[derive(Debug, Clone)]
pub struct ModelLimits {
    limits: HashMap<String, usize>,
    default_limit: usize,
}

impl Default for ModelLimits {
    fn default() -> Self {
        let known: [(&str, usize); 14] = [
            ("gpt-4o", 128_000),
            ("gpt-4o-mini", 128_000),
            ("gpt-4-turbo", 128_000),
            ("gpt-4.1", 1_000_000),
            ("gpt-4-32k", 32_768),
            ("gpt-4", 8_192),
            ("gpt-3.5-turbo", 16_385),
            ("o1", 200_000),
            ("o3", 200_000),
            ("claude-3", 200_000),
            ("claude-sonnet-4", 200_000),
            ("claude-opus-4", 200_000),
            ("gemini-1.5", 1_000_000),
            ("gemini-2.0", 1_000_000),
        ];
        Self {
            limits: known
                .into_iter()
                .map(|(name, limit)| (name.to_string(), limit))
                .collect(),
            default_limit: DEFAULT_CONTEXT_LIMIT,
        }
    }
}

impl ModelLimits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or override the limit for a model prefix
    pub fn with_limit(mut self, model_prefix: impl Into<String>, limit: usize) -> Self {
        self.limits.insert(model_prefix.into(), limit);
        self
    }

    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit;
        self
    }

    /// Context limit for a model; unknown models get the conservative default.
    pub fn limit_for(&self, model: &str) -> usize {
        self.limits
            .iter()
            .filter(|(prefix, _)| model.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, limit)| *limit)
            .unwrap_or(self.default_limit)
    }

    /// How many prior messages a caller should load for this model.
    ///
    /// Assumes ~150 tokens per message, clamped to [10, 200].
    pub fn optimal_history_limit(&self, model: &str) -> usize {
        (self.limit_for(model) / 150).clamp(10, 200)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_counting() {
        let counter = HeuristicCounter::default();

        assert_eq!(counter.count_text(""), 0);
        assert_eq!(counter.count_text("abc"), 1);
        assert_eq!(counter.count_text("abcd"), 1);
        assert_eq!(counter.count_text("abcde"), 2);

        let long_text = "The quick brown fox jumps over the lazy dog. ".repeat(10);
        let long_tokens = counter.count_text(&long_text);
        assert_eq!(long_tokens, 450usize.div_ceil(4));
    }

    #[test]
    fn test_multibyte_counts_chars() {
        let counter = HeuristicCounter::default();
        // 4 chars, 12 bytes
        assert_eq!(counter.count_text("日本語だ"), 1);
    }

    #[test]
    fn test_message_overhead() {
        let counter = HeuristicCounter::default();
        let tokens = counter.count_message(MessageRole::User, "abcdefgh");
        assert_eq!(tokens, 2 + MESSAGE_OVERHEAD_TOKENS);

        let messages = vec![ChatMessage::user("abcd"), ChatMessage::assistant("abcd")];
        assert_eq!(
            counter.count_messages(&messages),
            2 * (1 + MESSAGE_OVERHEAD_TOKENS)
        );
    }

    #[test]
    fn test_hidden_content_is_counted() {
        let counter = HeuristicCounter::default();
        let plain = ChatMessage::assistant("ok");
        let with_hidden = ChatMessage::assistant("ok").with_hidden("{\"confirmed\":true}");
        assert!(
            counter.count_messages(std::slice::from_ref(&with_hidden))
                > counter.count_messages(std::slice::from_ref(&plain))
        );
    }

    #[test]
    fn test_model_limits_prefix_match() {
        let limits = ModelLimits::default();

        assert_eq!(limits.limit_for("gpt-4o-2024-08-06"), 128_000);
        assert_eq!(limits.limit_for("gpt-4-0613"), 8_192);
        assert_eq!(limits.limit_for("gpt-4-32k-0613"), 32_768);
        assert_eq!(limits.limit_for("claude-3-5-sonnet-latest"), 200_000);
        assert_eq!(limits.limit_for("some-local-model"), DEFAULT_CONTEXT_LIMIT);
    }

    #[test]
    fn test_model_limits_override() {
        let limits = ModelLimits::default()
            .with_limit("tiny", 100)
            .with_default_limit(4_096);
        assert_eq!(limits.limit_for("tiny"), 100);
        assert_eq!(limits.limit_for("unknown"), 4_096);
    }

    #[test]
    fn test_optimal_history_limit() {
        let limits = ModelLimits::default().with_limit("tiny", 100);
        assert_eq!(limits.optimal_history_limit("tiny"), 10);
        assert_eq!(limits.optimal_history_limit("gpt-4"), 54);
        assert_eq!(limits.optimal_history_limit("gpt-4o"), 200);
    }
}
