//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::tools::registry::DEFAULT_TOOL_TIMEOUT_MS;

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

/// Knobs for conversation and execution turns
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Tokens kept free for the model's answer; also the conversation `max_tokens`
    pub reserved_response_tokens: usize,

    /// Temperature for conversational replies
    pub conversation_temperature: f32,

    /// Temperature for execution calls (kept low for stable JSON)
    pub execution_temperature: f32,

    /// `max_tokens` for execution calls
    pub execution_max_tokens: u32,

    /// Deadline for a single model call in milliseconds
    pub llm_timeout_ms: u64,

    /// Deadline for a single tool invocation in milliseconds
    pub tool_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reserved_response_tokens: env_parse("MONTAGE_RESERVED_RESPONSE_TOKENS").unwrap_or(1_000),
            conversation_temperature: env_parse("MONTAGE_CONVERSATION_TEMPERATURE").unwrap_or(0.7),
            execution_temperature: env_parse("MONTAGE_EXECUTION_TEMPERATURE").unwrap_or(0.2),
            execution_max_tokens: env_parse("MONTAGE_EXECUTION_MAX_TOKENS").unwrap_or(2_000),
            llm_timeout_ms: env_parse("MONTAGE_LLM_TIMEOUT_MS").unwrap_or(60_000),
            tool_timeout_ms: env_parse("MONTAGE_TOOL_TIMEOUT_MS").unwrap_or(DEFAULT_TOOL_TIMEOUT_MS),
        }
    }
}

impl EngineConfig {
    pub fn with_reserved_response_tokens(mut self, tokens: usize) -> Self {
        self.reserved_response_tokens = tokens;
        self
    }

    pub fn with_conversation_temperature(mut self, temperature: f32) -> Self {
        self.conversation_temperature = temperature;
        self
    }

    pub fn with_execution_temperature(mut self, temperature: f32) -> Self {
        self.execution_temperature = temperature;
        self
    }

    pub fn with_execution_max_tokens(mut self, max_tokens: u32) -> Self {
        self.execution_max_tokens = max_tokens;
        self
    }

    pub fn with_llm_timeout_ms(mut self, ms: u64) -> Self {
        self.llm_timeout_ms = ms;
        self
    }

    pub fn with_tool_timeout_ms(mut self, ms: u64) -> Self {
        self.tool_timeout_ms = ms;
        self
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_millis(self.llm_timeout_ms)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }

    /// `max_tokens` for conversational calls
    pub fn conversation_max_tokens(&self) -> u32 {
        u32::try_from(self.reserved_response_tokens).unwrap_or(u32::MAX)
    }
}
