//! LLM module: transport contract, HTTP client, and response normalization
//!
//! This module provides:
//! - `LlmRequest`, `LlmReply`, `LlmTransport`: the minimal tool-calling contract
//! - `LlmClient`, `LlmClientConfig` for talking to OpenAI-compatible backends
//! - `normalize_reply` for folding provider response shapes into `LlmReply`
//! - `ApiKeyProvider` implementations

mod client;
pub mod normalize;
mod types;

pub use client::{LlmClient, LlmClientConfig};
pub use normalize::{normalize_reply, parse_tool_calls_from_chat, parse_tool_calls_from_responses};
pub use types::{
    complete_with_timeout, ApiKeyProvider, EnvApiKeyProvider, LlmReply, LlmRequest, LlmTransport, NormalizedToolCall,
    StaticApiKeyProvider, ToolChoice, WireMessage,
};
