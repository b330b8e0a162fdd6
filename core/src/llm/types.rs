//! Minimal provider-neutral request/response shapes for tool-calling chat models.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use crate::context::{ChatMessage, MessageRole};
use crate::tools::registry::ToolSchema;
use crate::{MontageError, Result};

/// How the model should use tools
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    /// Let the model decide whether to call a tool
    #[default]
    Auto,
    /// Require the model to call a tool at least once
    Required,
    /// Do not let the model call tools
    None,
}

/// A role-tagged message on the wire
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireMessage {
    pub role: MessageRole,
    pub content: String,
}

impl WireMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

impl From<&ChatMessage> for WireMessage {
    fn from(m: &ChatMessage) -> Self {
        Self {
            role: m.role,
            content: m.llm_content(),
        }
    }
}

/// Request handed to an `LlmTransport`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
}

impl LlmRequest {
    pub fn new(model: impl Into<String>, messages: Vec<WireMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: 0.7,
            max_tokens: 1024,
            tools: Vec::new(),
            tool_choice: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolSchema>, choice: ToolChoice) -> Self {
        if !tools.is_empty() {
            self.tools = tools;
            self.tool_choice = Some(choice);
        }
        self
    }

    /// OpenAI Chat Completions body
    pub fn to_chat_body(&self) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": self.messages,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });
        if !self.tools.is_empty() {
            body["tools"] = Value::Array(self.tools.iter().map(|t| t.to_function_json()).collect());
            if let Some(choice) = self.tool_choice {
                body["tool_choice"] = json!(choice);
            }
        }
        body
    }
}

/// Normalized tool call parsed from model output. `arguments` is the raw JSON text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedToolCall {
    pub id: Option<String>,
    pub name: String,
    pub arguments: String,
}

/// Normalized model reply: text, tool calls, or both
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LlmReply {
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<NormalizedToolCall>,
    pub model: Option<String>,
    pub usage: Option<Value>,
}

impl LlmReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn content_or_empty(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

/// Anything that can carry an `LlmRequest` to a model
#[async_trait]
pub trait LlmTransport: Send + Sync {
    async fn complete(&self, api_key: &str, request: &LlmRequest) -> Result<LlmReply>;
}

/// Run one completion under an explicit deadline; an elapsed deadline is a transport error
pub async fn complete_with_timeout(
    transport: &dyn LlmTransport,
    api_key: &str,
    request: &LlmRequest,
    limit: Duration,
) -> Result<LlmReply> {
    match tokio::time::timeout(limit, transport.complete(api_key, request)).await {
        Ok(reply) => reply,
        Err(_) => Err(MontageError::Transport(format!(
            "model call timed out after {} ms",
            limit.as_millis()
        ))),
    }
}

/// Source of the provider API key, consulted on every turn
pub trait ApiKeyProvider: Send + Sync {
    fn api_key(&self) -> Option<String>;
}

/// Reads the key from an environment variable
#[derive(Debug, Clone)]
pub struct EnvApiKeyProvider {
    var: String,
}

impl EnvApiKeyProvider {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvApiKeyProvider {
    fn default() -> Self {
        Self::new("OPENAI_API_KEY")
    }
}

impl ApiKeyProvider for EnvApiKeyProvider {
    fn api_key(&self) -> Option<String> {
        std::env::var(&self.var)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

/// Fixed key, e.g. loaded from the caller's settings store
#[derive(Debug, Clone, Default)]
pub struct StaticApiKeyProvider {
    key: Option<String>,
}

impl StaticApiKeyProvider {
    pub fn new(key: Option<String>) -> Self {
        Self {
            key: key.filter(|k| !k.trim().is_empty()),
        }
    }
}

impl ApiKeyProvider for StaticApiKeyProvider {
    fn api_key(&self) -> Option<String> {
        self.key.clone()
    }
}
