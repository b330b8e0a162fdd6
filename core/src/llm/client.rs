use crate::{MontageError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error};

use super::normalize::normalize_reply;
use super::types::{LlmReply, LlmRequest, LlmTransport};

/// Configuration for LlmClient loaded from environment variables
#[derive(Debug, Clone)]
pub struct LlmClientConfig {
    pub base_url: String, // e.g., https://api.openai.com/v1
    pub model: String,    // e.g., gpt-4o-mini
    pub request_timeout_ms: u64,
    pub temperature: f32,
}

impl Default for LlmClientConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("LLM_BASE_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: std::env::var("LLM_MODEL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            request_timeout_ms: std::env::var("LLM_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60_000),
            temperature: std::env::var("LLM_TEMPERATURE")
                .ok()
                .and_then(|v| v.parse::<f32>().ok())
                .unwrap_or(0.7),
        }
    }
}

/// HTTP client for OpenAI-compatible Chat Completions backends
#[derive(Clone)]
pub struct LlmClient {
    pub(crate) http: Client,
    pub(crate) cfg: LlmClientConfig,
}

impl LlmClient {
    pub fn new(cfg: LlmClientConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(cfg.request_timeout_ms))
            .build()
            .map_err(|e| {
                MontageError::Configuration(format!("Failed to build HTTP client: {e}"))
            })?;
        Ok(Self { http, cfg })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(LlmClientConfig::default())
    }

    pub fn config(&self) -> &LlmClientConfig {
        &self.cfg
    }

    fn chat_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.cfg.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl LlmTransport for LlmClient {
    /// Contract:
    /// - Input: API key + normalized request
    /// - Output: normalized reply (text and/or tool calls)
    /// - Error: `Transport` for network/timeout/non-2xx, `Parse` for unusable bodies
    async fn complete(&self, api_key: &str, request: &LlmRequest) -> Result<LlmReply> {
        let url = self.chat_url();
        debug!(
            target: "llm_client",
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "POST {} via Chat Completions", url
        );

        let resp = self
            .http
            .post(&url)
            .header("content-type", "application/json")
            .bearer_auth(api_key)
            .json(&request.to_chat_body())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    MontageError::Transport(format!("Chat Completions request timed out: {e}"))
                } else {
                    MontageError::Transport(format!("Chat Completions HTTP error: {e}"))
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            error!(target: "llm_client", %status, body = %text, "Chat Completions error");
            return Err(MontageError::Transport(format!(
                "Chat Completions error: status={} body={}",
                status, text
            )));
        }

        let body = resp.text().await.map_err(|e| {
            MontageError::Transport(format!("Failed to read Chat Completions body: {e}"))
        })?;
        let val: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
            MontageError::parse(format!("Failed to parse Chat Completions JSON: {e}"), &body)
        })?;
        normalize_reply(&val)
    }
}
