use std::fs;
use std::path::{Path, PathBuf};

use montage_core::tools::HIGHLIGHT_ORDERING_ENDPOINT;

/// Settings for the terminal demo
#[derive(Clone, Debug)]
pub struct ChatDemoConfig {
    pub subject_id: String,
    pub endpoint_id: String,
    pub model: String,
    pub highlights_path: PathBuf,
    /// Environment variable holding the provider key
    pub api_key_env: String,
    pub progress_buffer: usize,
}

impl Default for ChatDemoConfig {
    fn default() -> Self {
        Self {
            subject_id: std::env::var("HIGHLIGHT_CHAT_PROJECT")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "demo-project".to_string()),
            endpoint_id: HIGHLIGHT_ORDERING_ENDPOINT.to_string(),
            model: std::env::var("LLM_MODEL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            highlights_path: std::env::var("HIGHLIGHT_CHAT_HIGHLIGHTS")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("demo/highlight_chat/highlights.sample.json")),
            api_key_env: "OPENAI_API_KEY".to_string(),
            progress_buffer: 64,
        }
    }
}

impl ChatDemoConfig {
    /// Load from a TOML file (path via HIGHLIGHT_CHAT_CONFIG or ./highlight_chat.toml),
    /// overlaying values onto env-driven defaults.
    pub fn load() -> Self {
        let default = Self::default();
        let path =
            std::env::var("HIGHLIGHT_CHAT_CONFIG").unwrap_or_else(|_| "highlight_chat.toml".into());
        let p = Path::new(&path);
        if !p.exists() {
            tracing::info!(target: "highlight_chat", path = %path, "No TOML config found; using defaults/env");
            return default;
        }
        match fs::read_to_string(p) {
            Ok(s) => match toml::from_str::<ChatDemoToml>(&s) {
                Ok(t) => t.overlay(default),
                Err(e) => {
                    tracing::warn!(target: "highlight_chat", error = %e, "Failed to parse TOML; using defaults");
                    default
                }
            },
            Err(e) => {
                tracing::warn!(target: "highlight_chat", error = %e, "Failed to read TOML; using defaults");
                default
            }
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct ChatDemoToml {
    subject_id: Option<String>,
    endpoint_id: Option<String>,
    model: Option<String>,
    highlights_path: Option<PathBuf>,
    api_key_env: Option<String>,
    progress_buffer: Option<usize>,
}

impl ChatDemoToml {
    fn overlay(self, mut base: ChatDemoConfig) -> ChatDemoConfig {
        if let Some(v) = self.subject_id {
            base.subject_id = v;
        }
        if let Some(v) = self.endpoint_id {
            base.endpoint_id = v;
        }
        if let Some(v) = self.model {
            base.model = v;
        }
        if let Some(v) = self.highlights_path {
            base.highlights_path = v;
        }
        if let Some(v) = self.api_key_env {
            base.api_key_env = v;
        }
        if let Some(v) = self.progress_buffer {
            base.progress_buffer = v;
        }
        base
    }
}
