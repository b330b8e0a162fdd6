// Montage Core Library
// Conversational orchestration engine for highlight ordering

pub mod config;
pub mod context;
pub mod engine;
pub mod execution;
pub mod flow;
pub mod llm;
pub mod progress;
pub mod telemetry;
pub mod tools;

// Export core types
pub use config::EngineConfig;
pub use context::{ChatMessage, ContextWindow, ContextWindowBuilder, MessageRole, ModelLimits};
pub use engine::{ChatEngine, ChatRequest, ChatResponse, HistoryProvider};
pub use execution::{
    ApplyCallback, ExecutionAgent, ExecutionContext, ExecutionResult, FailureKind, Highlight,
    HighlightSource, OrderEntry,
};
pub use flow::{
    ConfirmedIntent, ConversationFlow, ConversationSummary, FlowController, FlowPhase,
    IntentCategory,
};
pub use llm::{
    ApiKeyProvider, EnvApiKeyProvider, LlmClient, LlmClientConfig, LlmReply, LlmRequest,
    LlmTransport, StaticApiKeyProvider,
};
pub use progress::{
    ChannelProgressSink, NoopProgressSink, ProgressBroadcaster, ProgressEvent, ProgressSink,
    TracingProgressSink,
};
pub use tools::{EndpointConfig, FunctionResult, ToolError, ToolRegistry};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MontageError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Parse error: {message}")]
    Parse { message: String, payload: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Apply error: {0}")]
    Apply(String),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Endpoint not found: {0}")]
    EndpointNotFound(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Highlight source error: {0}")]
    Source(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MontageError {
    pub fn parse(message: impl Into<String>, payload: impl Into<String>) -> Self {
        MontageError::Parse {
            message: message.into(),
            payload: payload.into(),
        }
    }

    /// Short, non-technical text shown to the end user. Full detail stays in the logs.
    pub fn user_message(&self) -> String {
        match self {
            MontageError::Configuration(_) => {
                "The assistant is not configured yet. Please add an API key in settings.".into()
            }
            MontageError::Transport(_) => {
                "The assistant could not be reached. Please try again in a moment.".into()
            }
            MontageError::Parse { .. } | MontageError::Serialization(_) => {
                "The assistant returned an answer that could not be understood. Please try again."
                    .into()
            }
            MontageError::Validation(detail) => {
                format!("The proposed change was rejected and nothing was modified: {detail}")
            }
            MontageError::Apply(_) => {
                "The new order could not be saved. Your highlights were left unchanged.".into()
            }
            MontageError::Tool(e) => format!("An action failed: {e}"),
            MontageError::EndpointNotFound(id) => format!("Unknown assistant '{id}'."),
            MontageError::SessionNotFound(_) => "This conversation no longer exists.".into(),
            MontageError::Source(_) => "Your highlights could not be loaded.".into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MontageError>;
