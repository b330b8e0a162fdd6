//! Context window construction
//!
//! - **Types**: ChatMessage, MessageRole, ContextWindow
//! - **Token counting**: pluggable estimator and per-model context limits
//! - **Window**: budgeted history selection with summary substitution

pub mod token_counter;
pub mod types;
pub mod window;

pub use token_counter::{
    create_counter, HeuristicCounter, ModelLimits, TokenCounter, DEFAULT_CONTEXT_LIMIT,
    MESSAGE_OVERHEAD_TOKENS,
};
pub use types::{ChatMessage, ContextWindow, MessageRole};
pub use window::{ContextWindowBuilder, SUMMARY_MESSAGE_CHAR_CAP};
