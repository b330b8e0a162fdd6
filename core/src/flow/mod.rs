//! Conversation flow: the two-phase state machine that turns chat into action.
//!
//! ```text
//!   Conversation --[confirmed intent]--> Execution
//!        ^                                   |
//!        +-------[attempt complete]----------+
//! ```

pub mod controller;
pub mod intent;
pub mod state;

pub use controller::FlowController;
pub use intent::{
    extract_intent, fenced_blocks, last_fenced_block, ConfirmedIntent, ConversationSummary,
    FencedBlock, IntentCategory, IntentExtraction,
};
pub use state::{ConversationFlow, FlowPhase};
