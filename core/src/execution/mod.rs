//! Execution pipeline: confirmed intent in, validated and applied ordering out.

pub mod agent;
pub mod output;
pub mod source;
pub mod templates;

pub use agent::{ExecutionAgent, ExecutionContext, ExecutionResult, FailureKind};
pub use output::{
    extract_json_object, item_ids, parse_structured_output, validate_ordering, OrderEntry,
    StructuredExecutionOutput,
};
pub use source::{ApplyCallback, Highlight, HighlightSource};
