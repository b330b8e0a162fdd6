pub mod builtin;
pub mod error;
pub mod registry;
pub mod traits;

// Re-export common types
pub use builtin::{register_builtin_endpoints, GENERAL_ENDPOINT, HIGHLIGHT_ORDERING_ENDPOINT};
pub use error::{ToolError, ToolResult};
pub use registry::{EndpointConfig, FunctionResult, ToolRegistry, ToolSchema};
pub use traits::{ContextBuilder, Tool};
