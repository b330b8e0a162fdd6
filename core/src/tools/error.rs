use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("Endpoint not found: {0}")]
    EndpointNotFound(String),

    #[error("Tool not found: {tool} (endpoint {endpoint})")]
    NotFound { endpoint: String, tool: String },

    #[error("Bad arguments for {tool}: {message}")]
    BadArguments { tool: String, message: String },

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Timeout")]
    Timeout,
}

pub type ToolResult<T> = Result<T, ToolError>;
