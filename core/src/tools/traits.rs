use super::error::ToolResult;
use async_trait::async_trait;
use serde_json::Value;

/// A named, schema-described callable the LLM may invoke instead of replying in prose
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of the tool within its endpoint (e.g., "reorder_highlights")
    fn name(&self) -> String;

    /// A human-readable description of what the tool does
    fn description(&self) -> String;

    /// The JSON Schema for the tool's arguments
    fn parameters(&self) -> Value;

    /// Execute the tool against a subject (project) with already-parsed arguments
    async fn call(&self, subject_id: &str, arguments: Value) -> ToolResult<Value>;
}

/// Strategy producing the endpoint-specific context block appended to the system prompt
#[async_trait]
pub trait ContextBuilder: Send + Sync {
    /// Render context for a subject. `context_data` is the caller-supplied payload
    /// from the inbound request, if any.
    async fn build_context(
        &self,
        subject_id: &str,
        context_data: Option<&Value>,
    ) -> crate::Result<String>;
}
