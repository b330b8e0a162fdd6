use super::error::{ToolError, ToolResult};
use super::traits::{ContextBuilder, Tool};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Default per-tool execution timeout
pub const DEFAULT_TOOL_TIMEOUT_MS: u64 = 30_000;

/// A conversational capability profile: prompt, context strategy and tool set
pub struct EndpointConfig {
    pub id: String,
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    pub context_builder: Arc<dyn ContextBuilder>,
    pub tools: Vec<Arc<dyn Tool>>,
}

impl EndpointConfig {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        context_builder: Arc<dyn ContextBuilder>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            system_prompt: String::new(),
            context_builder,
            tools: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    /// Exact-name lookup
    pub fn find_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }
}

impl std::fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("tools", &self.tools.iter().map(|t| t.name()).collect::<Vec<_>>())
            .finish()
    }
}

/// Tool description as exposed to the LLM
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSchema {
    /// OpenAI-style `tools[]` entry
    pub fn to_function_json(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// Outcome of a single tool dispatch, reported back to the caller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionResult {
    pub tool: String,
    pub success: bool,
    #[serde(default)]
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub latency_ms: f64,
}

impl FunctionResult {
    pub fn failed(tool: impl Into<String>, error: &ToolError) -> Self {
        Self {
            tool: tool.into(),
            success: false,
            output: Value::Null,
            error: Some(error.to_string()),
            latency_ms: 0.0,
        }
    }
}

/// A registry of endpoints and the tools each one exposes.
///
/// Registration happens at startup; afterwards the registry is read-mostly and
/// shared across sessions.
#[derive(Clone)]
pub struct ToolRegistry {
    endpoints: Arc<DashMap<String, Arc<EndpointConfig>>>,
    tool_timeout: Duration,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            endpoints: Arc::new(DashMap::new()),
            tool_timeout: Duration::from_millis(DEFAULT_TOOL_TIMEOUT_MS),
        }
    }

    pub fn with_tool_timeout(mut self, tool_timeout: Duration) -> Self {
        self.tool_timeout = tool_timeout;
        self
    }

    /// Register an endpoint; an existing endpoint with the same id is replaced
    pub fn register(&self, endpoint: EndpointConfig) {
        let id = endpoint.id.clone();
        info!(target: "tool_registry", endpoint = %id, tools = endpoint.tools.len(), "Registering endpoint");

        if self.endpoints.insert(id.clone(), Arc::new(endpoint)).is_some() {
            debug!(target: "tool_registry", endpoint = %id, "Replaced existing endpoint");
        }
    }

    /// Get an endpoint by id
    pub fn get(&self, endpoint_id: &str) -> Option<Arc<EndpointConfig>> {
        self.endpoints.get(endpoint_id).map(|e| e.clone())
    }

    /// Ids of all registered endpoints
    pub fn endpoint_ids(&self) -> Vec<String> {
        self.endpoints.iter().map(|e| e.key().clone()).collect()
    }

    /// Render the endpoint's context block for a subject
    pub async fn context_for(
        &self,
        endpoint_id: &str,
        subject_id: &str,
        context_data: Option<&Value>,
    ) -> crate::Result<String> {
        let endpoint = self
            .get(endpoint_id)
            .ok_or_else(|| crate::MontageError::EndpointNotFound(endpoint_id.to_string()))?;
        endpoint
            .context_builder
            .build_context(subject_id, context_data)
            .await
    }

    /// Schemas of the endpoint's tools; empty for unknown endpoints
    pub fn tools_for(&self, endpoint_id: &str) -> Vec<ToolSchema> {
        self.get(endpoint_id)
            .map(|e| {
                e.tools
                    .iter()
                    .map(|t| ToolSchema {
                        name: t.name(),
                        description: t.description(),
                        parameters: t.parameters(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn supports_tools(&self, endpoint_id: &str) -> bool {
        self.get(endpoint_id)
            .map(|e| !e.tools.is_empty())
            .unwrap_or(false)
    }

    /// Call a tool by name with a JSON-object argument string, under timeout
    #[tracing::instrument(skip(self, arguments), fields(tool.name = %tool_name))]
    pub async fn dispatch(
        &self,
        endpoint_id: &str,
        tool_name: &str,
        arguments: &str,
        subject_id: &str,
    ) -> ToolResult<FunctionResult> {
        let start_time = Instant::now();

        let endpoint = self
            .get(endpoint_id)
            .ok_or_else(|| ToolError::EndpointNotFound(endpoint_id.to_string()))?;
        let tool = endpoint
            .find_tool(tool_name)
            .ok_or_else(|| ToolError::NotFound {
                endpoint: endpoint_id.to_string(),
                tool: tool_name.to_string(),
            })?;
        let args = parse_arguments(tool_name, arguments)?;

        debug!(target: "tool_registry", endpoint = %endpoint_id, tool = %tool_name, "Invoking tool");

        let result = match timeout(self.tool_timeout, tool.call(subject_id, args)).await {
            Ok(res) => res,
            Err(_) => {
                warn!(target: "tool_registry", tool = %tool_name, "Tool execution timed out");
                Err(ToolError::Timeout)
            }
        };

        let latency_ms = start_time.elapsed().as_secs_f64() * 1000.0;
        match result {
            Ok(output) => {
                info!(target: "tool_registry", tool = %tool_name, latency_ms, "Tool execution finished");
                Ok(FunctionResult {
                    tool: tool_name.to_string(),
                    success: true,
                    output,
                    error: None,
                    latency_ms,
                })
            }
            Err(e) => {
                warn!(target: "tool_registry", tool = %tool_name, error = %e, "Tool execution failed");
                Err(e)
            }
        }
    }
}

/// Parse tool arguments. Blank input means "no arguments"; anything else must be a JSON object.
fn parse_arguments(tool_name: &str, arguments: &str) -> ToolResult<Value> {
    let trimmed = arguments.trim();
    if trimmed.is_empty() {
        return Ok(json!({}));
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(v @ Value::Object(_)) => Ok(v),
        Ok(other) => Err(ToolError::BadArguments {
            tool: tool_name.to_string(),
            message: format!("expected a JSON object, got {}", json_kind(&other)),
        }),
        Err(e) => Err(ToolError::BadArguments {
            tool: tool_name.to_string(),
            message: e.to_string(),
        }),
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_arguments() {
        assert_eq!(parse_arguments("t", "").unwrap(), json!({}));
        assert_eq!(parse_arguments("t", "{\"a\":1}").unwrap(), json!({"a": 1}));
        assert!(matches!(
            parse_arguments("t", "{not json"),
            Err(ToolError::BadArguments { .. })
        ));
        assert!(matches!(
            parse_arguments("t", "[1,2]"),
            Err(ToolError::BadArguments { .. })
        ));
    }

    #[test]
    fn test_tool_schema_json() {
        let schema = ToolSchema {
            name: "get_highlights".into(),
            description: "List highlights".into(),
            parameters: json!({"type": "object", "properties": {}}),
        };
        let v = schema.to_function_json();
        assert_eq!(v["type"], "function");
        assert_eq!(v["function"]["name"], "get_highlights");
    }
}
