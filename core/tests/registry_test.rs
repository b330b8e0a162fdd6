use async_trait::async_trait;
use montage_core::tools::{ContextBuilder, EndpointConfig, Tool, ToolError, ToolRegistry, ToolResult};
use montage_core::{MontageError, Result};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

struct StaticContext(&'static str);

#[async_trait]
impl ContextBuilder for StaticContext {
    async fn build_context(&self, subject_id: &str, _context_data: Option<&Value>) -> Result<String> {
        Ok(format!("{} for {}", self.0, subject_id))
    }
}

struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> String {
        "echo".to_string()
    }

    fn description(&self) -> String {
        "Echo the arguments back".to_string()
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {"text": {"type": "string"}}})
    }

    async fn call(&self, subject_id: &str, arguments: Value) -> ToolResult<Value> {
        Ok(json!({"subject": subject_id, "args": arguments}))
    }
}

struct SlowTool;

#[async_trait]
impl Tool for SlowTool {
    fn name(&self) -> String {
        "slow".to_string()
    }

    fn description(&self) -> String {
        "Never finishes in time".to_string()
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn call(&self, _subject_id: &str, _arguments: Value) -> ToolResult<Value> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(Value::Null)
    }
}

fn registry() -> ToolRegistry {
    let registry = ToolRegistry::new().with_tool_timeout(Duration::from_millis(50));
    registry.register(
        EndpointConfig::new("demo", "Demo", Arc::new(StaticContext("demo context")))
            .with_system_prompt("You are a demo.")
            .with_tool(Arc::new(EchoTool))
            .with_tool(Arc::new(SlowTool)),
    );
    registry
}

#[tokio::test]
async fn test_dispatch_by_exact_name() {
    let registry = registry();
    let result = registry
        .dispatch("demo", "echo", r#"{"text": "hi"}"#, "p1")
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.output, json!({"subject": "p1", "args": {"text": "hi"}}));

    let err = registry.dispatch("demo", "Echo", "{}", "p1").await.unwrap_err();
    assert_eq!(
        err,
        ToolError::NotFound {
            endpoint: "demo".into(),
            tool: "Echo".into()
        }
    );
}

#[tokio::test]
async fn test_unknown_endpoint_and_bad_arguments() {
    let registry = registry();
    assert_eq!(
        registry.dispatch("missing", "echo", "{}", "p1").await.unwrap_err(),
        ToolError::EndpointNotFound("missing".into())
    );
    assert!(matches!(
        registry.dispatch("demo", "echo", "\"text\"", "p1").await,
        Err(ToolError::BadArguments { .. })
    ));
    assert!(registry.tools_for("missing").is_empty());
    assert!(!registry.supports_tools("missing"));
}

#[tokio::test]
async fn test_tool_timeout() {
    let registry = registry();
    let err = registry.dispatch("demo", "slow", "", "p1").await.unwrap_err();
    assert_eq!(err, ToolError::Timeout);
}

#[tokio::test]
async fn test_context_and_reregistration() {
    let registry = registry();
    assert_eq!(
        registry.context_for("demo", "p9", None).await.unwrap(),
        "demo context for p9"
    );
    assert!(matches!(
        registry.context_for("nope", "p9", None).await,
        Err(MontageError::EndpointNotFound(_))
    ));

    registry.register(EndpointConfig::new("demo", "Demo v2", Arc::new(StaticContext("v2"))));
    let endpoint = registry.get("demo").unwrap();
    assert_eq!(endpoint.name, "Demo v2");
    assert!(!registry.supports_tools("demo"));
    assert_eq!(registry.endpoint_ids(), vec!["demo".to_string()]);
}
