//! Built-in endpoints: `highlight_ordering` (context + ordering tools) and `general`.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{info, warn};

use super::error::{ToolError, ToolResult};
use super::registry::{EndpointConfig, ToolRegistry};
use super::traits::{ContextBuilder, Tool};
use crate::execution::{validate_ordering, ApplyCallback, HighlightSource, OrderEntry};
use crate::MontageError;

pub const HIGHLIGHT_ORDERING_ENDPOINT: &str = "highlight_ordering";
pub const GENERAL_ENDPOINT: &str = "general";

pub const HIGHLIGHT_ORDERING_PROMPT: &str = r#"You are a video editing assistant that helps the user arrange the highlights of their project into a compelling order.

Talk with the user until you understand what they want. Ask short clarifying questions when the goal is unclear. Supported requests:
- reorder: arrange all highlights into the best narrative, optionally with sections
- improve_hook: make the opening stronger
- improve_conclusion: make the ending stronger
- analyze: review the current structure without changing it

Before anything changes, restate the plan and ask the user to confirm. When (and only when) the user has clearly confirmed, end your reply with a fenced JSON block:

```json
{"conversation_summary": {"intent": "reorder", "use_current_order": true, "optimization_goals": "...", "specific_requests": ["..."], "context_notes": "...", "confirmed": true}}
```

Never include that block with "confirmed": true before the user agreed. Keep replies brief and friendly."#;

pub const GENERAL_PROMPT: &str = "You are a helpful assistant inside a video editing application. \
Answer questions about the user's project clearly and briefly.";

fn source_error(e: MontageError) -> ToolError {
    ToolError::ExecutionFailed(e.to_string())
}

fn format_timestamp(secs: f64) -> String {
    let total = secs.max(0.0).round() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

/// Highlights with ids, timings and text, plus the saved order
pub struct HighlightOrderingContext {
    source: Arc<dyn HighlightSource>,
}

impl HighlightOrderingContext {
    pub fn new(source: Arc<dyn HighlightSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl ContextBuilder for HighlightOrderingContext {
    async fn build_context(
        &self,
        subject_id: &str,
        context_data: Option<&Value>,
    ) -> crate::Result<String> {
        let highlights = self.source.highlights(subject_id).await?;
        let order = self.source.current_order(subject_id).await?;

        let mut out = String::new();
        if highlights.is_empty() {
            out.push_str("The project has no highlights yet.\n");
        } else {
            let _ = writeln!(out, "Highlights ({}):", highlights.len());
            for h in &highlights {
                let _ = writeln!(
                    out,
                    "- [{}] {}-{} ({:.1}s): {}",
                    h.id,
                    format_timestamp(h.start_secs),
                    format_timestamp(h.end_secs),
                    h.duration_secs(),
                    h.text.trim()
                );
            }
        }
        if order.is_empty() {
            out.push_str("\nNo custom order has been saved; highlights play in the order listed.\n");
        } else {
            let rendered: Vec<String> = order.iter().cloned().map(String::from).collect();
            let _ = writeln!(out, "\nCurrent order: {}", rendered.join(", "));
        }
        if let Some(extra) = context_data.filter(|v| !v.is_null()) {
            let _ = writeln!(out, "\nAdditional context: {}", extra);
        }
        Ok(out)
    }
}

/// Short project overview
pub struct GeneralContext {
    source: Arc<dyn HighlightSource>,
}

impl GeneralContext {
    pub fn new(source: Arc<dyn HighlightSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl ContextBuilder for GeneralContext {
    async fn build_context(
        &self,
        subject_id: &str,
        _context_data: Option<&Value>,
    ) -> crate::Result<String> {
        let highlights = self.source.highlights(subject_id).await?;
        let total: f64 = highlights.iter().map(|h| h.duration_secs()).sum();
        Ok(format!(
            "The project has {} highlights totalling {}.",
            highlights.len(),
            format_timestamp(total)
        ))
    }
}

pub struct GetHighlightsTool {
    source: Arc<dyn HighlightSource>,
}

impl GetHighlightsTool {
    pub fn new(source: Arc<dyn HighlightSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Tool for GetHighlightsTool {
    fn name(&self) -> String {
        "get_highlights".to_string()
    }

    fn description(&self) -> String {
        "List all highlights of the project with ids, timings and text".to_string()
    }

    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn call(&self, subject_id: &str, _arguments: Value) -> ToolResult<Value> {
        let highlights = self.source.highlights(subject_id).await.map_err(source_error)?;
        Ok(json!({ "highlights": highlights }))
    }
}

pub struct GetCurrentOrderTool {
    source: Arc<dyn HighlightSource>,
}

impl GetCurrentOrderTool {
    pub fn new(source: Arc<dyn HighlightSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Tool for GetCurrentOrderTool {
    fn name(&self) -> String {
        "get_current_order".to_string()
    }

    fn description(&self) -> String {
        "Return the saved order of highlight ids and section markers".to_string()
    }

    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn call(&self, subject_id: &str, _arguments: Value) -> ToolResult<Value> {
        let order = self.source.current_order(subject_id).await.map_err(source_error)?;
        Ok(json!({ "order": order }))
    }
}

/// Validates a full permutation, then hands it to the apply callback
pub struct ReorderHighlightsTool {
    source: Arc<dyn HighlightSource>,
    applier: Arc<dyn ApplyCallback>,
}

impl ReorderHighlightsTool {
    pub fn new(source: Arc<dyn HighlightSource>, applier: Arc<dyn ApplyCallback>) -> Self {
        Self { source, applier }
    }
}

#[async_trait]
impl Tool for ReorderHighlightsTool {
    fn name(&self) -> String {
        "reorder_highlights".to_string()
    }

    fn description(&self) -> String {
        "Replace the project's order. Must list every highlight id exactly once; \
         strings starting with '---' are section markers."
            .to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "new_order": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Highlight ids and '--- Title ---' section markers, in order"
                }
            },
            "required": ["new_order"]
        })
    }

    async fn call(&self, subject_id: &str, arguments: Value) -> ToolResult<Value> {
        let raw = arguments
            .get("new_order")
            .cloned()
            .ok_or_else(|| ToolError::BadArguments {
                tool: self.name(),
                message: "missing 'new_order'".to_string(),
            })?;
        let new_order: Vec<OrderEntry> =
            serde_json::from_value(raw).map_err(|e| ToolError::BadArguments {
                tool: self.name(),
                message: format!("'new_order' must be a list of strings: {e}"),
            })?;

        let highlights = self.source.highlights(subject_id).await.map_err(source_error)?;
        let expected: Vec<String> = highlights.into_iter().map(|h| h.id).collect();
        validate_ordering(&new_order, &expected).map_err(|e| {
            warn!(target: "tool_registry", subject = %subject_id, error = %e, "Rejected reorder");
            ToolError::ExecutionFailed(e.to_string())
        })?;

        self.applier
            .apply(subject_id, &new_order)
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        let sections = new_order.iter().filter(|e| e.is_section()).count();
        info!(target: "tool_registry", subject = %subject_id, items = expected.len(), sections, "Order replaced");
        Ok(json!({ "applied": true, "items": expected.len(), "sections": sections }))
    }
}

/// Register `highlight_ordering` and `general`
pub fn register_builtin_endpoints(
    registry: &ToolRegistry,
    source: Arc<dyn HighlightSource>,
    applier: Arc<dyn ApplyCallback>,
) {
    registry.register(
        EndpointConfig::new(
            HIGHLIGHT_ORDERING_ENDPOINT,
            "Highlight ordering",
            Arc::new(HighlightOrderingContext::new(source.clone())),
        )
        .with_description("Arrange highlights into a story, strengthen the hook or ending, or review the structure")
        .with_system_prompt(HIGHLIGHT_ORDERING_PROMPT)
        .with_tool(Arc::new(GetHighlightsTool::new(source.clone())))
        .with_tool(Arc::new(GetCurrentOrderTool::new(source.clone())))
        .with_tool(Arc::new(ReorderHighlightsTool::new(source.clone(), applier))),
    );
    registry.register(
        EndpointConfig::new(GENERAL_ENDPOINT, "General", Arc::new(GeneralContext::new(source)))
            .with_description("General questions about the project")
            .with_system_prompt(GENERAL_PROMPT),
    );
}
