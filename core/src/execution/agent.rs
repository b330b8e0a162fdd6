//! Carries out a confirmed intent: prompt, model call, structured parse, validation,
//! and the single call into `ApplyCallback`.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::output::{item_ids, parse_structured_output, validate_ordering, OrderEntry};
use super::source::{ApplyCallback, Highlight, HighlightSource};
use super::templates::{execution_input, render_execution_prompt, EXECUTION_SYSTEM_PROMPT};
use crate::config::EngineConfig;
use crate::context::MessageRole;
use crate::flow::{ConfirmedIntent, ConversationSummary, IntentCategory};
use crate::llm::{complete_with_timeout, LlmRequest, LlmTransport, WireMessage};
use crate::progress::ProgressBroadcaster;
use crate::{MontageError, Result};

// Progress steps continue the engine's numbering (1 and 2 are the conversational turn)
const STEP_LOAD: u32 = 3;
const STEP_MODEL: u32 = 4;
const STEP_VALIDATE: u32 = 5;
const STEP_APPLY: u32 = 6;

/// Class of an execution failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Configuration,
    Transport,
    Parse,
    Validation,
    Apply,
    Source,
}

impl From<&MontageError> for FailureKind {
    fn from(e: &MontageError) -> Self {
        match e {
            MontageError::Configuration(_) => FailureKind::Configuration,
            MontageError::Transport(_) => FailureKind::Transport,
            MontageError::Parse { .. } | MontageError::Serialization(_) => FailureKind::Parse,
            MontageError::Apply(_) => FailureKind::Apply,
            MontageError::Source(_) => FailureKind::Source,
            MontageError::Validation(_)
            | MontageError::Tool(_)
            | MontageError::EndpointNotFound(_)
            | MontageError::SessionNotFound(_) => FailureKind::Validation,
        }
    }
}

/// Outcome of one execution attempt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionResult {
    pub success: bool,
    pub intent: IntentCategory,
    /// Applied ordering, or the untouched original for `Analyze`. Empty on failure.
    pub new_order: Vec<OrderEntry>,
    pub reasoning: String,
    pub section_count: usize,
    pub changes: Vec<String>,
    /// Deterministic one-line description of what happened
    pub summary: String,
    /// Whether `ApplyCallback::apply` returned successfully
    pub applied: bool,
    /// User-facing error text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl ExecutionResult {
    pub fn failed(intent: IntentCategory, err: &MontageError) -> Self {
        Self {
            success: false,
            intent,
            new_order: Vec::new(),
            reasoning: String::new(),
            section_count: 0,
            changes: Vec::new(),
            summary: String::new(),
            applied: false,
            error: Some(err.user_message()),
            failure: Some(FailureKind::from(err)),
        }
    }

    /// Text for the assistant message that reports this attempt
    pub fn describe(&self) -> String {
        if !self.success {
            return self
                .error
                .clone()
                .unwrap_or_else(|| "Something went wrong and nothing was changed.".to_string());
        }
        let mut text = String::new();
        if !self.reasoning.trim().is_empty() {
            text.push_str(self.reasoning.trim());
            text.push_str("\n\n");
        }
        text.push_str(&self.summary);
        if !self.changes.is_empty() {
            text.push('\n');
            for change in &self.changes {
                text.push_str("\n- ");
                text.push_str(change);
            }
        }
        text
    }
}

/// Per-call inputs that belong to the current turn rather than the agent
pub struct ExecutionContext<'a> {
    pub api_key: &'a str,
    pub model: &'a str,
    pub progress: &'a ProgressBroadcaster,
}

/// Turns confirmed intents into validated, applied orderings
#[derive(Clone)]
pub struct ExecutionAgent {
    transport: Arc<dyn LlmTransport>,
    source: Arc<dyn HighlightSource>,
    config: EngineConfig,
}

impl ExecutionAgent {
    pub fn new(
        transport: Arc<dyn LlmTransport>,
        source: Arc<dyn HighlightSource>,
        config: EngineConfig,
    ) -> Self {
        Self {
            transport,
            source,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Execute a raw summary. Missing or unconfirmed summaries fail without a model call.
    pub async fn execute_summary(
        &self,
        summary: Option<ConversationSummary>,
        subject_id: &str,
        apply: &dyn ApplyCallback,
        ctx: &ExecutionContext<'_>,
    ) -> ExecutionResult {
        let Some(summary) = summary else {
            return ExecutionResult::failed(
                IntentCategory::default(),
                &MontageError::Validation("there is no request to carry out".into()),
            );
        };
        let category = summary.intent;
        match summary.confirm() {
            Some(intent) => self.execute(&intent, subject_id, apply, ctx).await,
            None => {
                debug!(target: "execution", subject = %subject_id, "Refusing unconfirmed intent");
                ExecutionResult::failed(
                    category,
                    &MontageError::Validation("the request has not been confirmed yet".into()),
                )
            }
        }
    }

    /// Execute a confirmed intent. Never fails: errors come back as `success == false`.
    #[tracing::instrument(skip_all, fields(subject = %subject_id, intent = intent.category().label()))]
    pub async fn execute(
        &self,
        intent: &ConfirmedIntent,
        subject_id: &str,
        apply: &dyn ApplyCallback,
        ctx: &ExecutionContext<'_>,
    ) -> ExecutionResult {
        let started = Instant::now();
        match self.run(intent, subject_id, apply, ctx).await {
            Ok(result) => {
                info!(
                    target: "execution",
                    applied = result.applied,
                    sections = result.section_count,
                    latency_ms = started.elapsed().as_millis() as u64,
                    "Execution finished"
                );
                result
            }
            Err(e) => {
                error!(target: "execution", error = %e, "Execution failed");
                ExecutionResult::failed(intent.category(), &e)
            }
        }
    }

    async fn run(
        &self,
        intent: &ConfirmedIntent,
        subject_id: &str,
        apply: &dyn ApplyCallback,
        ctx: &ExecutionContext<'_>,
    ) -> Result<ExecutionResult> {
        let category = intent.category();

        ctx.progress.update(STEP_LOAD, "Loading your highlights");
        let highlights = self.source.highlights(subject_id).await?;
        if highlights.is_empty() {
            return Err(MontageError::Validation(
                "there are no highlights to work with".into(),
            ));
        }
        let saved_order = self.source.current_order(subject_id).await?;
        let original_order: Vec<OrderEntry> = if saved_order.is_empty() {
            highlights.iter().map(|h| OrderEntry::item(h.id.as_str())).collect()
        } else {
            saved_order
        };

        let share_order = intent.use_current_order || !category.affects_order();
        let input = execution_input(
            &highlights,
            share_order.then_some(original_order.as_slice()),
            intent.summary(),
        );
        let request = LlmRequest::new(
            ctx.model,
            vec![
                WireMessage::new(MessageRole::System, EXECUTION_SYSTEM_PROMPT),
                WireMessage::new(MessageRole::User, render_execution_prompt(intent.summary(), &input)),
            ],
        )
        .with_temperature(self.config.execution_temperature)
        .with_max_tokens(self.config.execution_max_tokens);

        ctx.progress.update(STEP_MODEL, format!("Working on your {} request", category.label()));
        let reply = complete_with_timeout(
            self.transport.as_ref(),
            ctx.api_key,
            &request,
            self.config.llm_timeout(),
        )
        .await?;
        let text = reply.content.as_deref().ok_or_else(|| {
            MontageError::parse(
                "execution reply carried no text",
                format!("{:?}", reply.tool_calls),
            )
        })?;
        let output = parse_structured_output(text)?;
        if !output.success {
            let reason = output
                .error
                .clone()
                .unwrap_or_else(|| "the model could not carry out the request".into());
            warn!(target: "execution", %reason, "Model declined the request");
            return Err(MontageError::Validation(reason));
        }

        ctx.progress.update(STEP_VALIDATE, "Checking the proposed order");
        if !category.affects_order() {
            let summary = outcome_summary(category, &highlights, &original_order, &original_order);
            return Ok(ExecutionResult {
                success: true,
                intent: category,
                section_count: original_order.iter().filter(|e| e.is_section()).count(),
                new_order: original_order,
                reasoning: output.reasoning,
                changes: output.changes,
                summary,
                applied: false,
                error: None,
                failure: None,
            });
        }

        let expected: Vec<String> = highlights.iter().map(|h| h.id.clone()).collect();
        validate_ordering(&output.new_order, &expected)?;

        ctx.progress.update(STEP_APPLY, "Saving the new order");
        apply
            .apply(subject_id, &output.new_order)
            .await
            .map_err(|e| match e {
                MontageError::Apply(msg) => MontageError::Apply(msg),
                other => MontageError::Apply(other.to_string()),
            })?;

        let summary = outcome_summary(category, &highlights, &original_order, &output.new_order);
        Ok(ExecutionResult {
            success: true,
            intent: category,
            section_count: output.section_count,
            new_order: output.new_order,
            reasoning: output.reasoning,
            changes: output.changes,
            summary,
            applied: true,
            error: None,
            failure: None,
        })
    }
}

fn snippet(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

fn describe_item(highlights: &[Highlight], id: &str) -> String {
    highlights
        .iter()
        .find(|h| h.id == id)
        .map(|h| format!("\"{}\"", snippet(&h.text, 60)))
        .unwrap_or_else(|| id.to_string())
}

/// Deterministic per-category description of an outcome
fn outcome_summary(
    category: IntentCategory,
    highlights: &[Highlight],
    before: &[OrderEntry],
    after: &[OrderEntry],
) -> String {
    let before_ids = item_ids(before);
    let after_ids = item_ids(after);
    match category {
        IntentCategory::Reorder => {
            let moved = after_ids
                .iter()
                .enumerate()
                .filter(|(i, id)| before_ids.get(*i) != Some(*id))
                .count();
            let sections = after.iter().filter(|e| e.is_section()).count();
            format!(
                "Reordered {} highlights ({} moved) into {} section(s).",
                after_ids.len(),
                moved,
                sections
            )
        }
        IntentCategory::ImproveHook => match after_ids.first() {
            Some(id) => format!("The video now opens with {}.", describe_item(highlights, id)),
            None => "The opening was left empty.".to_string(),
        },
        IntentCategory::ImproveConclusion => match after_ids.last() {
            Some(id) => format!("The video now ends with {}.", describe_item(highlights, id)),
            None => "The ending was left empty.".to_string(),
        },
        IntentCategory::Analyze => format!(
            "Reviewed {} highlights; the order was left unchanged.",
            highlights.len()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn highlights() -> Vec<Highlight> {
        vec![
            Highlight::new("h1", "Welcome back to the channel", 0.0, 3.0),
            Highlight::new("h2", "The big reveal happens here", 3.0, 9.0),
            Highlight::new("h3", "Thanks for watching", 9.0, 11.0),
        ]
    }

    fn order(entries: &[&str]) -> Vec<OrderEntry> {
        entries.iter().map(|e| OrderEntry::from(*e)).collect()
    }

    #[test]
    fn test_reorder_summary_counts_moves_and_sections() {
        let before = order(&["h1", "h2", "h3"]);
        let after = order(&["--- Hook ---", "h2", "h1", "h3"]);
        let text = outcome_summary(IntentCategory::Reorder, &highlights(), &before, &after);
        assert_eq!(text, "Reordered 3 highlights (2 moved) into 1 section(s).");
    }

    #[test]
    fn test_hook_and_conclusion_summaries_name_the_item() {
        let before = order(&["h1", "h2", "h3"]);
        let after = order(&["h2", "h1", "h3"]);
        let hook = outcome_summary(IntentCategory::ImproveHook, &highlights(), &before, &after);
        assert!(hook.contains("The big reveal"));
        let end = outcome_summary(IntentCategory::ImproveConclusion, &highlights(), &before, &after);
        assert!(end.contains("Thanks for watching"));
    }

    #[test]
    fn test_snippet_truncates_on_char_boundary() {
        assert_eq!(snippet("héllo wörld", 5), "héllo...");
        assert_eq!(snippet("short", 10), "short");
    }

    #[test]
    fn test_failure_kind_mapping_and_describe() {
        let result = ExecutionResult::failed(
            IntentCategory::Reorder,
            &MontageError::Validation("missing h2".into()),
        );
        assert_eq!(result.failure, Some(FailureKind::Validation));
        assert!(!result.applied);
        assert!(result.describe().contains("missing h2"));
    }
}
