//! Intent-specific instruction templates for the execution call.

use serde_json::{json, Value};

use super::output::OrderEntry;
use super::source::Highlight;
use crate::flow::{ConversationSummary, IntentCategory};

pub const EXECUTION_SYSTEM_PROMPT: &str = "You are an expert video editor who arranges \
highlight clips into compelling stories. You answer with a single JSON object and nothing else.";

const ORDER_OUTPUT_SHAPE: &str = r#"Respond with JSON of exactly this shape:
{
  "success": true,
  "new_order": ["<highlight id>", "--- <Section title> ---", "<highlight id>", ...],
  "reasoning": "<why this order works, 2-4 sentences>",
  "section_count": <number of section markers>,
  "changes": ["<one short line per notable change>"]
}
Rules:
- "new_order" must contain EVERY highlight id from the input exactly once.
- Do not invent ids. Section markers are optional strings starting with "---".
- If the request cannot be fulfilled, set "success" to false and explain in "error"."#;

const ANALYSIS_OUTPUT_SHAPE: &str = r#"Respond with JSON of exactly this shape:
{
  "success": true,
  "new_order": [],
  "reasoning": "<overall assessment of the current structure>",
  "section_count": 0,
  "changes": ["<one concrete suggestion per line>"]
}
Do not propose a new order; leave "new_order" empty."#;

fn instructions(category: IntentCategory) -> &'static str {
    match category {
        IntentCategory::Reorder => {
            "Reorder the highlights into the strongest narrative. Group related moments, \
keep a clear arc from setup to payoff, and add section markers where the topic shifts."
        }
        IntentCategory::ImproveHook => {
            "Improve the opening. Choose the highlight that grabs attention fastest and move it \
to the very start; adjust the next one or two positions if that makes the opening flow. \
Keep the rest of the order as intact as possible."
        }
        IntentCategory::ImproveConclusion => {
            "Improve the ending. Choose the highlight that gives the most satisfying payoff or \
call to action and move it to the very end; adjust the preceding one or two positions if \
needed. Keep the rest of the order as intact as possible."
        }
        IntentCategory::Analyze => {
            "Analyze the current structure of the highlights: pacing, narrative flow, opening \
strength and ending strength. Suggest improvements but do not change anything."
        }
    }
}

fn output_shape(category: IntentCategory) -> &'static str {
    if category.affects_order() {
        ORDER_OUTPUT_SHAPE
    } else {
        ANALYSIS_OUTPUT_SHAPE
    }
}

/// Structured input handed to the model
pub fn execution_input(
    highlights: &[Highlight],
    current_order: Option<&[OrderEntry]>,
    summary: &ConversationSummary,
) -> Value {
    let items: Vec<Value> = highlights
        .iter()
        .map(|h| {
            json!({
                "id": h.id,
                "text": h.text,
                "duration_secs": (h.duration_secs() * 10.0).round() / 10.0,
                "source": h.source,
            })
        })
        .collect();

    let mut input = json!({
        "highlights": items,
        "request": {
            "optimization_goals": summary.optimization_goals,
            "specific_requests": summary.specific_requests,
            "context_notes": summary.context_notes,
        },
    });
    if let Some(order) = current_order {
        input["current_order"] = json!(order);
    }
    input
}

/// Full user prompt for an execution call
pub fn render_execution_prompt(summary: &ConversationSummary, input: &Value) -> String {
    let input_text = serde_json::to_string_pretty(input).unwrap_or_else(|_| input.to_string());
    let mut prompt = String::new();
    prompt.push_str("Task: ");
    prompt.push_str(instructions(summary.intent));
    prompt.push_str("\n\n");
    if summary.use_current_order {
        prompt.push_str("Use \"current_order\" as the starting point rather than starting over.\n\n");
    }
    prompt.push_str("Input:\n");
    prompt.push_str(&input_text);
    prompt.push_str("\n\n");
    prompt.push_str(output_shape(summary.intent));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_varies_by_category() {
        let input = json!({"highlights": []});
        let reorder = render_execution_prompt(&ConversationSummary::new(IntentCategory::Reorder), &input);
        let analyze = render_execution_prompt(&ConversationSummary::new(IntentCategory::Analyze), &input);

        assert!(reorder.contains("EVERY highlight id"));
        assert!(analyze.contains("Do not propose a new order"));
        assert!(!analyze.contains("EVERY highlight id"));
    }

    #[test]
    fn test_input_includes_current_order_only_when_given() {
        let highlights = vec![Highlight::new("h1", "Hello", 0.0, 4.25)];
        let summary = ConversationSummary::new(IntentCategory::Reorder);

        let without = execution_input(&highlights, None, &summary);
        assert!(without.get("current_order").is_none());
        assert_eq!(without["highlights"][0]["duration_secs"], json!(4.3));

        let order = vec![OrderEntry::item("h1")];
        let with = execution_input(&highlights, Some(&order), &summary);
        assert_eq!(with["current_order"], json!(["h1"]));
    }
}
