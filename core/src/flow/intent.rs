//! Intent extraction from free-form assistant replies.
//!
//! The assistant signals a decision by ending its reply with a fenced JSON block
//! holding a conversation summary. Only the last fenced block of a reply is
//! considered; earlier blocks (examples, quoted JSON) are ignored.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// What the user asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IntentCategory {
    #[default]
    #[serde(alias = "reorder_highlights", alias = "reorder-highlights")]
    Reorder,
    #[serde(alias = "improve-hook", alias = "hook")]
    ImproveHook,
    #[serde(alias = "improve-conclusion", alias = "conclusion")]
    ImproveConclusion,
    #[serde(alias = "analysis", alias = "analyze_highlights")]
    Analyze,
}

impl IntentCategory {
    /// Whether a successful execution produces a new ordering to apply
    pub fn affects_order(&self) -> bool {
        !matches!(self, IntentCategory::Analyze)
    }

    pub fn label(&self) -> &'static str {
        match self {
            IntentCategory::Reorder => "reorder",
            IntentCategory::ImproveHook => "improve hook",
            IntentCategory::ImproveConclusion => "improve conclusion",
            IntentCategory::Analyze => "analyze",
        }
    }
}

/// Structured description of what the user wants, as declared by the LLM
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConversationSummary {
    #[serde(default, alias = "category", alias = "type")]
    pub intent: IntentCategory,
    #[serde(
        default,
        alias = "useCurrentOrder",
        alias = "use_current_order_as_base"
    )]
    pub use_current_order: bool,
    #[serde(default, alias = "optimizationGoals", deserialize_with = "text_or_list")]
    pub optimization_goals: String,
    #[serde(default, alias = "specificRequests", deserialize_with = "list_or_text")]
    pub specific_requests: Vec<String>,
    #[serde(default, alias = "contextNotes", deserialize_with = "text_or_list")]
    pub context_notes: String,
    #[serde(default)]
    pub confirmed: bool,
}

impl ConversationSummary {
    pub fn new(intent: IntentCategory) -> Self {
        Self {
            intent,
            ..Default::default()
        }
    }

    /// Gate to an actionable intent; `None` unless `confirmed` is set
    pub fn confirm(self) -> Option<ConfirmedIntent> {
        if self.confirmed {
            Some(ConfirmedIntent(self))
        } else {
            None
        }
    }
}

/// A summary whose `confirmed` flag is known to be true
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfirmedIntent(ConversationSummary);

impl ConfirmedIntent {
    pub fn summary(&self) -> &ConversationSummary {
        &self.0
    }

    pub fn category(&self) -> IntentCategory {
        self.0.intent
    }

    pub fn into_inner(self) -> ConversationSummary {
        self.0
    }
}

impl std::ops::Deref for ConfirmedIntent {
    type Target = ConversationSummary;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TextOrList {
    Text(String),
    List(Vec<String>),
}

fn text_or_list<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Option::<TextOrList>::deserialize(d)? {
        Some(TextOrList::Text(s)) => s,
        Some(TextOrList::List(items)) => items.join("; "),
        None => String::new(),
    })
}

fn list_or_text<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(match Option::<TextOrList>::deserialize(d)? {
        Some(TextOrList::Text(s)) if s.trim().is_empty() => Vec::new(),
        Some(TextOrList::Text(s)) => vec![s],
        Some(TextOrList::List(items)) => items,
        None => Vec::new(),
    })
}

/// A fenced code block located in a larger text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FencedBlock<'a> {
    /// Byte offset of the opening fence
    pub start: usize,
    /// Byte offset just past the closing fence
    pub end: usize,
    /// Info string after the opening fence (e.g. `json`)
    pub lang: &'a str,
    pub body: &'a str,
}

/// All complete fenced blocks, in order of appearance
pub fn fenced_blocks(text: &str) -> Vec<FencedBlock<'_>> {
    let mut blocks = Vec::new();
    let mut offset = 0;
    while let Some(rel) = text[offset..].find("```") {
        let open = offset + rel;
        let info_start = open + 3;
        let Some(nl) = text[info_start..].find('\n') else {
            break;
        };
        let body_start = info_start + nl + 1;
        let Some(close_rel) = text[body_start..].find("```") else {
            break;
        };
        let close = body_start + close_rel;
        blocks.push(FencedBlock {
            start: open,
            end: close + 3,
            lang: text[info_start..info_start + nl].trim(),
            body: &text[body_start..close],
        });
        offset = close + 3;
    }
    blocks
}

/// Body of the last complete fenced block
pub fn last_fenced_block(text: &str) -> Option<&str> {
    fenced_blocks(text).last().map(|b| b.body)
}

/// Result of scanning an assistant reply
#[derive(Debug, Clone, Default)]
pub struct IntentExtraction {
    /// Reply text for the UI, with the summary block removed
    pub visible: String,
    /// The summary block, kept as hidden message content
    pub hidden: Option<String>,
    /// Present only for a well-formed summary with `confirmed: true`
    pub intent: Option<ConfirmedIntent>,
}

/// Pull a summary object out of a parsed JSON value
fn summary_value(v: &Value) -> Option<&Value> {
    v.get("conversation_summary")
        .or_else(|| v.get("conversationSummary"))
        .or_else(|| v.get("summary"))
        .filter(|s| s.is_object())
        .or_else(|| v.get("confirmed").map(|_| v))
}

/// Scan a reply for a trailing summary block.
///
/// A reply without a decision is a normal conversational turn: missing, malformed or
/// unconfirmed summaries all yield `intent: None`, never an error.
pub fn extract_intent(reply: &str) -> IntentExtraction {
    let not_found = || IntentExtraction {
        visible: reply.trim().to_string(),
        hidden: None,
        intent: None,
    };

    let Some(block) = fenced_blocks(reply).last().copied() else {
        return not_found();
    };
    let Ok(parsed) = serde_json::from_str::<Value>(block.body.trim()) else {
        debug!(target: "flow", lang = block.lang, "Trailing code block is not JSON");
        return not_found();
    };
    let Some(summary_json) = summary_value(&parsed) else {
        return not_found();
    };

    let summary = match serde_json::from_value::<ConversationSummary>(summary_json.clone()) {
        Ok(s) => s,
        Err(e) => {
            warn!(target: "flow", error = %e, payload = %summary_json, "Unusable conversation summary");
            return not_found();
        }
    };

    let mut visible = String::with_capacity(reply.len());
    visible.push_str(reply[..block.start].trim_end());
    let tail = reply[block.end..].trim();
    if !tail.is_empty() {
        visible.push_str("\n\n");
        visible.push_str(tail);
    }

    IntentExtraction {
        visible: visible.trim().to_string(),
        hidden: Some(block.body.trim().to_string()),
        intent: summary.confirm(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_blocks() {
        let text = "a\n```json\n{\"x\":1}\n```\nb\n```\nplain\n```\n";
        let blocks = fenced_blocks(text);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].lang, "json");
        assert_eq!(blocks[0].body.trim(), "{\"x\":1}");
        assert_eq!(blocks[1].lang, "");
        assert_eq!(last_fenced_block(text).map(str::trim), Some("plain"));
    }

    #[test]
    fn test_unclosed_block_is_ignored() {
        assert!(fenced_blocks("```json\n{\"confirmed\": true}").is_empty());
    }

    #[test]
    fn test_confirmed_summary() {
        let reply = "Great, I'll put the strongest moment first.\n\n```json\n{\"conversation_summary\": {\"intent\": \"improve_hook\", \"use_current_order\": true, \"optimization_goals\": \"stronger opening\", \"specific_requests\": \"start with the laugh\", \"confirmed\": true}}\n```";
        let extraction = extract_intent(reply);

        let intent = extraction.intent.expect("confirmed intent");
        assert_eq!(intent.category(), IntentCategory::ImproveHook);
        assert!(intent.use_current_order);
        assert_eq!(intent.specific_requests, vec!["start with the laugh".to_string()]);
        assert_eq!(
            extraction.visible,
            "Great, I'll put the strongest moment first."
        );
        assert!(extraction.hidden.unwrap().contains("conversation_summary"));
    }

    #[test]
    fn test_unconfirmed_summary_yields_no_intent() {
        let reply = "Should I group by topic?\n```json\n{\"confirmed\": false}\n```";
        let extraction = extract_intent(reply);
        assert!(extraction.intent.is_none());
        assert_eq!(extraction.visible, "Should I group by topic?");
        assert!(extraction.hidden.is_some());
    }

    #[test]
    fn test_plain_reply() {
        let extraction = extract_intent("  Which highlight do you like most?  ");
        assert!(extraction.intent.is_none());
        assert!(extraction.hidden.is_none());
        assert_eq!(extraction.visible, "Which highlight do you like most?");
    }

    #[test]
    fn test_only_last_block_counts() {
        let reply = "Example:\n```json\n{\"summary\": {\"intent\": \"reorder\", \"confirmed\": true}}\n```\nThen:\n```\nnot json\n```";
        assert!(extract_intent(reply).intent.is_none());
    }

    #[test]
    fn test_unknown_category_yields_no_intent() {
        let reply = "```json\n{\"summary\": {\"intent\": \"delete_everything\", \"confirmed\": true}}\n```";
        assert!(extract_intent(reply).intent.is_none());
    }

    #[test]
    fn test_summary_key_aliases() {
        let reply = "Done.\n```json\n{\"summary\": {\"category\": \"analysis\", \"specificRequests\": [\"pacing\", \"length\"], \"confirmed\": true}}\n```";
        let intent = extract_intent(reply).intent.unwrap();
        assert_eq!(intent.category(), IntentCategory::Analyze);
        assert_eq!(intent.specific_requests.len(), 2);
    }
}
