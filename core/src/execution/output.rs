//! Structured execution output: parsing the model's JSON reply and checking that a
//! proposed ordering neither loses nor duplicates highlights.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::flow::intent::last_fenced_block;
use crate::{MontageError, Result};

/// One slot of an ordering: a highlight id or a section marker.
///
/// On the wire both are plain strings; section markers look like `--- Title ---`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OrderEntry {
    Item(String),
    Section(String),
}

impl OrderEntry {
    pub fn item(id: impl Into<String>) -> Self {
        OrderEntry::Item(id.into())
    }

    pub fn section(title: impl Into<String>) -> Self {
        OrderEntry::Section(title.into())
    }

    pub fn item_id(&self) -> Option<&str> {
        match self {
            OrderEntry::Item(id) => Some(id),
            OrderEntry::Section(_) => None,
        }
    }

    pub fn is_section(&self) -> bool {
        matches!(self, OrderEntry::Section(_))
    }
}

impl From<String> for OrderEntry {
    fn from(raw: String) -> Self {
        let trimmed = raw.trim();
        if trimmed.starts_with("---") {
            let title = trimmed.trim_matches(|c: char| c == '-' || c.is_whitespace());
            OrderEntry::Section(title.to_string())
        } else {
            OrderEntry::Item(trimmed.to_string())
        }
    }
}

impl From<&str> for OrderEntry {
    fn from(raw: &str) -> Self {
        OrderEntry::from(raw.to_string())
    }
}

impl From<OrderEntry> for String {
    fn from(entry: OrderEntry) -> Self {
        match entry {
            OrderEntry::Item(id) => id,
            OrderEntry::Section(title) => format!("--- {} ---", title),
        }
    }
}

/// Item ids of an ordering, section markers skipped
pub fn item_ids(order: &[OrderEntry]) -> Vec<&str> {
    order.iter().filter_map(|e| e.item_id()).collect()
}

/// What the model returns for an execution request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StructuredExecutionOutput {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default, alias = "newOrder")]
    pub new_order: Vec<OrderEntry>,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default, alias = "sectionCount")]
    pub section_count: usize,
    #[serde(default)]
    pub changes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn default_success() -> bool {
    true
}

impl StructuredExecutionOutput {
    /// Recount section markers instead of trusting the model's figure
    pub fn normalized(mut self) -> Self {
        self.section_count = self.new_order.iter().filter(|e| e.is_section()).count();
        self
    }
}

/// Locate the JSON object in a model reply: the last fenced block if any, otherwise
/// the span from the first `{` to the last `}`.
pub fn extract_json_object(text: &str) -> Option<&str> {
    if let Some(block) = last_fenced_block(text) {
        let block = block.trim();
        if block.starts_with('{') {
            return Some(block);
        }
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}

/// Parse a model reply into structured output
pub fn parse_structured_output(text: &str) -> Result<StructuredExecutionOutput> {
    let json = extract_json_object(text).ok_or_else(|| {
        warn!(target: "execution", payload = %text, "No JSON object in execution reply");
        MontageError::parse("no JSON object found in model reply", text)
    })?;
    let output: StructuredExecutionOutput = serde_json::from_str(json).map_err(|e| {
        warn!(target: "execution", error = %e, payload = %json, "Malformed execution reply");
        MontageError::parse(format!("malformed execution JSON: {e}"), json)
    })?;
    Ok(output.normalized())
}

/// Check that `new_order` holds every expected id as many times as `expected_ids`
/// lists it (once, for a well-formed project) and nothing else.
pub fn validate_ordering(new_order: &[OrderEntry], expected_ids: &[String]) -> Result<()> {
    let mut expected: HashMap<&str, usize> = HashMap::new();
    for id in expected_ids {
        *expected.entry(id.as_str()).or_default() += 1;
    }
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for id in item_ids(new_order) {
        *seen.entry(id).or_default() += 1;
    }

    let mut problems = Vec::new();

    let mut missing: Vec<&str> = expected
        .iter()
        .filter(|(id, want)| seen.get(*id).copied().unwrap_or(0) < **want)
        .map(|(id, _)| *id)
        .collect();
    missing.sort_unstable();
    if !missing.is_empty() {
        problems.push(format!("missing {}", missing.join(", ")));
    }

    let mut duplicated: Vec<&str> = seen
        .iter()
        .filter(|(id, count)| matches!(expected.get(*id), Some(want) if **count > *want))
        .map(|(id, _)| *id)
        .collect();
    duplicated.sort_unstable();
    if !duplicated.is_empty() {
        problems.push(format!("duplicated {}", duplicated.join(", ")));
    }

    let mut unknown: Vec<&str> = seen
        .keys()
        .copied()
        .filter(|id| !expected.contains_key(id))
        .collect();
    unknown.sort_unstable();
    if !unknown.is_empty() {
        problems.push(format!("unknown {}", unknown.join(", ")));
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(MontageError::Validation(format!(
            "proposed order is invalid: {}",
            problems.join("; ")
        )))
    }
}
