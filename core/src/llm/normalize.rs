//! Normalization of provider response shapes (Chat Completions, Responses API)
//! into `LlmReply`.

use serde_json::Value;

use super::types::{LlmReply, NormalizedToolCall};
use crate::{MontageError, Result};

/// Normalize any supported response payload
pub fn normalize_reply(v: &Value) -> Result<LlmReply> {
    let mut tool_calls = parse_tool_calls_from_chat(v);
    if tool_calls.is_empty() {
        tool_calls = parse_tool_calls_from_responses(v);
    }
    let content = extract_text_from_chat_completions(v)
        .or_else(|| extract_text_from_responses(v))
        .filter(|s| !s.trim().is_empty());

    if content.is_none() && tool_calls.is_empty() {
        return Err(MontageError::parse(
            "model output has neither text nor tool calls",
            v.to_string(),
        ));
    }

    Ok(LlmReply {
        content,
        tool_calls,
        model: v.get("model").and_then(|m| m.as_str()).map(|s| s.to_string()),
        usage: v.get("usage").cloned(),
    })
}

// Parsing helpers (public for testing)
pub fn parse_tool_calls_from_chat(v: &Value) -> Vec<NormalizedToolCall> {
    let mut calls = Vec::new();
    let Some(tc_arr) = v
        .get("choices")
        .and_then(|x| x.get(0))
        .and_then(|first| first.get("message"))
        .and_then(|m| m.get("tool_calls"))
        .and_then(|x| x.as_array())
    else {
        return calls;
    };
    for tc in tc_arr {
        let id = tc.get("id").and_then(|x| x.as_str()).map(|s| s.to_string());
        if let Some(func) = tc.get("function") {
            let name = func
                .get("name")
                .and_then(|n| n.as_str())
                .unwrap_or("")
                .to_string();
            let arguments = match func.get("arguments") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            };
            if !name.is_empty() {
                calls.push(NormalizedToolCall {
                    id,
                    name,
                    arguments,
                });
            }
        }
    }
    calls
}

pub fn parse_tool_calls_from_responses(v: &Value) -> Vec<NormalizedToolCall> {
    let mut calls = Vec::new();
    let Some(outputs) = v.get("output").and_then(|x| x.as_array()) else {
        return calls;
    };
    for item in outputs {
        // Responses API: {"type": "function_call", "name", "arguments", "call_id"}
        if item.get("type").and_then(|t| t.as_str()) == Some("function_call") {
            if let Some(name) = item.get("name").and_then(|n| n.as_str()) {
                calls.push(NormalizedToolCall {
                    id: item
                        .get("call_id")
                        .or_else(|| item.get("id"))
                        .and_then(|x| x.as_str())
                        .map(|s| s.to_string()),
                    name: name.to_string(),
                    arguments: match item.get("arguments") {
                        Some(Value::String(s)) => s.clone(),
                        Some(Value::Null) | None => String::new(),
                        Some(other) => other.to_string(),
                    },
                });
            }
            continue;
        }
        // Content-embedded tool_use blocks
        if let Some(contents) = item.get("content").and_then(|c| c.as_array()) {
            for c in contents {
                if c.get("type").and_then(|t| t.as_str()) == Some("tool_use") {
                    let name = c
                        .get("name")
                        .and_then(|n| n.as_str())
                        .unwrap_or("")
                        .to_string();
                    if name.is_empty() {
                        continue;
                    }
                    calls.push(NormalizedToolCall {
                        id: c.get("id").and_then(|x| x.as_str()).map(|s| s.to_string()),
                        name,
                        arguments: c.get("input").map(|i| i.to_string()).unwrap_or_default(),
                    });
                }
            }
        }
    }
    calls
}

fn extract_text_from_chat_completions(v: &Value) -> Option<String> {
    v.get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(|s| s.to_string())
}

fn extract_text_from_responses(v: &Value) -> Option<String> {
    // Prefer a direct output_text if present
    if let Some(s) = v.get("output_text").and_then(|x| x.as_str()) {
        if !s.is_empty() {
            return Some(s.to_string());
        }
    }
    // Otherwise, try unified output array schema
    let arr = v.get("output").and_then(|x| x.as_array())?;
    let mut acc = String::new();
    for item in arr {
        if let Some(contents) = item.get("content").and_then(|c| c.as_array()) {
            for c in contents {
                if let Some(t) = c
                    .get("text")
                    .and_then(|t| t.get("value"))
                    .and_then(|v| v.as_str())
                {
                    acc.push_str(t);
                } else if let Some(t) = c.get("text").and_then(|v| v.as_str()) {
                    acc.push_str(t);
                }
            }
        }
    }
    if acc.is_empty() {
        None
    } else {
        Some(acc)
    }
}
