//! Caller-owned highlight data and the single mutation hook.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::output::OrderEntry;
use crate::Result;

/// An addressable content segment, identified by an opaque id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Highlight {
    pub id: String,
    pub text: String,
    pub start_secs: f64,
    pub end_secs: f64,
    /// Label of the media the highlight was cut from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Highlight {
    pub fn new(id: impl Into<String>, text: impl Into<String>, start_secs: f64, end_secs: f64) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            start_secs,
            end_secs,
            source: None,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        (self.end_secs - self.start_secs).max(0.0)
    }
}

/// Read access to a project's highlights
#[async_trait]
pub trait HighlightSource: Send + Sync {
    /// All highlights of the subject, in storage order
    async fn highlights(&self, subject_id: &str) -> Result<Vec<Highlight>>;

    /// The subject's saved ordering; empty when none has been saved
    async fn current_order(&self, subject_id: &str) -> Result<Vec<OrderEntry>>;
}

/// Persists a new ordering. Expected to be atomic: on error nothing was applied.
#[async_trait]
pub trait ApplyCallback: Send + Sync {
    async fn apply(&self, subject_id: &str, new_order: &[OrderEntry]) -> Result<()>;
}
