#![allow(dead_code)]

use async_trait::async_trait;
use dashmap::DashMap;
use mockall::mock;
use montage_core::execution::templates::EXECUTION_SYSTEM_PROMPT;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use montage_core::{
    ApplyCallback, ChatMessage, Highlight, HighlightSource, HistoryProvider, LlmReply, LlmRequest,
    LlmTransport, MontageError, OrderEntry, Result,
};

mock! {
    pub Transport {}

    #[async_trait]
    impl LlmTransport for Transport {
        async fn complete(&self, api_key: &str, request: &LlmRequest) -> Result<LlmReply>;
    }
}

mock! {
    pub Applier {}

    #[async_trait]
    impl ApplyCallback for Applier {
        async fn apply(&self, subject_id: &str, new_order: &[OrderEntry]) -> Result<()>;
    }
}

/// Transport that sleeps before answering and records how many calls overlap
pub struct SlowTransport {
    delay: fn(&LlmRequest) -> Duration,
    reply: fn(&LlmRequest) -> String,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl SlowTransport {
    pub fn new(delay: fn(&LlmRequest) -> Duration, reply: fn(&LlmRequest) -> String) -> Self {
        Self {
            delay,
            reply,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmTransport for SlowTransport {
    async fn complete(&self, _api_key: &str, request: &LlmRequest) -> Result<LlmReply> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep((self.delay)(request)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(LlmReply::text((self.reply)(request)))
    }
}

/// Whether a request is the execution call rather than a conversational one
pub fn is_execution_call(request: &LlmRequest) -> bool {
    request
        .messages
        .first()
        .map(|m| m.content == EXECUTION_SYSTEM_PROMPT)
        .unwrap_or(false)
}

pub fn confirmed_reply(intent: &str) -> String {
    format!(
        "Great, I'll do that now.\n```json\n{{\"conversation_summary\": {{\"intent\": \"{intent}\", \"use_current_order\": true, \"optimization_goals\": \"tighter story\", \"confirmed\": true}}}}\n```"
    )
}

pub fn unconfirmed_reply() -> String {
    "Should I move the reveal to the front?\n```json\n{\"conversation_summary\": {\"intent\": \"improve_hook\", \"confirmed\": false}}\n```".to_string()
}

/// Highlights, saved orders and message logs for a handful of projects
#[derive(Default)]
pub struct InMemoryStore {
    highlights: DashMap<String, Vec<Highlight>>,
    orders: DashMap<String, Vec<OrderEntry>>,
    sessions: DashMap<String, Vec<ChatMessage>>,
}

impl InMemoryStore {
    pub fn with_project(subject_id: &str, ids: &[&str]) -> Self {
        let store = Self::default();
        let highlights = ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                Highlight::new(*id, format!("Highlight {id}"), i as f64 * 10.0, i as f64 * 10.0 + 5.0)
            })
            .collect();
        store.highlights.insert(subject_id.to_string(), highlights);
        store
    }

    pub fn set_order(&self, subject_id: &str, order: Vec<OrderEntry>) {
        self.orders.insert(subject_id.to_string(), order);
    }

    pub fn append(&self, session_id: &str, messages: &[ChatMessage]) {
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .extend(messages.iter().cloned());
    }
}

#[async_trait]
impl HighlightSource for InMemoryStore {
    async fn highlights(&self, subject_id: &str) -> Result<Vec<Highlight>> {
        Ok(self
            .highlights
            .get(subject_id)
            .map(|h| h.clone())
            .unwrap_or_default())
    }

    async fn current_order(&self, subject_id: &str) -> Result<Vec<OrderEntry>> {
        Ok(self.orders.get(subject_id).map(|o| o.clone()).unwrap_or_default())
    }
}

#[async_trait]
impl HistoryProvider for InMemoryStore {
    async fn recent_messages(&self, session_id: &str, limit: usize) -> Result<Vec<ChatMessage>> {
        let log = self
            .sessions
            .get(session_id)
            .ok_or_else(|| MontageError::SessionNotFound(session_id.to_string()))?;
        let skip = log.len().saturating_sub(limit);
        Ok(log[skip..].to_vec())
    }
}
