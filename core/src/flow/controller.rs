use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::info;

use super::state::{ConversationFlow, FlowPhase};

/// In-memory directory of session flows.
///
/// Each session's flow sits behind its own async mutex: a turn holds the guard
/// from start to finish, so two turns of one session never interleave while turns
/// of different sessions only meet on the map shard for the lookup.
#[derive(Debug, Default)]
pub struct FlowController {
    flows: DashMap<String, Arc<Mutex<ConversationFlow>>>,
}

impl FlowController {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, session_id: &str) -> Arc<Mutex<ConversationFlow>> {
        self.flows
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ConversationFlow::new(session_id))))
            .clone()
    }

    /// Lock the session's flow for one turn, creating it on first use
    pub async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<ConversationFlow> {
        self.slot(session_id).lock_owned().await
    }

    /// Current phase, if the session has a flow. Waits for an in-flight turn.
    pub async fn phase(&self, session_id: &str) -> Option<FlowPhase> {
        let slot = self.flows.get(session_id).map(|e| e.clone())?;
        let flow = slot.lock().await;
        Some(flow.phase())
    }

    /// Reset a session's flow (the "clear history" action). Returns whether it existed.
    ///
    /// Waits for an in-flight turn, resets the flow in place, then drops the entry
    /// unless another turn is already queued on it.
    pub async fn clear(&self, session_id: &str) -> bool {
        let Some(slot) = self.flows.get(session_id).map(|e| e.clone()) else {
            return false;
        };
        {
            let mut flow = slot.lock().await;
            *flow = ConversationFlow::new(session_id);
        }
        drop(slot);
        self.evict_idle(session_id);
        info!(target: "flow", session = %session_id, "Cleared conversation flow");
        true
    }

    /// Remove the entry if no turn holds or waits on it. Returns whether it was removed.
    pub fn evict_idle(&self, session_id: &str) -> bool {
        self.flows
            .remove_if(session_id, |_, slot| Arc::strong_count(slot) == 1)
            .is_some()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.flows.contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}
