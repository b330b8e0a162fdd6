// Progress broadcasting: advisory, best-effort, never blocks the pipeline
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// A human-readable progress update for one session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressEvent {
    pub subject_id: String,
    pub endpoint_id: String,
    pub session_id: String,
    pub step: u32,
    pub message: String,
    pub timestamp_ms: i64,
}

/// External subscriber channel. Implementations must return immediately.
pub trait ProgressSink: Send + Sync {
    fn publish(&self, event: ProgressEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn publish(&self, _event: ProgressEvent) {}
}

/// Writes each event as a log line
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn publish(&self, event: ProgressEvent) {
        info!(
            target: "progress",
            session = %event.session_id,
            step = event.step,
            "{}", event.message
        );
    }
}

/// Forwards events into a bounded channel; drops them when the channel is full or closed
#[derive(Debug, Clone)]
pub struct ChannelProgressSink {
    sender: mpsc::Sender<ProgressEvent>,
    dropped: Arc<AtomicU64>,
}

impl ChannelProgressSink {
    /// Create a sink and the receiving half for the subscriber
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (sender, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// Events lost to a full or closed channel
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl ProgressSink for ChannelProgressSink {
    fn publish(&self, event: ProgressEvent) {
        if let Err(e) = self.sender.try_send(event) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(target: "progress", error = %e, "Progress event dropped");
        }
    }
}

/// Per-turn handle that stamps updates with the session's identity
#[derive(Clone)]
pub struct ProgressBroadcaster {
    sink: Arc<dyn ProgressSink>,
    subject_id: String,
    endpoint_id: String,
    session_id: String,
}

impl ProgressBroadcaster {
    pub fn new(
        sink: Arc<dyn ProgressSink>,
        subject_id: impl Into<String>,
        endpoint_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            sink,
            subject_id: subject_id.into(),
            endpoint_id: endpoint_id.into(),
            session_id: session_id.into(),
        }
    }

    /// Broadcaster that goes nowhere
    pub fn silent() -> Self {
        Self::new(Arc::new(NoopProgressSink), "", "", "")
    }

    /// Publish `(subject, endpoint, session, step, message)`; at-most-once, no feedback
    pub fn update(&self, step: u32, message: impl Into<String>) {
        self.sink.publish(ProgressEvent {
            subject_id: self.subject_id.clone(),
            endpoint_id: self.endpoint_id.clone(),
            session_id: self.session_id.clone(),
            step,
            message: message.into(),
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        });
    }
}
