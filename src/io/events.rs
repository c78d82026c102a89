//! Typed channel for session events
//!
//! Presentation layers subscribe to progress snapshots and the terminal
//! decision. Progress never blocks the session: it is dropped when the
//! channel is full, and drops are counted in metrics. One slot is kept free
//! for the terminal event, which is always delivered while a receiver exists.

use crate::domain::batch::{ProgressSnapshot, ScanDecision};
use crate::infra::metrics::ScanMetrics;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// Slots progress may not use, kept for the terminal event
const TERMINAL_SLOTS: usize = 1;

/// Events emitted by a running session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Detections changed or a batch tick was evaluated
    Progress(ProgressSnapshot),
    /// The session reached a terminal state
    Finished { session_id: String, decision: ScanDecision },
    /// The session was stopped before reaching a decision
    Stopped { session_id: String },
}

/// Sender handle for session events
///
/// Clone this to share across producers. Non-blocking.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<SessionEvent>,
    metrics: Option<Arc<ScanMetrics>>,
}

impl EventSender {
    pub fn new(tx: mpsc::Sender<SessionEvent>) -> Self {
        Self { tx, metrics: None }
    }

    pub fn with_metrics(mut self, metrics: Arc<ScanMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Send a progress snapshot, dropping it if the channel is nearly full
    pub fn send_progress(&self, snapshot: ProgressSnapshot) {
        let event = SessionEvent::Progress(snapshot);
        if self.tx.capacity() <= TERMINAL_SLOTS {
            self.record_dropped(&event);
            return;
        }
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => self.record_dropped(&event),
            Err(TrySendError::Closed(_)) => {
                debug!("session_event_channel_closed");
            }
        }
    }

    /// Deliver the terminal decision, waiting for room if needed
    pub async fn send_finished(&self, session_id: &str, decision: &ScanDecision) {
        self.send_terminal(SessionEvent::Finished {
            session_id: session_id.to_string(),
            decision: decision.clone(),
        })
        .await;
    }

    /// Deliver the stop notice, waiting for room if needed
    pub async fn send_stopped(&self, session_id: &str) {
        self.send_terminal(SessionEvent::Stopped { session_id: session_id.to_string() }).await;
    }

    async fn send_terminal(&self, event: SessionEvent) {
        if self.tx.send(event).await.is_err() {
            debug!("session_event_channel_closed");
        }
    }

    fn record_dropped(&self, event: &SessionEvent) {
        if let Some(ref m) = self.metrics {
            m.record_event_dropped();
        }
        warn!(event = %event_name(event), "session_event_dropped: channel full");
    }
}

fn event_name(event: &SessionEvent) -> &'static str {
    match event {
        SessionEvent::Progress(_) => "progress",
        SessionEvent::Finished { .. } => "finished",
        SessionEvent::Stopped { .. } => "stopped",
    }
}

/// Create a new session event channel pair
pub fn create_event_channel(buffer_size: usize) -> (EventSender, mpsc::Receiver<SessionEvent>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (EventSender::new(tx), rx)
}
