//! Notifications published by the task queue.

use serde::Serialize;
use tokio::sync::broadcast;

/// Event published on the queue's broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum QueueEvent {
    /// A run started
    Start,
    /// The active run ended (drained, stopped, or aborted)
    Stop,
    /// Queue contents or counters changed
    Progress,
    /// One execution of a task succeeded
    Complete { task_id: String },
    /// One attempt of a task failed
    Error {
        task_id: String,
        task_type: String,
        message: String,
    },
    /// The external IP changed mid-run; the run was stopped
    IpCheckFail,
}

impl QueueEvent {
    pub fn name(&self) -> &'static str {
        match self {
            QueueEvent::Start => "start",
            QueueEvent::Stop => "stop",
            QueueEvent::Progress => "progress",
            QueueEvent::Complete { .. } => "complete",
            QueueEvent::Error { .. } => "error",
            QueueEvent::IpCheckFail => "ip-check-fail",
        }
    }
}

const EVENT_CAPACITY: usize = 256;

/// Publish side of the event channel.
///
/// Sending never blocks; subscribers that fall behind lose the oldest events.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<QueueEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: QueueEvent) {
        tracing::trace!(event = event.name(), "Queue event");
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }
}
