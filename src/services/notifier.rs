use serde_json::json;
use tokio::sync::broadcast;
use tracing::debug;

use crate::models::internal::{EventKind, ProgressEvent, ServerEvent};

/// Fire-and-forget fan-out of status events to live subscribers.
///
/// Events published while nobody is listening are dropped.
#[derive(Clone)]
pub struct ProgressNotifier {
    sender: broadcast::Sender<ServerEvent>,
}

impl ProgressNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn publish_progress(&self, event: ProgressEvent) {
        match serde_json::to_value(&event) {
            Ok(payload) => self.publish(EventKind::Progress, payload),
            Err(e) => debug!("Dropping unserializable progress event: {}", e),
        }
    }

    /// Relay a bot response to the frontend.
    pub fn publish_response(&self, message: &str) {
        self.publish(EventKind::Response, json!({ "message": message }));
    }

    fn publish(&self, kind: EventKind, payload: serde_json::Value) {
        if self.sender.send(ServerEvent { kind, payload }).is_err() {
            debug!("No subscribers for {} event", kind.as_str());
        }
    }
}

impl Default for ProgressNotifier {
    fn default() -> Self {
        Self::new(128)
    }
}
