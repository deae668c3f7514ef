//! Approver-facing event bus
//!
//! Everything the approver needs to react to (a prompt to show, a state
//! change for the tray icon, device traffic) is published here and relayed
//! to subscribed IPC connections.

use keepkey_core::{BridgeState, Chunk, Origin, RequestId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

/// Events delivered to subscribed approvers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BridgeEvent {
    /// A web app asked to pair
    PairRequested {
        request_id: RequestId,
        origin: Origin,
        code: String,
    },

    /// A web app submitted a transaction for signing
    SignRequested {
        request_id: RequestId,
        origin: Option<Origin>,
        payload: Value,
    },

    /// A pending request left the queue
    RequestResolved {
        request_id: RequestId,
        resolution: Resolution,
    },

    /// The bridge state changed
    StateChanged { state: BridgeState, status: String },

    /// An origin was added to the allowlist
    OriginApproved { origin: Origin },

    /// A device was attached
    DeviceAttached { description: String },

    /// The device was detached
    DeviceDetached,

    /// A chunk was read from the device
    ChunkRead { data: Chunk },

    /// A chunk was written to the device
    ChunkWritten { data: Chunk },
}

/// How a pending request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Approved,
    Rejected,
    Signed,
    TimedOut,
    Cancelled,
}

/// Broadcast channel wrapper
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BridgeEvent>,
}

impl EventBus {
    /// Default queue depth per subscriber
    pub const CAPACITY: usize = 64;

    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(Self::CAPACITY);
        Self { tx }
    }

    /// Publish an event; having no subscribers is not an error
    pub fn publish(&self, event: BridgeEvent) {
        trace!("Publishing event: {:?}", event);
        let _ = self.tx.send(event);
    }

    /// Subscribe to future events
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Publishes `Cancelled` for a request if dropped while still armed
///
/// Held across the wait of an approval gate. If the HTTP handler future is
/// dropped mid-wait the approver still learns the prompt is gone.
pub(crate) struct CancelGuard {
    events: EventBus,
    request_id: RequestId,
    armed: bool,
}

impl CancelGuard {
    pub(crate) fn new(events: &EventBus, request_id: RequestId) -> Self {
        Self {
            events: events.clone(),
            request_id,
            armed: true,
        }
    }

    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if self.armed {
            self.events.publish(BridgeEvent::RequestResolved {
                request_id: self.request_id,
                resolution: Resolution::Cancelled,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::new();
        bus.publish(BridgeEvent::DeviceDetached);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(BridgeEvent::DeviceAttached {
            description: "KeepKey".to_string(),
        });
        bus.publish(BridgeEvent::DeviceDetached);

        assert!(matches!(rx.recv().await.unwrap(), BridgeEvent::DeviceAttached { .. }));
        assert_eq!(rx.recv().await.unwrap(), BridgeEvent::DeviceDetached);
    }

    #[tokio::test]
    async fn test_cancel_guard_publishes_only_when_armed() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        let id = RequestId::new();
        let mut disarmed = CancelGuard::new(&bus, RequestId::new());
        disarmed.disarm();
        drop(disarmed);
        drop(CancelGuard::new(&bus, id));

        assert_eq!(
            rx.recv().await.unwrap(),
            BridgeEvent::RequestResolved {
                request_id: id,
                resolution: Resolution::Cancelled,
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_event_wire_format() {
        let event = BridgeEvent::StateChanged {
            state: BridgeState::BridgeOnline,
            status: "bridge online".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "state_changed");
        assert_eq!(json["state"], 3);
    }
}
