//! Bridge state tracking
//!
//! The tracker is the only writer of [`BridgeState`]. Device and server
//! lifecycle events are recorded as flags and the state is derived from them,
//! so there is exactly one place where transitions happen.

use keepkey_core::BridgeState;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::watch;
use tracing::info;

use crate::events::{BridgeEvent, EventBus};

/// Published status snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeStatus {
    pub state: BridgeState,
    pub status: String,
    pub device_connected: bool,
    pub bridge_running: bool,
}

impl Default for BridgeStatus {
    fn default() -> Self {
        Self {
            state: BridgeState::Initializing,
            status: BridgeState::Initializing.label().to_string(),
            device_connected: false,
            bridge_running: false,
        }
    }
}

#[derive(Debug, Default)]
struct Inputs {
    observed: bool,
    device_attached: bool,
    server_running: bool,
    server_failed: bool,
}

impl Inputs {
    fn derive(&self) -> BridgeState {
        if !self.observed {
            BridgeState::Initializing
        } else if self.server_failed {
            BridgeState::Error
        } else if self.server_running {
            BridgeState::BridgeOnline
        } else if self.device_attached {
            BridgeState::DeviceConnected
        } else {
            BridgeState::NoDevices
        }
    }
}

/// Owner of the bridge state
pub struct StatusTracker {
    inputs: Mutex<Inputs>,
    tx: watch::Sender<BridgeStatus>,
    events: EventBus,
}

impl StatusTracker {
    pub fn new(events: EventBus) -> Self {
        let (tx, _) = watch::channel(BridgeStatus::default());
        Self {
            inputs: Mutex::new(Inputs::default()),
            tx,
            events,
        }
    }

    /// Latest published status
    pub fn current(&self) -> BridgeStatus {
        self.tx.borrow().clone()
    }

    pub fn device_attached(&self) {
        self.update(|i| i.device_attached = true);
    }

    pub fn device_detached(&self) {
        self.update(|i| i.device_attached = false);
    }

    /// Record a completed scan that found nothing
    pub fn device_scan_complete(&self) {
        self.update(|_| {});
    }

    pub fn server_started(&self) {
        self.update(|i| {
            i.server_running = true;
            i.server_failed = false;
        });
    }

    pub fn server_stopped(&self) {
        self.update(|i| i.server_running = false);
    }

    pub fn server_failed(&self) {
        self.update(|i| {
            i.server_running = false;
            i.server_failed = true;
        });
    }

    fn update<F>(&self, apply: F)
    where
        F: FnOnce(&mut Inputs),
    {
        // Held across publish so concurrent transitions are observed in order
        let mut inputs = self.inputs.lock().unwrap_or_else(|e| e.into_inner());
        apply(&mut inputs);
        inputs.observed = true;

        let state = inputs.derive();
        let next = BridgeStatus {
            state,
            status: state.label().to_string(),
            device_connected: inputs.device_attached,
            bridge_running: inputs.server_running,
        };

        let mut state_changed = false;
        self.tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            state_changed = current.state != next.state;
            *current = next.clone();
            true
        });

        if state_changed {
            info!("Bridge state: {} ({})", next.state.code(), next.status);
            self.events.publish(BridgeEvent::StateChanged {
                state: next.state,
                status: next.status,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> (StatusTracker, EventBus) {
        let events = EventBus::new();
        (StatusTracker::new(events.clone()), events)
    }

    #[test]
    fn test_starts_initializing() {
        let (tracker, _) = tracker();
        assert_eq!(tracker.current().state, BridgeState::Initializing);
        assert_eq!(tracker.current().status, "preInit");
    }

    #[test]
    fn test_transition_table() {
        let (tracker, _) = tracker();

        tracker.device_scan_complete();
        assert_eq!(tracker.current().state, BridgeState::NoDevices);

        tracker.device_attached();
        assert_eq!(tracker.current().state, BridgeState::DeviceConnected);

        tracker.server_started();
        assert_eq!(tracker.current().state, BridgeState::BridgeOnline);

        // Device churn does not take the bridge offline
        tracker.device_detached();
        assert_eq!(tracker.current().state, BridgeState::BridgeOnline);
        assert!(!tracker.current().device_connected);

        tracker.server_stopped();
        assert_eq!(tracker.current().state, BridgeState::NoDevices);

        tracker.server_failed();
        assert_eq!(tracker.current().state, BridgeState::Error);

        tracker.server_started();
        assert_eq!(tracker.current().state, BridgeState::BridgeOnline);
    }

    #[tokio::test]
    async fn test_state_changes_are_broadcast() {
        let (tracker, events) = tracker();
        let mut rx = events.subscribe();

        tracker.server_started();

        match rx.recv().await.unwrap() {
            BridgeEvent::StateChanged { state, status } => {
                assert_eq!(state, BridgeState::BridgeOnline);
                assert_eq!(status, "bridge online");
                assert_eq!(tracker.current().state, state);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
