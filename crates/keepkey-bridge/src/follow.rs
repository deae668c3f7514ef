//! Device-driven server lifecycle
//!
//! Attaching a KeepKey starts the HTTP server and detaching it stops the
//! server, so web apps see the device disappear.

use keepkey_daemon::events::BridgeEvent;
use keepkey_daemon::{BridgeControl, DaemonContext};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Starts and stops the bridge as devices come and go
pub struct DeviceFollower {
    context: DaemonContext,
    bridge: Arc<dyn BridgeControl>,
    events: broadcast::Receiver<BridgeEvent>,
}

impl DeviceFollower {
    /// Subscribes immediately so no attach published after this call is missed
    pub fn new(context: &DaemonContext, bridge: Arc<dyn BridgeControl>) -> Self {
        Self {
            context: context.clone(),
            bridge,
            events: context.events.subscribe(),
        }
    }

    pub async fn run(mut self) {
        loop {
            match self.events.recv().await {
                Ok(BridgeEvent::DeviceAttached { description }) => {
                    info!("{} attached, starting bridge", description);
                    self.start().await;
                }
                Ok(BridgeEvent::DeviceDetached) => {
                    info!("Device detached, stopping bridge");
                    self.stop().await;
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Device follower lagged, skipped {} event(s)", skipped);
                    self.reconcile().await;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, device follower exiting");
                    return;
                }
            }
        }
    }

    /// Match the server to the device slot after missed events
    async fn reconcile(&self) {
        if self.context.device.is_connected().await {
            self.start().await;
        } else {
            self.stop().await;
        }
    }

    async fn start(&self) {
        if let Err(e) = self.bridge.start().await {
            warn!("Bridge did not start: {}", e);
        }
    }

    async fn stop(&self) {
        if let Err(e) = self.bridge.stop().await {
            warn!("Bridge did not stop cleanly: {}", e);
        }
    }
}
