//! Shared runtime state
//!
//! One [`DaemonContext`] is built at startup and cloned into the HTTP
//! handlers and the IPC server.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::DaemonConfig;
use crate::device::DeviceManager;
use crate::error::Result;
use crate::events::EventBus;
use crate::origin_store::OriginStore;
use crate::pairing::PairingGate;
use crate::pioneer::{PioneerApi, PioneerClient};
use crate::signer::SignGate;
use crate::status::StatusTracker;

/// Start/stop handle for the HTTP server, driven over IPC
#[async_trait]
pub trait BridgeControl: Send + Sync {
    /// Bind and start serving; a no-op if already running
    async fn start(&self) -> Result<()>;

    /// Stop serving and wait for the listener to close
    async fn stop(&self) -> Result<()>;

    fn is_running(&self) -> bool;
}

/// Handles to every runtime service
#[derive(Clone)]
pub struct DaemonContext {
    pub config: Arc<DaemonConfig>,
    pub events: EventBus,
    pub status: Arc<StatusTracker>,
    pub origins: Arc<RwLock<OriginStore>>,
    pub pairing: Arc<PairingGate>,
    pub signer: Arc<SignGate>,
    pub device: Arc<DeviceManager>,
    pub pioneer: Option<Arc<dyn PioneerApi>>,
}

impl DaemonContext {
    /// Build every service from config, with the reqwest Pioneer client
    pub fn from_config(config: DaemonConfig) -> Result<Self> {
        let pioneer = PioneerClient::from_config(&config.pioneer)?
            .map(|client| Arc::new(client) as Arc<dyn PioneerApi>);
        Self::new(config, pioneer)
    }

    /// Build every service with the given Pioneer implementation
    pub fn new(config: DaemonConfig, pioneer: Option<Arc<dyn PioneerApi>>) -> Result<Self> {
        let events = EventBus::new();
        let status = Arc::new(StatusTracker::new(events.clone()));
        let origins = Arc::new(RwLock::new(OriginStore::open(
            config.origin_store_path.clone(),
        )?));

        let pairing = PairingGate::new(
            Arc::clone(&origins),
            events.clone(),
            pioneer.clone(),
            config.approval_timeout(),
        )
        .with_reapproval(config.require_reapproval);
        let signer = SignGate::new(events.clone(), config.sign_timeout());
        let device = DeviceManager::new(events.clone(), Arc::clone(&status));

        Ok(Self {
            config: Arc::new(config),
            events,
            status,
            origins,
            pairing: Arc::new(pairing),
            signer: Arc::new(signer),
            device: Arc::new(device),
            pioneer,
        })
    }

    /// Username reported to web apps
    pub fn username(&self) -> Option<&str> {
        self.config.pioneer.username.as_deref()
    }
}
