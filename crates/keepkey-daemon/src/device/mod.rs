//! Device plumbing
//!
//! The bridge never speaks the KeepKey protocol. It only moves raw 64-byte
//! reports between the web app and whichever transport is attached.

pub mod memory;

#[cfg(feature = "hid")]
pub mod hid;

mod watcher;

pub use memory::{MemoryConnector, MemoryTransport};
pub use watcher::DeviceWatcher;

use async_trait::async_trait;
use keepkey_core::Chunk;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::{DaemonError, Result};
use crate::events::{BridgeEvent, EventBus};
use crate::status::StatusTracker;

/// How long a single read waits for the device to answer
pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Identity of an attached device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Platform path used to open the device
    pub path: String,

    /// Serial number, when the device reports one
    pub serial: Option<String>,

    /// Product string, when the device reports one
    pub product: Option<String>,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.product.as_deref().unwrap_or("KeepKey"))?;
        match &self.serial {
            Some(serial) => write!(f, " ({})", serial),
            None => write!(f, " at {}", self.path),
        }
    }
}

/// An open connection to one device
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    fn info(&self) -> &DeviceInfo;

    /// Read one report, failing after [`READ_TIMEOUT`]
    async fn read_chunk(&self) -> Result<Chunk>;

    /// Write one report
    async fn write_chunk(&self, chunk: &Chunk) -> Result<()>;
}

/// Finds and opens devices
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    /// Enumerate devices currently present
    async fn probe(&self) -> Result<Vec<DeviceInfo>>;

    /// Open one of the probed devices
    async fn open(&self, info: &DeviceInfo) -> Result<Box<dyn DeviceTransport>>;
}

/// Holds the attached device and proxies chunks to it
pub struct DeviceManager {
    /// Attached transport, if any
    current: RwLock<Option<Arc<dyn DeviceTransport>>>,

    /// Serializes reads and writes
    io: Mutex<()>,

    events: EventBus,
    status: Arc<StatusTracker>,
}

impl DeviceManager {
    pub fn new(events: EventBus, status: Arc<StatusTracker>) -> Self {
        Self {
            current: RwLock::new(None),
            io: Mutex::new(()),
            events,
            status,
        }
    }

    /// Info of the attached device
    pub async fn current(&self) -> Option<DeviceInfo> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|device| device.info().clone())
    }

    pub async fn is_connected(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// Attach a device, replacing any previous one
    pub async fn attach(&self, transport: Box<dyn DeviceTransport>) {
        let description = transport.info().to_string();
        *self.current.write().await = Some(Arc::from(transport));

        info!("Device attached: {}", description);
        self.status.device_attached();
        self.events.publish(BridgeEvent::DeviceAttached { description });
    }

    /// Detach the current device; a no-op if none is attached
    pub async fn detach(&self) {
        if let Some(device) = self.current.write().await.take() {
            info!("Device detached: {}", device.info());
            self.status.device_detached();
            self.events.publish(BridgeEvent::DeviceDetached);
        }
    }

    /// Read one chunk from the attached device
    pub async fn read_chunk(&self) -> Result<Chunk> {
        let device = self.attached().await?;
        let _io = self.io.lock().await;

        let chunk = device.read_chunk().await?;
        debug!("Read {} byte(s) from device", chunk.len());
        self.events
            .publish(BridgeEvent::ChunkRead { data: chunk.clone() });
        Ok(chunk)
    }

    /// Write one chunk to the attached device
    pub async fn write_chunk(&self, chunk: Chunk) -> Result<()> {
        let device = self.attached().await?;
        let _io = self.io.lock().await;

        device.write_chunk(&chunk).await?;
        debug!("Wrote {} byte(s) to device", chunk.len());
        self.events.publish(BridgeEvent::ChunkWritten { data: chunk });
        Ok(())
    }

    /// Record a scan that found no device
    pub(crate) fn scan_found_nothing(&self) {
        self.status.device_scan_complete();
    }

    async fn attached(&self) -> Result<Arc<dyn DeviceTransport>> {
        self.current
            .read()
            .await
            .clone()
            .ok_or(DaemonError::NoDeviceConnected)
    }
}
