//! In-memory loopback device
//!
//! Every written chunk is logged and echoed back to the read queue. Tests can
//! also queue responses directly with [`MemoryTransport::push_response`].

use async_trait::async_trait;
use keepkey_core::Chunk;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use super::{DeviceConnector, DeviceInfo, DeviceTransport, READ_TIMEOUT};
use crate::error::{DaemonError, Result};

struct Inner {
    info: DeviceInfo,
    tx: mpsc::UnboundedSender<Chunk>,
    rx: AsyncMutex<mpsc::UnboundedReceiver<Chunk>>,
    written: Mutex<Vec<Chunk>>,
    io_count: AtomicUsize,
}

/// Loopback transport; clones share the same device
#[derive(Clone)]
pub struct MemoryTransport {
    inner: Arc<Inner>,
}

impl MemoryTransport {
    pub fn new(path: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                info: DeviceInfo {
                    path: path.to_string(),
                    serial: None,
                    product: Some("KeepKey (memory)".to_string()),
                },
                tx,
                rx: AsyncMutex::new(rx),
                written: Mutex::new(Vec::new()),
                io_count: AtomicUsize::new(0),
            }),
        }
    }

    /// Queue a chunk for the next read
    pub fn push_response(&self, chunk: Chunk) {
        let _ = self.inner.tx.send(chunk);
    }

    /// Every chunk written so far
    pub fn written(&self) -> Vec<Chunk> {
        self.inner
            .written
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of reads and writes attempted
    pub fn io_count(&self) -> usize {
        self.inner.io_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceTransport for MemoryTransport {
    fn info(&self) -> &DeviceInfo {
        &self.inner.info
    }

    async fn read_chunk(&self) -> Result<Chunk> {
        self.inner.io_count.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.inner.rx.lock().await;
        match tokio::time::timeout(READ_TIMEOUT, rx.recv()).await {
            Ok(Some(chunk)) => Ok(chunk),
            Ok(None) => Err(DaemonError::Device("device closed".to_string())),
            Err(_) => Err(DaemonError::Device("read timed out".to_string())),
        }
    }

    async fn write_chunk(&self, chunk: &Chunk) -> Result<()> {
        self.inner.io_count.fetch_add(1, Ordering::SeqCst);
        self.inner
            .written
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(chunk.clone());
        self.push_response(chunk.clone());
        Ok(())
    }
}

/// Connector over a set of plugged-in memory devices
#[derive(Clone, Default)]
pub struct MemoryConnector {
    devices: Arc<Mutex<Vec<MemoryTransport>>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a device visible to the next probe
    pub fn plug(&self, device: MemoryTransport) {
        self.devices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(device);
    }

    /// Remove a device by path
    pub fn unplug(&self, path: &str) {
        self.devices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|d| d.info().path != path);
    }
}

#[async_trait]
impl DeviceConnector for MemoryConnector {
    async fn probe(&self) -> Result<Vec<DeviceInfo>> {
        Ok(self
            .devices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|d| d.info().clone())
            .collect())
    }

    async fn open(&self, info: &DeviceInfo) -> Result<Box<dyn DeviceTransport>> {
        let devices = self.devices.lock().unwrap_or_else(|e| e.into_inner());
        let device = devices
            .iter()
            .find(|d| d.info().path == info.path)
            .cloned()
            .ok_or_else(|| DaemonError::Device(format!("no device at {}", info.path)))?;
        Ok(Box::new(device))
    }
}
