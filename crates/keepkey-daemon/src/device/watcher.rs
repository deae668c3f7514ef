//! Device detection and monitoring
//!
//! Rescans on udev `hidraw` events when built with the `hid` feature on Linux,
//! otherwise polls.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{DeviceConnector, DeviceManager};
use crate::error::Result;

/// Watches for KeepKey insertion/removal
pub struct DeviceWatcher {
    manager: Arc<DeviceManager>,
    connector: Arc<dyn DeviceConnector>,
    poll_interval: Duration,
}

impl DeviceWatcher {
    pub fn new(
        manager: Arc<DeviceManager>,
        connector: Arc<dyn DeviceConnector>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            manager,
            connector,
            poll_interval,
        }
    }

    /// Start watching for device events (runs until the task is dropped)
    pub async fn watch(&self) -> Result<()> {
        info!("Starting device watcher");

        // A failed first enumeration is retried by the loop below
        self.rescan().await;

        #[cfg(all(target_os = "linux", feature = "hid"))]
        {
            match self.watch_udev().await {
                Ok(()) => return Ok(()),
                Err(e) => warn!("Udev monitor unavailable ({}), falling back to polling", e),
            }
        }

        self.watch_polling().await
    }

    #[cfg(all(target_os = "linux", feature = "hid"))]
    async fn watch_udev(&self) -> Result<()> {
        use crate::error::DaemonError;
        use futures_util::StreamExt;
        use tokio_udev::{AsyncMonitorSocket, MonitorBuilder};

        let builder = MonitorBuilder::new()
            .map_err(|e| DaemonError::Udev(e.to_string()))?
            .match_subsystem("hidraw")
            .map_err(|e| DaemonError::Udev(e.to_string()))?;

        let monitor = builder.listen().map_err(|e| DaemonError::Udev(e.to_string()))?;

        let mut socket =
            AsyncMonitorSocket::new(monitor).map_err(|e| DaemonError::Udev(e.to_string()))?;

        while let Some(event) = socket.next().await {
            match event {
                Ok(event) => {
                    let action = event.action().map(|a| a.to_string_lossy().to_string());
                    debug!("Udev event: {:?} for {:?}", action, event.devpath());

                    match action.as_deref() {
                        Some("add") | Some("change") => {
                            // Give the device node a moment to settle
                            tokio::time::sleep(Duration::from_millis(250)).await;
                            self.rescan().await;
                        }
                        Some("remove") => self.rescan().await,
                        _ => {}
                    }
                }
                Err(e) => warn!("Udev error: {}", e),
            }
        }

        Ok(())
    }

    async fn watch_polling(&self) -> Result<()> {
        debug!("Polling for devices every {:?}", self.poll_interval);
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            self.rescan().await;
        }
    }

    async fn rescan(&self) {
        if let Err(e) = self.scan().await {
            warn!("Device scan failed: {}", e);
        }
    }

    /// Reconcile the attached device with what is present
    pub async fn scan(&self) -> Result<()> {
        let present = self.connector.probe().await?;

        if let Some(current) = self.manager.current().await {
            if !present.iter().any(|d| d.path == current.path) {
                self.manager.detach().await;
            } else {
                return Ok(());
            }
        }

        for info in &present {
            match self.connector.open(info).await {
                Ok(transport) => {
                    self.manager.attach(transport).await;
                    return Ok(());
                }
                Err(e) => warn!("Failed to open {}: {}", info, e),
            }
        }

        self.manager.scan_found_nothing();
        Ok(())
    }
}
