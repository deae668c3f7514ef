//! USB HID backend
//!
//! hidapi is blocking, so every call runs on the blocking pool.

use async_trait::async_trait;
use hidapi::{HidApi, HidDevice};
use keepkey_core::{Chunk, CHUNK_SIZE};
use std::ffi::CString;
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::{DeviceConnector, DeviceInfo, DeviceTransport, READ_TIMEOUT};
use crate::error::{DaemonError, Result};

/// KeepKey USB vendor id
pub const KEEPKEY_VENDOR_ID: u16 = 0x2B24;

/// Product ids (legacy HID and WebUSB-era firmware)
pub const KEEPKEY_PRODUCT_IDS: [u16; 2] = [0x0001, 0x0002];

fn hid_err(e: hidapi::HidError) -> DaemonError {
    DaemonError::Device(e.to_string())
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DaemonError::Device(format!("blocking task failed: {}", e)))?
}

/// Enumerates KeepKeys through hidapi
pub struct HidConnector {
    api: Arc<Mutex<HidApi>>,
}

impl HidConnector {
    pub fn new() -> Result<Self> {
        let api = HidApi::new().map_err(hid_err)?;
        Ok(Self {
            api: Arc::new(Mutex::new(api)),
        })
    }
}

#[async_trait]
impl DeviceConnector for HidConnector {
    async fn probe(&self) -> Result<Vec<DeviceInfo>> {
        let api = Arc::clone(&self.api);
        blocking(move || {
            let mut api = api.lock().unwrap_or_else(|e| e.into_inner());
            api.refresh_devices().map_err(hid_err)?;

            Ok(api
                .device_list()
                .filter(|d| {
                    d.vendor_id() == KEEPKEY_VENDOR_ID
                        && KEEPKEY_PRODUCT_IDS.contains(&d.product_id())
                        // Interface 0 carries the wallet protocol
                        && d.interface_number() <= 0
                })
                .map(|d| DeviceInfo {
                    path: d.path().to_string_lossy().into_owned(),
                    serial: d.serial_number().map(str::to_owned),
                    product: d.product_string().map(str::to_owned),
                })
                .collect())
        })
        .await
    }

    async fn open(&self, info: &DeviceInfo) -> Result<Box<dyn DeviceTransport>> {
        let api = Arc::clone(&self.api);
        let path = CString::new(info.path.clone())
            .map_err(|_| DaemonError::Device(format!("bad device path {:?}", info.path)))?;

        let device = blocking(move || {
            let api = api.lock().unwrap_or_else(|e| e.into_inner());
            api.open_path(&path).map_err(hid_err)
        })
        .await?;

        debug!("Opened HID device {}", info.path);
        Ok(Box::new(HidTransport {
            info: info.clone(),
            device: Arc::new(Mutex::new(device)),
        }))
    }
}

/// An open KeepKey HID interface
pub struct HidTransport {
    info: DeviceInfo,
    device: Arc<Mutex<HidDevice>>,
}

#[async_trait]
impl DeviceTransport for HidTransport {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    async fn read_chunk(&self) -> Result<Chunk> {
        let device = Arc::clone(&self.device);
        blocking(move || {
            let device = device.lock().unwrap_or_else(|e| e.into_inner());
            let mut buf = [0u8; CHUNK_SIZE];
            let n = device
                .read_timeout(&mut buf, READ_TIMEOUT.as_millis() as i32)
                .map_err(hid_err)?;
            if n == 0 {
                return Err(DaemonError::Device("read timed out".to_string()));
            }
            Ok(Chunk::new(buf[..n].to_vec()))
        })
        .await
    }

    async fn write_chunk(&self, chunk: &Chunk) -> Result<()> {
        if chunk.len() > CHUNK_SIZE {
            return Err(DaemonError::Device(format!(
                "chunk of {} bytes exceeds the {} byte report size",
                chunk.len(),
                CHUNK_SIZE
            )));
        }

        // Report id 0 followed by a zero-padded report
        let mut report = [0u8; CHUNK_SIZE + 1];
        report[1..=chunk.len()].copy_from_slice(chunk.as_bytes());

        let device = Arc::clone(&self.device);
        blocking(move || {
            let device = device.lock().unwrap_or_else(|e| e.into_inner());
            device.write(&report).map_err(hid_err)?;
            Ok(())
        })
        .await
    }
}
