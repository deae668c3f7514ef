//! Windows named pipe endpoint

use std::path::Path;
use std::time::Duration;
use tokio::net::windows::named_pipe::{
    ClientOptions, NamedPipeClient, NamedPipeServer, ServerOptions,
};
use tokio::sync::Mutex;

use crate::error::{DaemonError, Result};

/// All pipe instances are busy
const ERROR_PIPE_BUSY: i32 = 231;

/// Stream an approver holds
pub type ClientStream = NamedPipeClient;

fn pipe_name(path: &Path) -> Result<String> {
    path.to_str()
        .map(str::to_owned)
        .ok_or_else(|| DaemonError::Ipc(format!("Invalid pipe name: {:?}", path)))
}

fn new_instance(name: &str, first: bool) -> Result<NamedPipeServer> {
    ServerOptions::new()
        .first_pipe_instance(first)
        .create(name)
        .map_err(|e| DaemonError::Ipc(format!("Failed to create pipe: {}", e)))
}

/// Approver pipe owned by the bridge
///
/// An instance serves one approver, so the next one is created as soon as
/// the current one connects.
pub struct Listener {
    name: String,
    waiting: Mutex<NamedPipeServer>,
}

impl Listener {
    pub async fn bind(path: &Path) -> Result<Self> {
        let name = pipe_name(path)?;
        let waiting = new_instance(&name, true)?;
        Ok(Self {
            name,
            waiting: Mutex::new(waiting),
        })
    }

    pub async fn accept(&self) -> Result<NamedPipeServer> {
        let mut waiting = self.waiting.lock().await;
        waiting
            .connect()
            .await
            .map_err(|e| DaemonError::Ipc(format!("Accept failed: {}", e)))?;

        let next = new_instance(&self.name, false)?;
        Ok(std::mem::replace(&mut *waiting, next))
    }
}

/// Connect to a running bridge, waiting out busy instances
pub async fn dial(path: &Path) -> Result<ClientStream> {
    let name = pipe_name(path)?;
    loop {
        match ClientOptions::new().open(&name) {
            Ok(client) => return Ok(client),
            Err(e) if e.raw_os_error() == Some(ERROR_PIPE_BUSY) => {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DaemonError::Ipc("Bridge not running".to_string()));
            }
            Err(e) => return Err(DaemonError::Ipc(format!("Failed to connect: {}", e))),
        }
    }
}
