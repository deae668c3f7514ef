//! Unix domain socket endpoint

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tokio::net::{UnixListener, UnixStream};
use tracing::debug;

use crate::error::{DaemonError, Result};

/// Stream an approver holds
pub type ClientStream = UnixStream;

/// Approver socket owned by the bridge; the socket file goes away on drop
pub struct Listener {
    inner: UnixListener,
    socket_path: PathBuf,
}

impl Listener {
    pub async fn bind(path: &Path) -> Result<Self> {
        // Stale socket from a previous run
        if path.exists() {
            std::fs::remove_file(path)?;
        }

        let inner = UnixListener::bind(path)
            .map_err(|e| DaemonError::Ipc(format!("Failed to bind socket: {}", e)))?;

        // Only the owning user may approve requests
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;

        Ok(Self {
            inner,
            socket_path: path.to_path_buf(),
        })
    }

    pub async fn accept(&self) -> Result<UnixStream> {
        let (stream, _) = self
            .inner
            .accept()
            .await
            .map_err(|e| DaemonError::Ipc(format!("Accept failed: {}", e)))?;
        Ok(stream)
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if self.socket_path.exists() {
            debug!("Removing socket {:?}", self.socket_path);
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}

/// Connect to a running bridge
pub async fn dial(path: &Path) -> Result<ClientStream> {
    UnixStream::connect(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused => {
            DaemonError::Ipc("Bridge not running".to_string())
        }
        _ => DaemonError::Ipc(format!("Failed to connect: {}", e)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_socket_is_private_and_removed_on_drop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bridge.sock");

        let listener = Listener::bind(&path).await.unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        let client = tokio::spawn({
            let path = path.clone();
            async move { dial(&path).await }
        });
        listener.accept().await.unwrap();
        client.await.unwrap().unwrap();

        drop(listener);
        assert!(!path.exists());
        assert!(matches!(dial(&path).await, Err(DaemonError::Ipc(m)) if m == "Bridge not running"));
    }
}
