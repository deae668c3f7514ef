//! IPC client implementation

use std::path::PathBuf;

use crate::error::{DaemonError, Result};
use crate::events::BridgeEvent;

use super::connection::{dial, framed, ClientStream, FrameReader, FrameWriter};
use super::types::{IpcRequest, IpcResponse};

/// IPC client for approver use
pub struct IpcClient {
    socket_path: PathBuf,
}

impl IpcClient {
    /// Create a new IPC client
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    /// Send a request and get a response
    pub async fn request(&self, request: &IpcRequest) -> Result<IpcResponse> {
        let (mut reader, mut writer) = framed(dial(&self.socket_path).await?);

        writer.send(request).await?;
        reader
            .recv()
            .await?
            .ok_or_else(|| DaemonError::Ipc("Bridge closed the connection".to_string()))
    }

    /// Check if the bridge is running
    pub async fn ping(&self) -> bool {
        matches!(
            self.request(&IpcRequest::Ping).await,
            Ok(IpcResponse::Pong { .. })
        )
    }

    /// Open a connection that streams bridge events
    pub async fn subscribe(&self) -> Result<IpcSubscription> {
        let (mut reader, mut writer) = framed(dial(&self.socket_path).await?);

        writer.send(&IpcRequest::Subscribe).await?;
        match reader.recv().await? {
            Some(IpcResponse::Subscribed) => Ok(IpcSubscription {
                reader,
                _writer: writer,
            }),
            Some(IpcResponse::Error { message }) => Err(DaemonError::Ipc(message)),
            other => Err(DaemonError::Ipc(format!(
                "Unexpected subscribe response: {:?}",
                other
            ))),
        }
    }
}

/// A live event stream from the bridge
pub struct IpcSubscription {
    reader: FrameReader<ClientStream>,
    // Held so the bridge does not see the connection close
    _writer: FrameWriter<ClientStream>,
}

impl IpcSubscription {
    /// Wait for the next event; `None` once the bridge closes the stream
    pub async fn next_event(&mut self) -> Result<Option<BridgeEvent>> {
        while let Some(response) = self.reader.recv().await? {
            if let IpcResponse::Event { event } = response {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }
}
