//! IPC server implementation

use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::context::{BridgeControl, DaemonContext};
use crate::error::Result;
use crate::events::BridgeEvent;

use super::connection::{framed, FrameReader, FrameWriter, Listener};
use super::types::{IpcRequest, IpcResponse};

/// IPC server
pub struct IpcServer {
    /// Socket path
    socket_path: PathBuf,

    /// Runtime services
    context: DaemonContext,

    /// HTTP server handle for start/stop requests
    bridge: Option<Arc<dyn BridgeControl>>,
}

impl IpcServer {
    /// Create a new IPC server
    pub fn new(socket_path: PathBuf, context: DaemonContext) -> Self {
        Self {
            socket_path,
            context,
            bridge: None,
        }
    }

    /// Let approvers start and stop the HTTP server
    pub fn with_bridge_control(mut self, bridge: Arc<dyn BridgeControl>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Start the IPC server
    pub async fn run(&self) -> Result<()> {
        let listener = Listener::bind(&self.socket_path).await?;

        info!("IPC server listening on {:?}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok(stream) => {
                    let context = self.context.clone();
                    let bridge = self.bridge.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, context, bridge).await {
                            error!("Connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}

/// Handle a single IPC connection
async fn handle_connection<S>(
    stream: S,
    context: DaemonContext,
    bridge: Option<Arc<dyn BridgeControl>>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite,
{
    let (mut reader, mut writer) = framed(stream);

    while let Some(line) = reader.next_line().await? {
        let request: IpcRequest = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(e) => {
                let response = IpcResponse::Error {
                    message: format!("Invalid request: {}", e),
                };
                writer.send(&response).await?;
                continue;
            }
        };

        debug!("Received IPC request: {:?}", request);

        // Subscribe before acknowledging so no event slips between the two
        let events = matches!(request, IpcRequest::Subscribe).then(|| context.events.subscribe());

        let response = handle_request(request, &context, bridge.as_deref()).await;
        writer.send(&response).await?;

        if let Some(events) = events {
            return stream_events(reader, writer, events).await;
        }
    }

    Ok(())
}

/// Forward events until the client hangs up
async fn stream_events<S>(
    mut reader: FrameReader<S>,
    mut writer: FrameWriter<S>,
    mut events: broadcast::Receiver<BridgeEvent>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite,
{
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => writer.send(&IpcResponse::Event { event }).await?,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Subscriber lagged, skipped {} event(s)", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            },
            // Anything a subscriber sends is ignored
            line = reader.next_line() => {
                if line?.is_none() {
                    debug!("Subscriber disconnected");
                    return Ok(());
                }
            }
        }
    }
}

/// Handle a single request
async fn handle_request(
    request: IpcRequest,
    context: &DaemonContext,
    bridge: Option<&dyn BridgeControl>,
) -> IpcResponse {
    match request {
        IpcRequest::Ping => IpcResponse::Pong {
            version: env!("CARGO_PKG_VERSION").to_string(),
        },

        IpcRequest::GetStatus => {
            let status = context.status.current();
            IpcResponse::Status {
                state: status.state,
                status: status.status,
                device_connected: status.device_connected,
                bridge_running: status.bridge_running,
            }
        }

        IpcRequest::ListPending => IpcResponse::Pending {
            pairs: context.pairing.pending().into_iter().map(Into::into).collect(),
            signs: context.signer.pending().into_iter().map(Into::into).collect(),
        },

        IpcRequest::ApprovePair { request_id } => {
            match context.pairing.approve(&request_id).await {
                Ok(()) => IpcResponse::Ok,
                Err(e) => IpcResponse::Error {
                    message: format!("Failed to approve pairing: {}", e),
                },
            }
        }

        IpcRequest::RejectPair { request_id } => match context.pairing.reject(&request_id) {
            Ok(()) => IpcResponse::Ok,
            Err(e) => IpcResponse::Error {
                message: format!("Failed to reject pairing: {}", e),
            },
        },

        IpcRequest::SubmitSignedTx {
            request_id,
            signed_tx,
        } => match context.signer.submit(&request_id, signed_tx) {
            Ok(()) => IpcResponse::Ok,
            Err(e) => IpcResponse::Error {
                message: format!("Failed to submit signed transaction: {}", e),
            },
        },

        IpcRequest::RejectSign { request_id } => match context.signer.reject(&request_id) {
            Ok(()) => IpcResponse::Ok,
            Err(e) => IpcResponse::Error {
                message: format!("Failed to reject sign request: {}", e),
            },
        },

        IpcRequest::ListOrigins => IpcResponse::Origins {
            origins: context.origins.read().await.list().to_vec(),
        },

        IpcRequest::StartBridge => match bridge {
            Some(bridge) => match bridge.start().await {
                Ok(()) => IpcResponse::Ok,
                Err(e) => IpcResponse::Error {
                    message: format!("Failed to start bridge: {}", e),
                },
            },
            None => IpcResponse::Error {
                message: "Bridge control not available".to_string(),
            },
        },

        IpcRequest::StopBridge => match bridge {
            Some(bridge) => match bridge.stop().await {
                Ok(()) => IpcResponse::Ok,
                Err(e) => IpcResponse::Error {
                    message: format!("Failed to stop bridge: {}", e),
                },
            },
            None => IpcResponse::Error {
                message: "Bridge control not available".to_string(),
            },
        },

        IpcRequest::Subscribe => IpcResponse::Subscribed,
    }
}
