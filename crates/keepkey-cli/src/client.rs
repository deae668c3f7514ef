//! Client for the bridge's approver socket

use std::path::PathBuf;

use keepkey_core::{ApprovedOrigin, BridgeState, RequestId};
use keepkey_daemon::error::DaemonError;
use keepkey_daemon::ipc::{
    IpcClient, IpcRequest, IpcResponse, IpcSubscription, PendingPair, PendingSign,
};
use serde_json::Value;

/// Approver-side client for the KeepKey bridge
pub struct ApproverClient {
    inner: IpcClient,
}

/// Error type for client operations
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Bridge not running")]
    BridgeNotRunning,

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("No pending {kind} request matches '{prefix}'")]
    UnknownRequest { kind: &'static str, prefix: String },

    #[error("'{prefix}' matches {count} pending {kind} requests, use more characters")]
    AmbiguousRequest {
        kind: &'static str,
        prefix: String,
        count: usize,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Bridge error: {0}")]
    Bridge(String),
}

impl From<DaemonError> for ClientError {
    fn from(e: DaemonError) -> Self {
        match &e {
            DaemonError::Ipc(msg) if msg.contains("not running") => ClientError::BridgeNotRunning,
            _ => ClientError::Bridge(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Bridge status as reported over IPC
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub state: BridgeState,
    pub status: String,
    pub device_connected: bool,
    pub bridge_running: bool,
}

/// Everything waiting on the user
#[derive(Debug, Clone, Default)]
pub struct PendingQueue {
    pub pairs: Vec<PendingPair>,
    pub signs: Vec<PendingSign>,
}

impl PendingQueue {
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty() && self.signs.is_empty()
    }

    /// Resolve a (possibly shortened) pairing request id
    pub fn find_pair(&self, prefix: &str) -> Result<RequestId> {
        match_request_id("pairing", prefix, self.pairs.iter().map(|p| p.request_id))
    }

    /// Resolve a (possibly shortened) signing request id
    pub fn find_sign(&self, prefix: &str) -> Result<RequestId> {
        match_request_id("signing", prefix, self.signs.iter().map(|s| s.request_id))
    }
}

/// Pick the single id starting with `prefix`
///
/// Dashes are ignored, so both the short form shown by `pending` and a full
/// UUID work.
pub fn match_request_id(
    kind: &'static str,
    prefix: &str,
    candidates: impl Iterator<Item = RequestId>,
) -> Result<RequestId> {
    let wanted: String = prefix
        .trim()
        .chars()
        .filter(|c| *c != '-')
        .flat_map(char::to_lowercase)
        .collect();

    let unknown = || ClientError::UnknownRequest {
        kind,
        prefix: prefix.to_string(),
    };
    if wanted.is_empty() {
        return Err(unknown());
    }

    let matches: Vec<RequestId> = candidates
        .filter(|id| id.to_string().replace('-', "").starts_with(&wanted))
        .collect();

    match matches.as_slice() {
        [id] => Ok(*id),
        [] => Err(unknown()),
        _ => Err(ClientError::AmbiguousRequest {
            kind,
            prefix: prefix.to_string(),
            count: matches.len(),
        }),
    }
}

impl ApproverClient {
    pub fn new(socket_path: PathBuf) -> Self {
        Self {
            inner: IpcClient::new(socket_path),
        }
    }

    async fn request(&self, request: IpcRequest) -> Result<IpcResponse> {
        match self.inner.request(&request).await? {
            IpcResponse::Error { message } => Err(ClientError::RequestFailed(message)),
            response => Ok(response),
        }
    }

    async fn expect_ok(&self, request: IpcRequest) -> Result<()> {
        match self.request(request).await? {
            IpcResponse::Ok => Ok(()),
            other => Err(ClientError::UnexpectedResponse(format!("{:?}", other))),
        }
    }

    /// Bridge version, if it answers
    pub async fn ping(&self) -> Result<String> {
        match self.request(IpcRequest::Ping).await? {
            IpcResponse::Pong { version } => Ok(version),
            other => Err(ClientError::UnexpectedResponse(format!("{:?}", other))),
        }
    }

    pub async fn status(&self) -> Result<StatusReport> {
        match self.request(IpcRequest::GetStatus).await? {
            IpcResponse::Status {
                state,
                status,
                device_connected,
                bridge_running,
            } => Ok(StatusReport {
                state,
                status,
                device_connected,
                bridge_running,
            }),
            other => Err(ClientError::UnexpectedResponse(format!("{:?}", other))),
        }
    }

    pub async fn pending(&self) -> Result<PendingQueue> {
        match self.request(IpcRequest::ListPending).await? {
            IpcResponse::Pending { pairs, signs } => Ok(PendingQueue { pairs, signs }),
            other => Err(ClientError::UnexpectedResponse(format!("{:?}", other))),
        }
    }

    pub async fn approve_pair(&self, request_id: RequestId) -> Result<()> {
        self.expect_ok(IpcRequest::ApprovePair { request_id }).await
    }

    pub async fn reject_pair(&self, request_id: RequestId) -> Result<()> {
        self.expect_ok(IpcRequest::RejectPair { request_id }).await
    }

    pub async fn submit_signed_tx(&self, request_id: RequestId, signed_tx: Value) -> Result<()> {
        self.expect_ok(IpcRequest::SubmitSignedTx {
            request_id,
            signed_tx,
        })
        .await
    }

    pub async fn reject_sign(&self, request_id: RequestId) -> Result<()> {
        self.expect_ok(IpcRequest::RejectSign { request_id }).await
    }

    pub async fn origins(&self) -> Result<Vec<ApprovedOrigin>> {
        match self.request(IpcRequest::ListOrigins).await? {
            IpcResponse::Origins { origins } => Ok(origins),
            other => Err(ClientError::UnexpectedResponse(format!("{:?}", other))),
        }
    }

    pub async fn start_bridge(&self) -> Result<()> {
        self.expect_ok(IpcRequest::StartBridge).await
    }

    pub async fn stop_bridge(&self) -> Result<()> {
        self.expect_ok(IpcRequest::StopBridge).await
    }

    pub async fn subscribe(&self) -> Result<IpcSubscription> {
        Ok(self.inner.subscribe().await?)
    }
}
