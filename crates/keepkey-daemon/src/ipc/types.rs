//! IPC protocol types
//!
//! Platform-agnostic message types for bridge-approver communication. One
//! JSON document per line, tagged by `type`.

use chrono::{DateTime, Utc};
use keepkey_core::{ApprovedOrigin, BridgeState, Origin, RequestId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::BridgeEvent;
use crate::pairing::PairRequest;
use crate::pending::PendingEntry;
use crate::signer::SignRequest;

/// IPC request types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IpcRequest {
    /// Check if the bridge is running
    Ping,

    /// Get the bridge state
    GetStatus,

    /// List pairing and sign requests waiting for a decision
    ListPending,

    /// Approve a pairing request
    ApprovePair { request_id: RequestId },

    /// Reject a pairing request
    RejectPair { request_id: RequestId },

    /// Deliver the signed transaction for a sign request
    SubmitSignedTx {
        request_id: RequestId,
        signed_tx: Value,
    },

    /// Reject a sign request
    RejectSign { request_id: RequestId },

    /// List approved origins
    ListOrigins,

    /// Start the HTTP server
    StartBridge,

    /// Stop the HTTP server
    StopBridge,

    /// Stream events on this connection until it closes
    Subscribe,
}

/// IPC response types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IpcResponse {
    /// Success with no data
    Ok,

    /// Pong response
    Pong { version: String },

    /// Error response
    Error { message: String },

    /// Bridge status
    Status {
        state: BridgeState,
        status: String,
        device_connected: bool,
        bridge_running: bool,
    },

    /// Requests waiting for a decision
    Pending {
        pairs: Vec<PendingPair>,
        signs: Vec<PendingSign>,
    },

    /// Approved origins
    Origins { origins: Vec<ApprovedOrigin> },

    /// Subscription accepted; `Event` lines follow
    Subscribed,

    /// A streamed event
    Event { event: BridgeEvent },
}

/// A pairing request as shown to the approver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPair {
    pub request_id: RequestId,
    pub origin: Origin,
    pub code: String,
    pub requested_at: DateTime<Utc>,
}

impl From<PendingEntry<PairRequest>> for PendingPair {
    fn from(entry: PendingEntry<PairRequest>) -> Self {
        Self {
            request_id: entry.id,
            origin: entry.request.origin,
            code: entry.request.code,
            requested_at: entry.requested_at,
        }
    }
}

/// A sign request as shown to the approver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingSign {
    pub request_id: RequestId,
    pub origin: Option<Origin>,
    pub payload: Value,
    pub requested_at: DateTime<Utc>,
}

impl From<PendingEntry<SignRequest>> for PendingSign {
    fn from(entry: PendingEntry<SignRequest>) -> Self {
        Self {
            request_id: entry.id,
            origin: entry.request.origin,
            payload: entry.request.payload,
            requested_at: entry.requested_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let id = RequestId::new();
        let line = format!(
            r#"{{"type":"SubmitSignedTx","request_id":"{}","signed_tx":{{"txid":"ab"}}}}"#,
            id
        );
        let request: IpcRequest = serde_json::from_str(&line).unwrap();
        assert_eq!(
            request,
            IpcRequest::SubmitSignedTx {
                request_id: id,
                signed_tx: json!({ "txid": "ab" }),
            }
        );

        let ping: IpcRequest = serde_json::from_str(r#"{"type":"Ping"}"#).unwrap();
        assert_eq!(ping, IpcRequest::Ping);
    }

    #[test]
    fn test_bad_request_id_is_rejected() {
        assert!(
            serde_json::from_str::<IpcRequest>(r#"{"type":"ApprovePair","request_id":"nope"}"#)
                .is_err()
        );
    }

    #[test]
    fn test_event_response_nests_event() {
        let response = IpcResponse::Event {
            event: BridgeEvent::DeviceDetached,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["type"], "Event");
        assert_eq!(json["event"]["event"], "device_detached");

        let back: IpcResponse = serde_json::from_value(json).unwrap();
        assert_eq!(back, response);
    }
}
