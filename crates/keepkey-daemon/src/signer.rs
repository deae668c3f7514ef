//! Sign request gate
//!
//! `/sign` hands an opaque wallet payload to the approver and waits until the
//! approver submits the signed transaction for that request, or rejects it.

use keepkey_core::{Origin, RequestId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{DaemonError, Result};
use crate::events::{BridgeEvent, CancelGuard, EventBus, Resolution};
use crate::pending::{PendingEntry, PendingRequests};

/// A payload waiting to be signed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignRequest {
    pub origin: Option<Origin>,
    pub payload: Value,
}

/// How a sign request ended
#[derive(Debug, Clone, PartialEq)]
pub enum SignOutcome {
    /// The signed transaction exactly as the approver submitted it
    Signed(Value),
    Rejected,
}

/// Gate between `/sign` and the approver
pub struct SignGate {
    pending: PendingRequests<SignRequest, SignOutcome>,
    events: EventBus,
    timeout: Duration,
}

impl SignGate {
    pub fn new(events: EventBus, timeout: Duration) -> Self {
        Self {
            pending: PendingRequests::new(),
            events,
            timeout,
        }
    }

    /// Queue a payload for signing and wait for the result
    pub async fn request(&self, origin: Option<Origin>, payload: Value) -> Result<SignOutcome> {
        let ticket = self.pending.register(SignRequest {
            origin: origin.clone(),
            payload: payload.clone(),
        });
        let request_id = ticket.id();
        info!(
            "Sign request {} from {}",
            request_id.short(),
            origin.as_ref().map(Origin::as_str).unwrap_or("unknown origin")
        );

        self.events.publish(BridgeEvent::SignRequested {
            request_id,
            origin,
            payload,
        });

        let mut guard = CancelGuard::new(&self.events, request_id);
        let outcome = ticket.wait(self.timeout).await;
        if !matches!(outcome, Err(DaemonError::Cancelled)) {
            guard.disarm();
        }

        if let Err(DaemonError::Timeout) = outcome {
            warn!("Sign request {} timed out", request_id.short());
            self.events.publish(BridgeEvent::RequestResolved {
                request_id,
                resolution: Resolution::TimedOut,
            });
        }
        outcome
    }

    /// Deliver the signed transaction to the waiting request
    pub fn submit(&self, request_id: &RequestId, signed_tx: Value) -> Result<()> {
        self.pending
            .resolve(request_id, SignOutcome::Signed(signed_tx))?;
        info!("Sign request {} signed", request_id.short());
        self.events.publish(BridgeEvent::RequestResolved {
            request_id: *request_id,
            resolution: Resolution::Signed,
        });
        Ok(())
    }

    /// Refuse a sign request
    pub fn reject(&self, request_id: &RequestId) -> Result<()> {
        self.pending.resolve(request_id, SignOutcome::Rejected)?;
        info!("Sign request {} rejected", request_id.short());
        self.events.publish(BridgeEvent::RequestResolved {
            request_id: *request_id,
            resolution: Resolution::Rejected,
        });
        Ok(())
    }

    /// Requests still waiting, oldest first
    pub fn pending(&self) -> Vec<PendingEntry<SignRequest>> {
        self.pending.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    async fn next_sign_request(
        rx: &mut tokio::sync::broadcast::Receiver<BridgeEvent>,
    ) -> (RequestId, Value) {
        loop {
            if let BridgeEvent::SignRequested {
                request_id, payload, ..
            } = rx.recv().await.unwrap()
            {
                return (request_id, payload);
            }
        }
    }

    #[tokio::test]
    async fn test_submit_returns_exact_payload() {
        let events = EventBus::new();
        let gate = Arc::new(SignGate::new(events.clone(), Duration::from_secs(5)));
        let mut rx = events.subscribe();

        let tx = json!({ "coin": "BTC", "inputs": [{ "amount": "1000" }] });
        let g = gate.clone();
        let expected = tx.clone();
        let waiter = tokio::spawn(async move { g.request(None, expected).await });

        let (id, payload) = next_sign_request(&mut rx).await;
        assert_eq!(payload, tx);

        let signed = json!({ "serializedTx": "0200000001abcdef", "txid": "deadbeef" });
        gate.submit(&id, signed.clone()).unwrap();

        assert_eq!(waiter.await.unwrap().unwrap(), SignOutcome::Signed(signed));
        assert!(gate.pending().is_empty());
    }

    #[tokio::test]
    async fn test_second_request_waits_for_its_own_result() {
        let events = EventBus::new();
        let gate = Arc::new(SignGate::new(events.clone(), Duration::from_secs(5)));
        let mut rx = events.subscribe();

        let g = gate.clone();
        let first = tokio::spawn(async move { g.request(None, json!({ "n": 1 })).await });
        let (first_id, _) = next_sign_request(&mut rx).await;
        gate.submit(&first_id, json!("signed-1")).unwrap();
        first.await.unwrap().unwrap();

        let g = gate.clone();
        let second = tokio::spawn(async move { g.request(None, json!({ "n": 2 })).await });
        let (second_id, _) = next_sign_request(&mut rx).await;
        assert_ne!(first_id, second_id);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!second.is_finished());

        // The old id is spent
        assert!(gate.submit(&first_id, json!("stale")).is_err());

        gate.reject(&second_id).unwrap();
        assert_eq!(second.await.unwrap().unwrap(), SignOutcome::Rejected);
    }

    #[tokio::test]
    async fn test_timeout() {
        let gate = SignGate::new(EventBus::new(), Duration::from_millis(20));
        let err = gate.request(None, json!({})).await.unwrap_err();
        assert!(matches!(err, DaemonError::Timeout));
        assert!(gate.pending().is_empty());
    }
}
