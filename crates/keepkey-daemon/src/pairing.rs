//! Pairing approval gate
//!
//! A web app calls `/pair/:code`; the user decides through the approver. An
//! approved origin is written to the allowlist and the code is registered
//! with Pioneer.

use keepkey_core::{Origin, RequestId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{DaemonError, Result};
use crate::events::{BridgeEvent, CancelGuard, EventBus, Resolution};
use crate::origin_store::OriginStore;
use crate::pending::{PendingEntry, PendingRequests};
use crate::pioneer::PioneerApi;

/// A pairing request waiting for the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairRequest {
    pub origin: Origin,
    pub code: String,
}

/// The user's answer to a pairing request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairDecision {
    Approve,
    Reject,
}

/// Result of a pairing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairOutcome {
    /// Paired; carries the code echoed back to the web app
    Approved { code: String },
    /// The user said no
    Rejected,
}

/// Gate between `/pair/:code` and the approver
pub struct PairingGate {
    pending: PendingRequests<PairRequest, PairDecision>,
    origins: Arc<RwLock<OriginStore>>,
    events: EventBus,
    pioneer: Option<Arc<dyn PioneerApi>>,
    timeout: Duration,
    require_reapproval: bool,
}

impl PairingGate {
    pub fn new(
        origins: Arc<RwLock<OriginStore>>,
        events: EventBus,
        pioneer: Option<Arc<dyn PioneerApi>>,
        timeout: Duration,
    ) -> Self {
        Self {
            pending: PendingRequests::new(),
            origins,
            events,
            pioneer,
            timeout,
            require_reapproval: false,
        }
    }

    /// Prompt even for origins already in the allowlist
    pub fn with_reapproval(mut self, require_reapproval: bool) -> Self {
        self.require_reapproval = require_reapproval;
        self
    }

    /// Check whether an origin is in the allowlist
    pub async fn is_approved(&self, origin: &Origin) -> bool {
        self.origins.read().await.contains(origin)
    }

    /// Ask the user to pair `origin`, waiting for the decision
    ///
    /// Resolves only on approval, rejection or timeout. Dropping the returned
    /// future withdraws the request.
    pub async fn request(&self, origin: Origin, code: String) -> Result<PairOutcome> {
        if !self.require_reapproval && self.is_approved(&origin).await {
            info!("Origin {} already approved, pairing without prompt", origin);
            self.register_code(&code).await?;
            return Ok(PairOutcome::Approved { code });
        }

        let ticket = self.pending.register(PairRequest {
            origin: origin.clone(),
            code: code.clone(),
        });
        let request_id = ticket.id();
        info!("Pair request {} from {}", request_id.short(), origin);

        self.events.publish(BridgeEvent::PairRequested {
            request_id,
            origin: origin.clone(),
            code: code.clone(),
        });

        let mut guard = CancelGuard::new(&self.events, request_id);
        let decision = ticket.wait(self.timeout).await;
        if !matches!(decision, Err(DaemonError::Cancelled)) {
            guard.disarm();
        }

        match decision {
            Ok(PairDecision::Approve) => {
                self.remember(origin).await?;
                self.register_code(&code).await?;
                Ok(PairOutcome::Approved { code })
            }
            Ok(PairDecision::Reject) => Ok(PairOutcome::Rejected),
            Err(DaemonError::Timeout) => {
                warn!("Pair request {} timed out", request_id.short());
                self.events.publish(BridgeEvent::RequestResolved {
                    request_id,
                    resolution: Resolution::TimedOut,
                });
                Err(DaemonError::Timeout)
            }
            Err(e) => Err(e),
        }
    }

    /// Approve a pending request
    ///
    /// The waiting request persists the origin, so nothing is written when
    /// the waiter has already gone away.
    pub async fn approve(&self, request_id: &RequestId) -> Result<()> {
        self.pending.resolve(request_id, PairDecision::Approve)?;
        info!("Pair request {} approved", request_id.short());
        self.events.publish(BridgeEvent::RequestResolved {
            request_id: *request_id,
            resolution: Resolution::Approved,
        });
        Ok(())
    }

    /// Reject a pending request
    pub fn reject(&self, request_id: &RequestId) -> Result<()> {
        self.pending.resolve(request_id, PairDecision::Reject)?;
        info!("Pair request {} rejected", request_id.short());
        self.events.publish(BridgeEvent::RequestResolved {
            request_id: *request_id,
            resolution: Resolution::Rejected,
        });
        Ok(())
    }

    /// Requests still waiting, oldest first
    pub fn pending(&self) -> Vec<PendingEntry<PairRequest>> {
        self.pending.snapshot()
    }

    async fn remember(&self, origin: Origin) -> Result<()> {
        if self.origins.write().await.insert(origin.clone())? {
            info!("Origin {} added to the allowlist", origin);
            self.events.publish(BridgeEvent::OriginApproved { origin });
        }
        Ok(())
    }

    async fn register_code(&self, code: &str) -> Result<()> {
        let pioneer = self.pioneer.as_ref().ok_or(DaemonError::PioneerUnavailable)?;
        let response = pioneer.pair(code).await?;
        debug!("Pioneer pair response: {}", response);
        Ok(())
    }
}
