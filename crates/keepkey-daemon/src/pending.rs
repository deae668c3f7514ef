//! Registry of requests waiting for a user decision
//!
//! Each request gets its own [`RequestId`] and its own oneshot channel. The
//! waiter holds a [`Ticket`]; dropping the ticket (timeout, or the HTTP client
//! going away) removes the entry, so nothing stale is left behind for the
//! approver to act on.

use chrono::{DateTime, Utc};
use keepkey_core::RequestId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;

use crate::error::{DaemonError, Result};

struct Slot<Q, R> {
    request: Q,
    requested_at: DateTime<Utc>,
    tx: oneshot::Sender<R>,
}

type Slots<Q, R> = Arc<Mutex<HashMap<RequestId, Slot<Q, R>>>>;

fn lock<Q, R>(slots: &Slots<Q, R>) -> MutexGuard<'_, HashMap<RequestId, Slot<Q, R>>> {
    slots.lock().unwrap_or_else(|e| e.into_inner())
}

/// Snapshot of one pending request
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEntry<Q> {
    pub id: RequestId,
    pub request: Q,
    pub requested_at: DateTime<Utc>,
}

/// Pending requests of type `Q`, each resolved with a value of type `R`
pub struct PendingRequests<Q, R> {
    slots: Slots<Q, R>,
}

impl<Q, R> PendingRequests<Q, R> {
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register a request and return the ticket its waiter holds
    pub fn register(&self, request: Q) -> Ticket<Q, R> {
        let id = RequestId::new();
        let (tx, rx) = oneshot::channel();

        lock(&self.slots).insert(
            id,
            Slot {
                request,
                requested_at: Utc::now(),
                tx,
            },
        );

        Ticket {
            id,
            rx: Some(rx),
            slots: Arc::clone(&self.slots),
        }
    }

    /// Complete a pending request
    ///
    /// Fails with [`DaemonError::UnknownRequest`] if the id was never issued or
    /// was already resolved, timed out or cancelled.
    pub fn resolve(&self, id: &RequestId, response: R) -> Result<()> {
        let slot = lock(&self.slots)
            .remove(id)
            .ok_or(DaemonError::UnknownRequest(*id))?;

        slot.tx
            .send(response)
            .map_err(|_| DaemonError::Cancelled)
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        lock(&self.slots).contains_key(id)
    }

    pub fn len(&self) -> usize {
        lock(&self.slots).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.slots).is_empty()
    }
}

impl<Q: Clone, R> PendingRequests<Q, R> {
    /// Look up a pending request
    pub fn get(&self, id: &RequestId) -> Option<PendingEntry<Q>> {
        lock(&self.slots).get(id).map(|slot| PendingEntry {
            id: *id,
            request: slot.request.clone(),
            requested_at: slot.requested_at,
        })
    }

    /// All pending requests, oldest first
    pub fn snapshot(&self) -> Vec<PendingEntry<Q>> {
        let mut entries: Vec<_> = lock(&self.slots)
            .iter()
            .map(|(id, slot)| PendingEntry {
                id: *id,
                request: slot.request.clone(),
                requested_at: slot.requested_at,
            })
            .collect();
        entries.sort_by_key(|e| e.requested_at);
        entries
    }
}

impl<Q, R> Default for PendingRequests<Q, R> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle held by the party waiting on a pending request
pub struct Ticket<Q, R> {
    id: RequestId,
    rx: Option<oneshot::Receiver<R>>,
    slots: Slots<Q, R>,
}

impl<Q, R> Ticket<Q, R> {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Wait for the decision, giving up after `timeout`
    pub async fn wait(mut self, timeout: Duration) -> Result<R> {
        let rx = self.rx.take().ok_or(DaemonError::Cancelled)?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(DaemonError::Cancelled),
            Err(_) => Err(DaemonError::Timeout),
        }
    }
}

#[cfg(test)]
impl<Q, R> Ticket<Q, R> {
    /// Stop listening while leaving the entry registered
    pub(crate) fn close(&mut self) {
        self.rx = None;
    }
}

impl<Q, R> Drop for Ticket<Q, R> {
    fn drop(&mut self) {
        lock(&self.slots).remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_delivers_to_the_right_waiter() {
        let pending: PendingRequests<&'static str, u32> = PendingRequests::new();

        let first = pending.register("first");
        let second = pending.register("second");
        let (first_id, second_id) = (first.id(), second.id());
        assert_ne!(first_id, second_id);
        assert_eq!(pending.len(), 2);

        pending.resolve(&second_id, 2).unwrap();
        pending.resolve(&first_id, 1).unwrap();

        assert_eq!(first.wait(Duration::from_secs(1)).await.unwrap(), 1);
        assert_eq!(second.wait(Duration::from_secs(1)).await.unwrap(), 2);
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_wait_blocks_until_resolved() {
        let pending = Arc::new(PendingRequests::<(), &'static str>::new());
        let ticket = pending.register(());
        let id = ticket.id();

        let waiter = tokio::spawn(async move { ticket.wait(Duration::from_secs(5)).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        pending.resolve(&id, "done").unwrap();
        assert_eq!(waiter.await.unwrap().unwrap(), "done");
    }

    #[tokio::test]
    async fn test_timeout_removes_entry() {
        let pending: PendingRequests<(), ()> = PendingRequests::new();
        let ticket = pending.register(());
        let id = ticket.id();

        let err = ticket.wait(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, DaemonError::Timeout));
        assert!(!pending.contains(&id));
        assert!(matches!(
            pending.resolve(&id, ()),
            Err(DaemonError::UnknownRequest(_))
        ));
    }

    #[test]
    fn test_dropped_ticket_removes_entry() {
        let pending: PendingRequests<(), ()> = PendingRequests::new();
        let ticket = pending.register(());
        let id = ticket.id();
        drop(ticket);
        assert!(!pending.contains(&id));
    }

    #[test]
    fn test_double_resolve_fails() {
        let pending: PendingRequests<(), u8> = PendingRequests::new();
        let ticket = pending.register(());
        let id = ticket.id();

        pending.resolve(&id, 1).unwrap();
        assert!(matches!(
            pending.resolve(&id, 2),
            Err(DaemonError::UnknownRequest(_))
        ));
        drop(ticket);
    }

    #[test]
    fn test_snapshot_is_oldest_first() {
        let pending: PendingRequests<u8, ()> = PendingRequests::new();
        let _a = pending.register(1);
        std::thread::sleep(Duration::from_millis(2));
        let _b = pending.register(2);

        let snapshot = pending.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].request, 1);
        assert_eq!(snapshot[1].request, 2);
    }
}
