//! Request correlation
//!
//! Engine replies are matched to their callers by an id embedded in the
//! request, not by message order. The correlator hands out strictly
//! increasing ids, parks one completion slot per id and fulfils it when the
//! reply arrives.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::common::{Error, Result};

/// Correlation id shared by every correlated engine command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationId(pub u64);

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A reserved slot waiting for its reply
#[derive(Debug)]
pub struct PendingReply {
    pub id: CorrelationId,
    rx: oneshot::Receiver<Value>,
}

/// Pending-request table
#[derive(Debug)]
pub struct Correlator {
    next_id: AtomicU64,
    pending: Mutex<HashMap<CorrelationId, oneshot::Sender<Value>>>,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Reserve a fresh id and its completion slot
    pub fn allocate(&self) -> PendingReply {
        let id = CorrelationId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);
        tracing::trace!(%id, "Correlated request registered");
        PendingReply { id, rx }
    }

    /// Fulfil the slot for `id`; unknown ids are ignored
    ///
    /// Returns whether a waiting slot was found.
    pub fn resolve(&self, id: CorrelationId, reply: Value) -> bool {
        let Some(tx) = self.pending.lock().remove(&id) else {
            tracing::debug!(%id, "Reply for unknown or consumed request ignored");
            return false;
        };
        // The waiter may have given up already; that is not an error
        let _ = tx.send(reply);
        true
    }

    /// Release a slot without fulfilling it
    pub fn cancel(&self, id: CorrelationId) {
        self.pending.lock().remove(&id);
    }

    /// Fail every outstanding request (channel lost)
    pub fn reject_all(&self) {
        let dropped = {
            let mut pending = self.pending.lock();
            let count = pending.len();
            pending.clear();
            count
        };
        if dropped > 0 {
            tracing::debug!(count = dropped, "Rejected pending engine requests");
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_pending(&self, id: CorrelationId) -> bool {
        self.pending.lock().contains_key(&id)
    }

    /// Wait for a reply, optionally bounded
    ///
    /// On timeout the slot is released, so a late reply becomes a no-op.
    pub async fn wait(&self, pending: PendingReply, timeout: Option<Duration>) -> Result<Value> {
        let PendingReply { id, rx } = pending;

        let Some(timeout) = timeout else {
            return rx.await.map_err(|_| Error::ConnectionClosed);
        };

        match tokio::time::timeout(timeout, rx).await {
            Ok(reply) => reply.map_err(|_| Error::ConnectionClosed),
            Err(_) => {
                self.cancel(id);
                tracing::debug!(%id, timeout_ms = timeout.as_millis() as u64, "Correlated request timed out");
                Err(Error::RequestTimeout(timeout.as_millis() as u64))
            }
        }
    }
}
