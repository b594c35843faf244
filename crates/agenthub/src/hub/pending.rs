//! Pending-request table correlating agent replies with waiting callers.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use log::debug;
use tokio::sync::oneshot;

/// Prefix of generated request identifiers.
const REQUEST_ID_PREFIX: &str = "req-";

/// Why a wait ended without a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    /// The timeout elapsed first.
    TimedOut,
    /// The slot's sender was dropped without a value.
    Closed,
}

/// Table of in-flight request identifiers.
///
/// Each entry is a single-slot handoff: at most one `resolve` delivers a
/// payload, and whoever removes the entry first (resolver or timed-out waiter)
/// wins. Cloning shares the same table.
#[derive(Clone, Default)]
pub struct PendingRequests {
    /// Request ID -> reply slot
    slots: Arc<DashMap<String, oneshot::Sender<String>>>,
}

impl PendingRequests {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh request identifier, collision-resistant (random 128-bit).
    pub fn next_request_id() -> String {
        format!("{}{}", REQUEST_ID_PREFIX, uuid::Uuid::new_v4().simple())
    }

    /// Create an entry for `rid` and return the handle to wait on.
    ///
    /// Registering an id that is already pending replaces the older slot; its
    /// waiter then observes [`WaitError::Closed`].
    pub fn register(&self, rid: impl Into<String>) -> PendingReply {
        let rid = rid.into();
        let (tx, rx) = oneshot::channel();
        self.slots.insert(rid.clone(), tx);
        PendingReply {
            rid,
            rx,
            slots: Arc::clone(&self.slots),
        }
    }

    /// Deliver `payload` to the waiter for `rid`.
    ///
    /// Unknown, already-resolved and timed-out ids are a silent no-op; the
    /// return value only reports whether a waiter was found.
    pub fn resolve(&self, rid: &str, payload: String) -> bool {
        let Some((_, tx)) = self.slots.remove(rid) else {
            debug!("No pending request for rid {}, dropping reply", rid);
            return false;
        };
        // The waiter may have been dropped between removal and send.
        tx.send(payload).is_ok()
    }

    /// Whether `rid` is still awaiting a reply.
    pub fn contains(&self, rid: &str) -> bool {
        self.slots.contains_key(rid)
    }

    /// Number of in-flight requests.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Caller's side of a pending request.
///
/// Dropping it (timeout or cancellation of the calling task) removes the
/// table entry, so abandoned requests never accumulate.
pub struct PendingReply {
    rid: String,
    rx: oneshot::Receiver<String>,
    slots: Arc<DashMap<String, oneshot::Sender<String>>>,
}

impl PendingReply {
    /// Wait for the payload for at most `timeout`.
    pub async fn wait(mut self, timeout: Duration) -> Result<String, WaitError> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(_)) => Err(WaitError::Closed),
            Err(_) => {
                self.rx.close();
                if self.release() {
                    return Err(WaitError::TimedOut);
                }
                // A resolver claimed the entry before the deadline; a value it
                // sent before the close above is still readable.
                self.rx.try_recv().map_err(|_| WaitError::TimedOut)
            }
        }
    }

    /// Remove this reply's own entry. A newer registration under the same id
    /// has an open receiver and is left alone.
    fn release(&self) -> bool {
        self.slots
            .remove_if(&self.rid, |_, tx| tx.is_closed())
            .is_some()
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        self.rx.close();
        self.release();
    }
}

impl std::fmt::Debug for PendingReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingReply").field("rid", &self.rid).finish()
    }
}
