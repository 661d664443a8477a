//! The correlation table matching asynchronous replies to waiting callers.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
        PoisonError,
    },
};

use log::debug;
use tokio::{sync::oneshot, time::Instant};

use super::{Response, SendError};

/// A reply, or the failure that ended the wait.
pub(crate) type ReplyResult = Result<Response, SendError>;

struct PendingReply {
    slot: oneshot::Sender<ReplyResult>,
    armed_at: Instant,
}

/// Outstanding requests keyed by correlation id.
///
/// Shared between the reply consumer and every in-flight send; both sides
/// hold the lock only long enough to move an entry in or out. At most one
/// entry exists per correlation id at any instant.
#[derive(Default)]
pub(crate) struct CorrelationTable {
    entries: Mutex<HashMap<String, PendingReply>>,
    orphans: AtomicU64,
}

impl CorrelationTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Arm a reply slot for `correlation_id`.
    ///
    /// Installed before the request is published, so a reply cannot arrive
    /// ahead of its entry.
    pub(crate) fn insert(
        &self,
        correlation_id: &str,
    ) -> Result<oneshot::Receiver<ReplyResult>, SendError> {
        let (slot, receiver) = oneshot::channel();
        let mut entries = self.lock();
        if entries.contains_key(correlation_id) {
            return Err(SendError::DuplicateCorrelationId(correlation_id.to_owned()));
        }
        entries.insert(
            correlation_id.to_owned(),
            PendingReply {
                slot,
                armed_at: Instant::now(),
            },
        );
        Ok(receiver)
    }

    /// Drop the entry for `correlation_id`, if still present.
    pub(crate) fn remove(&self, correlation_id: &str) {
        self.lock().remove(correlation_id);
    }

    /// Route `response` to the waiting caller.
    ///
    /// Returns `false` for orphans: replies whose entry was already removed
    /// by timeout, cancellation or disconnect.
    pub(crate) fn complete(&self, correlation_id: &str, response: Response) -> bool {
        let Some(pending) = self.lock().remove(correlation_id) else {
            self.note_orphan();
            return false;
        };
        debug!(
            "client: reply for correlation id '{correlation_id}' after {:?}",
            pending.armed_at.elapsed()
        );
        if pending.slot.send(Ok(response)).is_err() {
            // The caller raced away between removal and delivery.
            self.note_orphan();
            return false;
        }
        true
    }

    /// Fail every outstanding entry, clearing the table.
    pub(crate) fn fail_all(&self, error: impl Fn() -> SendError) {
        let entries = std::mem::take(&mut *self.lock());
        for (_, pending) in entries {
            let _ = pending.slot.send(Err(error()));
        }
    }

    /// Record a reply that matched no entry.
    pub(crate) fn note_orphan(&self) {
        self.orphans.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of outstanding entries.
    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    /// Number of replies discarded for want of a matching entry.
    pub(crate) fn orphans(&self) -> u64 {
        self.orphans.load(Ordering::Relaxed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingReply>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
