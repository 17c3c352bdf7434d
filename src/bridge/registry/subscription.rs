//! Subscription registry for long-lived observations.
//!
//! Entries persist across deliveries until `remove()` or `remove_all()`.
//!
//! # Removal vs. in-flight delivery
//!
//! `fetch()` hands out a shared entry without holding the map lock, so a
//! delivery may still be running when `remove()` is called. Each entry
//! guards its sink with its own lock: a delivery forwards while holding it,
//! and `remove()` takes the sink under it. `remove()` therefore waits for a
//! forward already in progress, and once it returns no forward can start.
//! Forwarding is a non-blocking channel send, so no application code runs
//! under either lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::debug;
use tokio::sync::mpsc;

use crate::bridge::protocol::{CallId, Reply};
use crate::error::{ClientError, ClientResult, LockResultExt};

/// A raw update as delivered by the transport, already classified as success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub id: CallId,
    pub data: String,
    pub checksum: u64,
}

/// Streaming handler of a subscription.
pub(crate) type UpdateSink = mpsc::UnboundedSender<ClientResult<Update>>;

/// What happened to a single delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Forwarded {
    /// Handed to the consumer
    Delivered,
    /// Same checksum as the previous update
    Unchanged,
    /// Entry already removed, or consumer gone
    Inactive,
}

struct EntrySlot {
    sink: Option<UpdateSink>,
    last_checksum: Option<u64>,
}

/// A live subscription.
pub(crate) struct SubscriptionEntry {
    id: CallId,
    slot: Mutex<EntrySlot>,
}

impl SubscriptionEntry {
    fn new(id: CallId, sink: UpdateSink) -> Self {
        Self {
            id,
            slot: Mutex::new(EntrySlot {
                sink: Some(sink),
                last_checksum: None,
            }),
        }
    }

    pub(crate) fn id(&self) -> CallId {
        self.id
    }

    #[cfg(test)]
    pub(crate) fn last_checksum(&self) -> Option<u64> {
        self.slot
            .lock()
            .recover_poison("SubscriptionEntry::last_checksum")
            .last_checksum
    }

    /// Forward one delivery to the consumer, if the entry is still active.
    pub(crate) fn forward(&self, data: String, checksum: u64, error: &str) -> Forwarded {
        let mut slot = self
            .slot
            .lock()
            .recover_poison("SubscriptionEntry::forward");
        let Some(sink) = slot.sink.as_ref() else {
            return Forwarded::Inactive;
        };

        let item = match Reply::classify(data, error).into_result() {
            Ok(data) => {
                if slot.last_checksum == Some(checksum) {
                    return Forwarded::Unchanged;
                }
                Ok(Update {
                    id: self.id,
                    data,
                    checksum,
                })
            }
            Err(e) => Err(e),
        };

        let is_update = item.is_ok();
        if sink.send(item).is_err() {
            return Forwarded::Inactive;
        }
        if is_update {
            slot.last_checksum = Some(checksum);
        }
        Forwarded::Delivered
    }

    /// Detach the sink, waiting for a forward already in progress.
    ///
    /// With `terminal`, the consumer receives it as its last item.
    fn deactivate(&self, terminal: Option<ClientError>) -> bool {
        let sink = self
            .slot
            .lock()
            .recover_poison("SubscriptionEntry::deactivate")
            .sink
            .take();
        match (sink, terminal) {
            (Some(sink), Some(err)) => {
                let _ = sink.send(Err(err));
                true
            }
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

struct SubscriptionState {
    entries: HashMap<CallId, Arc<SubscriptionEntry>>,
    /// Set once by `remove_all()`; no subscription can be registered afterwards.
    closed: bool,
}

/// Maps subscription ids to their streaming handlers.
pub(crate) struct SubscriptionRegistry {
    state: Mutex<SubscriptionState>,
}

impl SubscriptionRegistry {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(SubscriptionState {
                entries: HashMap::new(),
                closed: false,
            }),
        }
    }

    /// Issue an observe through `issue` and register the sink under the
    /// returned id, both under the registry lock.
    pub(crate) fn issue(
        &self,
        sink: UpdateSink,
        issue: impl FnOnce() -> CallId,
    ) -> ClientResult<CallId> {
        let mut state = self
            .state
            .lock()
            .recover_poison("SubscriptionRegistry::issue");
        if state.closed {
            return Err(ClientError::Cancelled);
        }
        let id = issue();
        Self::insert_locked(&mut state, id, sink)?;
        Ok(id)
    }

    /// Register a sink for a subscription whose id is already known.
    #[cfg(test)]
    pub(crate) fn register(&self, id: CallId, sink: UpdateSink) -> ClientResult<()> {
        let mut state = self
            .state
            .lock()
            .recover_poison("SubscriptionRegistry::register");
        if state.closed {
            return Err(ClientError::Cancelled);
        }
        Self::insert_locked(&mut state, id, sink)
    }

    fn insert_locked(
        state: &mut SubscriptionState,
        id: CallId,
        sink: UpdateSink,
    ) -> ClientResult<()> {
        if state.entries.contains_key(&id) {
            log::warn!(
                target: "based_client::registry",
                "Transport reused live observe id {}",
                id
            );
            return Err(ClientError::DuplicateCallId(id));
        }
        state
            .entries
            .insert(id, Arc::new(SubscriptionEntry::new(id, sink)));
        Ok(())
    }

    /// Look up an entry without removing it.
    pub(crate) fn fetch(&self, id: CallId) -> Option<Arc<SubscriptionEntry>> {
        self.state
            .lock()
            .recover_poison("SubscriptionRegistry::fetch")
            .entries
            .get(&id)
            .cloned()
    }

    /// Remove an entry. Idempotent: returns `false` if it was already gone.
    ///
    /// When this returns, no delivery for `id` can reach the consumer.
    pub(crate) fn remove(&self, id: CallId) -> bool {
        let entry = self
            .state
            .lock()
            .recover_poison("SubscriptionRegistry::remove")
            .entries
            .remove(&id);
        match entry {
            Some(entry) => entry.deactivate(None),
            None => false,
        }
    }

    pub(crate) fn active_count(&self) -> usize {
        self.state
            .lock()
            .recover_poison("SubscriptionRegistry::active_count")
            .entries
            .len()
    }

    /// Close the registry and end every stream with `Cancelled`.
    ///
    /// Returns the ids that were live, so the caller can unregister them
    /// with the transport.
    pub(crate) fn remove_all(&self) -> Vec<CallId> {
        let entries: Vec<Arc<SubscriptionEntry>> = {
            let mut state = self
                .state
                .lock()
                .recover_poison("SubscriptionRegistry::remove_all");
            state.closed = true;
            state.entries.drain().map(|(_, entry)| entry).collect()
        };

        entries
            .into_iter()
            .map(|entry| {
                debug!(
                    target: "based_client::registry",
                    "Cancelling subscription {}",
                    entry.id()
                );
                entry.deactivate(Some(ClientError::Cancelled));
                entry.id()
            })
            .collect()
    }
}
