//! Correlation registry for pending one-shot calls.
//!
//! Tracks `get`/`function` calls that are waiting for their single delivery
//! and hands each completion to exactly one taker.
//!
//! # Registration handshake
//!
//! The transport assigns the id, so the entry cannot be inserted before the
//! call is issued. `issue()` therefore holds the registry lock across the
//! transport call and the insertion. A delivery racing in on another thread
//! blocks in `take()` until the entry exists, so no response is lost. The
//! transport must not deliver synchronously on the issuing thread before
//! its call returns.

use std::collections::HashMap;
use std::sync::Mutex;

use log::{debug, warn};
use tokio::sync::oneshot;

use crate::bridge::protocol::{CallId, CallKind};
use crate::error::{ClientError, ClientResult, LockResultExt};

/// Completion handler of a one-shot call.
pub(crate) type Completion = oneshot::Sender<ClientResult<String>>;

/// A one-shot call waiting for its delivery.
pub(crate) struct PendingCall {
    kind: CallKind,
    id: CallId,
    completion: Completion,
}

impl PendingCall {
    pub(crate) fn kind(&self) -> CallKind {
        self.kind
    }

    pub(crate) fn id(&self) -> CallId {
        self.id
    }

    /// Resolve the call. Consumes the entry, so it can only happen once.
    ///
    /// Returns `false` if the caller stopped waiting.
    pub(crate) fn complete(self, result: ClientResult<String>) -> bool {
        self.completion.send(result).is_ok()
    }
}

/// Get and function ids come from independent counters in the native client,
/// so the kind is part of the key.
type CallKey = (CallKind, CallId);

struct CorrelationState {
    pending: HashMap<CallKey, PendingCall>,
    /// Set once by `remove_all()`; no call can be registered afterwards.
    closed: bool,
}

/// Maps one-shot call ids to their completion handlers.
pub(crate) struct CorrelationRegistry {
    state: Mutex<CorrelationState>,
}

impl CorrelationRegistry {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(CorrelationState {
                pending: HashMap::new(),
                closed: false,
            }),
        }
    }

    /// Issue a call through `issue` and register its completion under the
    /// returned id, both under the registry lock.
    ///
    /// Fails with `Cancelled` without calling `issue` once the registry is
    /// closed, and with `DuplicateCallId` if the transport hands out an id
    /// that is still pending (the existing entry is kept).
    pub(crate) fn issue(
        &self,
        kind: CallKind,
        completion: Completion,
        issue: impl FnOnce() -> CallId,
    ) -> ClientResult<CallId> {
        let mut state = self
            .state
            .lock()
            .recover_poison("CorrelationRegistry::issue");
        if state.closed {
            return Err(ClientError::Cancelled);
        }
        let id = issue();
        Self::insert_locked(&mut state, kind, id, completion)?;
        Ok(id)
    }

    /// Register a completion for a call whose id is already known.
    #[cfg(test)]
    pub(crate) fn register(
        &self,
        kind: CallKind,
        id: CallId,
        completion: Completion,
    ) -> ClientResult<()> {
        let mut state = self
            .state
            .lock()
            .recover_poison("CorrelationRegistry::register");
        if state.closed {
            return Err(ClientError::Cancelled);
        }
        Self::insert_locked(&mut state, kind, id, completion)
    }

    fn insert_locked(
        state: &mut CorrelationState,
        kind: CallKind,
        id: CallId,
        completion: Completion,
    ) -> ClientResult<()> {
        if state.pending.contains_key(&(kind, id)) {
            warn!(
                target: "based_client::registry",
                "Transport reused live {} id {}",
                kind,
                id
            );
            return Err(ClientError::DuplicateCallId(id));
        }
        state.pending.insert(
            (kind, id),
            PendingCall {
                kind,
                id,
                completion,
            },
        );
        Ok(())
    }

    /// Atomically look up and remove the entry for `id`.
    ///
    /// Exactly one concurrent taker gets the entry; everyone else gets `None`.
    pub(crate) fn take(&self, kind: CallKind, id: CallId) -> Option<PendingCall> {
        self.state
            .lock()
            .recover_poison("CorrelationRegistry::take")
            .pending
            .remove(&(kind, id))
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.state
            .lock()
            .recover_poison("CorrelationRegistry::pending_count")
            .pending
            .len()
    }

    /// Close the registry and resolve every pending call with `Cancelled`.
    ///
    /// Returns the number of calls that were still pending.
    pub(crate) fn remove_all(&self) -> usize {
        let entries: Vec<PendingCall> = {
            let mut state = self
                .state
                .lock()
                .recover_poison("CorrelationRegistry::remove_all");
            state.closed = true;
            state.pending.drain().map(|(_, call)| call).collect()
        };

        // Completions are resolved outside the lock
        let count = entries.len();
        for call in entries {
            debug!(
                target: "based_client::registry",
                "Cancelling pending {} {}",
                call.kind(),
                call.id()
            );
            call.complete(Err(ClientError::Cancelled));
        }
        count
    }
}
