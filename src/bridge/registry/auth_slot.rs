//! Singleton slot for the pending authentication.
//!
//! Auth deliveries carry no id, so at most one authentication can be
//! pending. A newer `authenticate()` supersedes the older one, which
//! resolves with `Cancelled`.

use std::sync::Mutex;

use crate::bridge::registry::Completion;
use crate::error::{ClientError, ClientResult, LockResultExt};

struct AuthState {
    pending: Option<Completion>,
    closed: bool,
}

pub(crate) struct AuthSlot {
    state: Mutex<AuthState>,
}

impl AuthSlot {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(AuthState {
                pending: None,
                closed: false,
            }),
        }
    }

    /// Store `completion` and issue the auth call under the slot lock.
    pub(crate) fn issue(&self, completion: Completion, issue: impl FnOnce()) -> ClientResult<()> {
        let superseded = {
            let mut state = self.state.lock().recover_poison("AuthSlot::issue");
            if state.closed {
                return Err(ClientError::Cancelled);
            }
            let superseded = state.pending.replace(completion);
            issue();
            superseded
        };

        if let Some(previous) = superseded {
            let _ = previous.send(Err(ClientError::Cancelled));
        }
        Ok(())
    }

    /// Take the pending completion; a second delivery finds the slot empty.
    pub(crate) fn take(&self) -> Option<Completion> {
        self.state
            .lock()
            .recover_poison("AuthSlot::take")
            .pending
            .take()
    }

    #[cfg(test)]
    pub(crate) fn is_pending(&self) -> bool {
        self.state
            .lock()
            .recover_poison("AuthSlot::is_pending")
            .pending
            .is_some()
    }

    /// Close the slot, cancelling a pending authentication.
    pub(crate) fn cancel(&self) -> bool {
        let pending = {
            let mut state = self.state.lock().recover_poison("AuthSlot::cancel");
            state.closed = true;
            state.pending.take()
        };
        match pending {
            Some(completion) => {
                let _ = completion.send(Err(ClientError::Cancelled));
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[test]
    fn take_clears_slot() {
        let slot = AuthSlot::new();
        let (tx, _rx) = oneshot::channel();
        slot.issue(tx, || {}).unwrap();

        assert!(slot.is_pending());
        assert!(slot.take().is_some());
        assert!(slot.take().is_none(), "second delivery finds nothing");
    }

    #[tokio::test]
    async fn newer_authentication_supersedes_older() {
        let slot = AuthSlot::new();
        let (tx1, rx1) = oneshot::channel();
        let (tx2, _rx2) = oneshot::channel();

        slot.issue(tx1, || {}).unwrap();
        slot.issue(tx2, || {}).unwrap();

        assert!(matches!(rx1.await.unwrap(), Err(ClientError::Cancelled)));
        assert!(slot.is_pending());
    }

    #[tokio::test]
    async fn cancel_resolves_pending_and_closes() {
        let slot = AuthSlot::new();
        let (tx, rx) = oneshot::channel();
        slot.issue(tx, || {}).unwrap();

        assert!(slot.cancel());
        assert!(matches!(rx.await.unwrap(), Err(ClientError::Cancelled)));

        let (tx, _rx) = oneshot::channel();
        let mut issued = false;
        let result = slot.issue(tx, || issued = true);
        assert!(matches!(result, Err(ClientError::Cancelled)));
        assert!(!issued);
    }
}
