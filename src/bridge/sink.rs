//! Delivery entry points handed to the transport.
//!
//! Each sink holds only a weak reference to its client's dispatch core.
//! After the client is torn down, deliveries through a sink are dropped.

use std::fmt;
use std::sync::{Arc, Weak};

use log::debug;

use crate::bridge::dispatch::{DispatchCore, Event};
use crate::bridge::protocol::{CallId, CallKind};

fn dispatch(core: &Weak<DispatchCore>, event: Event) {
    match core.upgrade() {
        Some(core) => core.on_event(event),
        None => debug!(
            target: "based_client::dispatch",
            "Delivery after client teardown, dropping"
        ),
    }
}

/// Delivery entry point for `get` and `function` calls.
#[derive(Clone)]
pub struct CallSink {
    kind: CallKind,
    core: Weak<DispatchCore>,
}

impl CallSink {
    pub(crate) fn new(kind: CallKind, core: &Arc<DispatchCore>) -> Self {
        Self {
            kind,
            core: Arc::downgrade(core),
        }
    }

    pub fn kind(&self) -> CallKind {
        self.kind
    }

    /// Deliver the result of call `id`. An empty `error` means success.
    pub fn deliver(&self, id: CallId, data: impl Into<String>, error: impl Into<String>) {
        dispatch(
            &self.core,
            Event::Call {
                kind: self.kind,
                id,
                data: data.into(),
                error: error.into(),
            },
        );
    }
}

impl fmt::Debug for CallSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallSink").field("kind", &self.kind).finish()
    }
}

/// Delivery entry point for subscriptions.
#[derive(Clone)]
pub struct ObserveSink {
    core: Weak<DispatchCore>,
}

impl ObserveSink {
    pub(crate) fn new(core: &Arc<DispatchCore>) -> Self {
        Self {
            core: Arc::downgrade(core),
        }
    }

    /// Deliver an update (or an error) for subscription `id`.
    pub fn deliver(
        &self,
        id: CallId,
        data: impl Into<String>,
        checksum: u64,
        error: impl Into<String>,
    ) {
        dispatch(
            &self.core,
            Event::Observe {
                id,
                data: data.into(),
                checksum,
                error: error.into(),
            },
        );
    }
}

impl fmt::Debug for ObserveSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserveSink").finish_non_exhaustive()
    }
}

/// Delivery entry point for authentication.
#[derive(Clone)]
pub struct AuthSink {
    core: Weak<DispatchCore>,
}

impl AuthSink {
    pub(crate) fn new(core: &Arc<DispatchCore>) -> Self {
        Self {
            core: Arc::downgrade(core),
        }
    }

    pub fn deliver(&self, data: impl Into<String>) {
        dispatch(&self.core, Event::Auth { data: data.into() });
    }
}

impl fmt::Debug for AuthSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSink").finish_non_exhaustive()
    }
}
