//! Dispatch core: the single entry point for every transport delivery.
//!
//! The transport calls in from its own threads, concurrently and in any
//! order across ids. Each event is routed by kind:
//! - get/function: `take` from the correlation registry and resolve it
//! - observe: `fetch` from the subscription registry and forward
//! - auth: take the singleton auth slot
//!
//! Deliveries for ids with no registry entry (already completed, already
//! unobserved, never registered) are dropped with a debug log; duplicates
//! are structurally possible and never raise.
//!
//! Application code never runs on the transport thread. Completions are
//! oneshot senders and subscription handlers are channel senders; the
//! caller's task picks the value up on its own executor.

use log::debug;

use crate::bridge::protocol::{CallId, CallKind, Reply};
use crate::bridge::registry::{AuthSlot, CorrelationRegistry, Forwarded, SubscriptionRegistry};
use crate::error::ClientResult;

/// A single delivery from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    Call {
        kind: CallKind,
        id: CallId,
        data: String,
        error: String,
    },
    Observe {
        id: CallId,
        data: String,
        checksum: u64,
        error: String,
    },
    Auth {
        data: String,
    },
}

/// Registries of one client plus the routing between them.
pub(crate) struct DispatchCore {
    calls: CorrelationRegistry,
    subscriptions: SubscriptionRegistry,
    auth: AuthSlot,
}

impl DispatchCore {
    pub(crate) fn new() -> Self {
        Self {
            calls: CorrelationRegistry::new(),
            subscriptions: SubscriptionRegistry::new(),
            auth: AuthSlot::new(),
        }
    }

    pub(crate) fn calls(&self) -> &CorrelationRegistry {
        &self.calls
    }

    pub(crate) fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.subscriptions
    }

    pub(crate) fn auth(&self) -> &AuthSlot {
        &self.auth
    }

    pub(crate) fn on_event(&self, event: Event) {
        match event {
            Event::Call {
                kind,
                id,
                data,
                error,
            } => self.on_call(kind, id, data, &error),
            Event::Observe {
                id,
                data,
                checksum,
                error,
            } => self.on_observe(id, data, checksum, &error),
            Event::Auth { data } => self.on_auth(data),
        }
    }

    fn on_call(&self, kind: CallKind, id: CallId, data: String, error: &str) {
        let Some(call) = self.calls.take(kind, id) else {
            debug!(
                target: "based_client::dispatch",
                "No pending {} for id {}, dropping delivery",
                kind,
                id
            );
            return;
        };

        if !call.complete(Reply::classify(data, error).into_result()) {
            debug!(
                target: "based_client::dispatch",
                "Caller of {} {} stopped waiting",
                kind,
                id
            );
        }
    }

    fn on_observe(&self, id: CallId, data: String, checksum: u64, error: &str) {
        let Some(entry) = self.subscriptions.fetch(id) else {
            debug!(
                target: "based_client::dispatch",
                "No subscription for id {}, dropping delivery",
                id
            );
            return;
        };

        match entry.forward(data, checksum, error) {
            Forwarded::Delivered => {}
            Forwarded::Unchanged => debug!(
                target: "based_client::dispatch",
                "Subscription {} checksum {} unchanged, skipping",
                id,
                checksum
            ),
            Forwarded::Inactive => debug!(
                target: "based_client::dispatch",
                "Subscription {} no longer active, dropping delivery",
                id
            ),
        }
    }

    fn on_auth(&self, data: String) {
        if data.is_empty() {
            debug!(target: "based_client::dispatch", "Empty auth delivery, ignoring");
            return;
        }
        match self.auth.take() {
            Some(completion) => {
                let _ = completion.send(classify_auth(data));
            }
            None => debug!(
                target: "based_client::dispatch",
                "No pending authentication, dropping delivery"
            ),
        }
    }
}

/// Auth deliveries carry only data; a failed authentication is reported as
/// an `error` member inside it.
fn classify_auth(data: String) -> ClientResult<String> {
    let error = serde_json::from_str::<serde_json::Value>(&data)
        .ok()
        .and_then(|value| value.get("error").cloned());

    match error {
        None | Some(serde_json::Value::Null) => Ok(data),
        Some(serde_json::Value::String(message)) if message.is_empty() => Ok(data),
        Some(serde_json::Value::String(message)) => {
            Reply::classify(String::new(), &message).into_result()
        }
        Some(body) => Reply::classify(String::new(), &body.to_string()).into_result(),
    }
}
