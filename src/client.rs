//! Client facade: one-shot calls as futures, observations as streams.
//!
//! A `Client` owns the transport handle and the dispatch core with its
//! registries. Clones share both. Teardown happens on `close()` or when the
//! last clone is dropped:
//! 1. every live subscription is removed and unobserved with the transport
//! 2. every pending one-shot call resolves with `Cancelled`
//! 3. a pending authentication resolves with `Cancelled`
//! 4. the transport handle is deleted
//!
//! Calls issued after teardown started fail with `Cancelled` without
//! reaching the transport.

mod subscription;

pub use subscription::Subscription;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, oneshot};

use crate::bridge::dispatch::DispatchCore;
use crate::bridge::protocol::{CallId, CallKind, decode};
use crate::bridge::{AuthSink, CallSink, ObserveSink};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::transport::Transport;

/// Function the backend exposes for database queries.
pub const DB_GET_FUNCTION: &str = "based-db-get";

pub(crate) struct ClientInner<T: Transport> {
    config: ClientConfig,
    transport: T,
    core: Arc<DispatchCore>,
    torn_down: AtomicBool,
}

impl<T: Transport> ClientInner<T> {
    /// Remove a subscription and stop its deliveries at the transport.
    ///
    /// Only the first call for an id reaches the transport.
    pub(crate) fn unobserve(&self, id: CallId) -> bool {
        if !self.core.subscriptions().remove(id) {
            return false;
        }
        debug!(target: "based_client::client", "Unobserve {}", id);
        self.transport.unobserve(id);
        true
    }

    fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }

        let subscriptions = self.core.subscriptions().remove_all();
        for id in &subscriptions {
            self.transport.unobserve(*id);
        }
        let cancelled = self.core.calls().remove_all();
        self.core.auth().cancel();
        self.transport.delete();

        debug!(
            target: "based_client::client",
            "Client torn down ({} subscriptions unobserved, {} calls cancelled)",
            subscriptions.len(),
            cancelled
        );
    }
}

impl<T: Transport> Drop for ClientInner<T> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Handle to a realtime backend connection.
pub struct Client<T: Transport> {
    inner: Arc<ClientInner<T>>,
}

impl<T: Transport> Clone for Client<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> Client<T> {
    /// Validate `config` and create the transport for it.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        config.validate()?;
        let transport = T::create(&config)?;
        Ok(Self::with_transport(config, transport))
    }

    /// Wrap an already created transport handle.
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        debug!(
            target: "based_client::client",
            "Creating client for {}/{}/{} on {}",
            config.org,
            config.project,
            config.env,
            config.cluster
        );
        Self {
            inner: Arc::new(ClientInner {
                config,
                transport,
                core: Arc::new(DispatchCore::new()),
                torn_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    /// One-shot read of `name`.
    pub async fn get<R: DeserializeOwned>(
        &self,
        name: &str,
        payload: &impl Serialize,
    ) -> ClientResult<R> {
        self.request(CallKind::Get, name, payload).await
    }

    /// Invoke the remote function `name`.
    pub async fn function<R: DeserializeOwned>(
        &self,
        name: &str,
        payload: &impl Serialize,
    ) -> ClientResult<R> {
        self.request(CallKind::Function, name, payload).await
    }

    /// Run a database query through the `based-db-get` function.
    pub async fn query<R: DeserializeOwned>(&self, query: &impl Serialize) -> ClientResult<R> {
        self.function(DB_GET_FUNCTION, query).await
    }

    /// Issue a one-shot call and wait for its single delivery.
    ///
    /// Resolves with the decoded reply, the mapped error, or `Cancelled` if
    /// the client is torn down first. Dropping the future before it resolves
    /// forgets the call; a later delivery for it is dropped.
    pub async fn request<R: DeserializeOwned>(
        &self,
        kind: CallKind,
        name: &str,
        payload: &impl Serialize,
    ) -> ClientResult<R> {
        let (id, rx) = self.issue_call(kind, name, payload)?;
        let guard = AbandonGuard {
            core: &self.inner.core,
            kind,
            id,
        };
        let reply = rx.await;
        // Resolved: the entry is already gone and the id may be reused.
        std::mem::forget(guard);

        let data = reply.map_err(|_| ClientError::Cancelled)??;
        decode(&data)
    }

    fn issue_call(
        &self,
        kind: CallKind,
        name: &str,
        payload: &impl Serialize,
    ) -> ClientResult<(CallId, oneshot::Receiver<ClientResult<String>>)> {
        let payload = encode(payload)?;
        let (tx, rx) = oneshot::channel();
        let sink = CallSink::new(kind, &self.inner.core);
        let transport = &self.inner.transport;

        let id = self.inner.core.calls().issue(kind, tx, || match kind {
            CallKind::Get => transport.get(name, &payload, sink),
            CallKind::Function => transport.function(name, &payload, sink),
        })?;
        debug!(
            target: "based_client::client",
            "Issued {} {} as {}",
            kind,
            name,
            id
        );
        Ok((id, rx))
    }

    /// Start observing `name`.
    ///
    /// The returned stream yields every update until it is cancelled or
    /// dropped, a terminal error arrives, or the client is torn down.
    pub fn observe<R: DeserializeOwned>(
        &self,
        name: &str,
        payload: &impl Serialize,
    ) -> ClientResult<Subscription<R, T>> {
        let payload = encode(payload)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = ObserveSink::new(&self.inner.core);
        let transport = &self.inner.transport;

        let id = self
            .inner
            .core
            .subscriptions()
            .issue(tx, || transport.observe(name, &payload, sink))?;
        debug!(target: "based_client::client", "Observe {} as {}", name, id);
        Ok(Subscription::new(id, rx, Arc::downgrade(&self.inner)))
    }

    /// Stop subscription `id`. Returns `false` if it was already stopped.
    pub fn unobserve(&self, id: CallId) -> bool {
        self.inner.unobserve(id)
    }

    /// Authenticate the connection with `token`.
    ///
    /// Resolves with the auth state reported by the backend. A newer call
    /// supersedes a pending one, which resolves with `Cancelled`.
    pub async fn authenticate(&self, token: &str) -> ClientResult<String> {
        let (tx, rx) = oneshot::channel();
        let sink = AuthSink::new(&self.inner.core);
        let transport = &self.inner.transport;
        self.inner
            .core
            .auth()
            .issue(tx, || transport.auth(token, sink))?;
        rx.await.map_err(|_| ClientError::Cancelled)?
    }

    /// Number of one-shot calls waiting for a delivery.
    pub fn pending_calls(&self) -> usize {
        self.inner.core.calls().pending_count()
    }

    /// Number of live subscriptions.
    pub fn active_subscriptions(&self) -> usize {
        self.inner.core.subscriptions().active_count()
    }

    /// Tear the client down for every clone. Idempotent.
    pub fn close(&self) {
        self.inner.teardown();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.torn_down.load(Ordering::SeqCst)
    }
}

/// Removes the entry of a one-shot call whose caller stopped waiting.
struct AbandonGuard<'a> {
    core: &'a DispatchCore,
    kind: CallKind,
    id: CallId,
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        if self.core.calls().take(self.kind, self.id).is_some() {
            debug!(
                target: "based_client::client",
                "Caller of {} {} went away, forgetting the call",
                self.kind,
                self.id
            );
        }
    }
}

fn encode(payload: &impl Serialize) -> ClientResult<String> {
    serde_json::to_string(payload).map_err(ClientError::Encode)
}
