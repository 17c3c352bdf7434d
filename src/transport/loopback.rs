//! In-process transport for demos and tests.
//!
//! Resources are plain Rust closures registered by name. Every reply is
//! delivered from a freshly spawned thread, so callers see the same
//! cross-thread delivery the native client produces. Observables tick on
//! their own thread until unobserved; the tick number is the checksum.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use dashmap::DashMap;
use log::{debug, warn};
use tokio_util::sync::CancellationToken;

use super::{AuthSink, CallSink, ObserveSink, Transport};
use crate::bridge::protocol::CallId;
use crate::config::ClientConfig;
use crate::error::ClientResult;

/// Replies to a get/function call with `Ok(data)` or `Err(error string)`.
pub type FunctionHandler = Arc<dyn Fn(&str) -> Result<String, String> + Send + Sync>;

/// Produces the data for tick `n` of an observation given its payload.
pub type ObservableHandler = Arc<dyn Fn(&str, u64) -> Result<String, String> + Send + Sync>;

const DEFAULT_TICK: Duration = Duration::from_millis(100);

fn not_found(name: &str) -> String {
    serde_json::json!({
        "code": 404,
        "message": format!("Resource not found: {name}"),
    })
    .to_string()
}

pub struct LoopbackTransport {
    functions: DashMap<String, FunctionHandler>,
    observables: DashMap<String, ObservableHandler>,
    observers: DashMap<CallId, CancellationToken>,
    next_call_id: AtomicI64,
    next_observe_id: AtomicI64,
    tick: Duration,
    unobserve_calls: AtomicUsize,
    deleted: AtomicBool,
}

impl LoopbackTransport {
    pub fn new(tick: Duration) -> Self {
        Self {
            functions: DashMap::new(),
            observables: DashMap::new(),
            observers: DashMap::new(),
            next_call_id: AtomicI64::new(1),
            next_observe_id: AtomicI64::new(1),
            tick,
            unobserve_calls: AtomicUsize::new(0),
            deleted: AtomicBool::new(false),
        }
    }

    /// Serve `name` for both `get` and `function` calls.
    pub fn register_function<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&str) -> Result<String, String> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(handler));
    }

    /// Serve `name` for `observe` calls.
    pub fn register_observable<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&str, u64) -> Result<String, String> + Send + Sync + 'static,
    {
        self.observables.insert(name.into(), Arc::new(handler));
    }

    /// Number of `unobserve` calls received so far.
    pub fn unobserve_calls(&self) -> usize {
        self.unobserve_calls.load(Ordering::SeqCst)
    }

    /// Number of observations still ticking.
    pub fn active_observers(&self) -> usize {
        self.observers.len()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::SeqCst)
    }

    fn reply(&self, name: &str, payload: &str, on_event: CallSink) -> CallId {
        let id = CallId::new(self.next_call_id.fetch_add(1, Ordering::SeqCst));
        let handler = self.functions.get(name).map(|h| Arc::clone(h.value()));
        let name = name.to_string();
        let payload = payload.to_string();

        thread::spawn(move || match handler {
            Some(handler) => match handler(&payload) {
                Ok(data) => on_event.deliver(id, data, ""),
                Err(error) => on_event.deliver(id, "", error),
            },
            None => on_event.deliver(id, "", not_found(&name)),
        });
        id
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new(DEFAULT_TICK)
    }
}

impl Transport for LoopbackTransport {
    fn create(config: &ClientConfig) -> ClientResult<Self> {
        debug!(
            target: "based_client::loopback",
            "Loopback connection for {}/{}/{}",
            config.org,
            config.project,
            config.env
        );
        Ok(Self::default())
    }

    fn get(&self, name: &str, payload: &str, on_event: CallSink) -> CallId {
        self.reply(name, payload, on_event)
    }

    fn function(&self, name: &str, payload: &str, on_event: CallSink) -> CallId {
        self.reply(name, payload, on_event)
    }

    fn observe(&self, name: &str, payload: &str, on_event: ObserveSink) -> CallId {
        let id = CallId::new(self.next_observe_id.fetch_add(1, Ordering::SeqCst));
        let token = CancellationToken::new();
        self.observers.insert(id, token.clone());

        let handler = self.observables.get(name).map(|h| Arc::clone(h.value()));
        let name = name.to_string();
        let payload = payload.to_string();
        let tick = self.tick;

        thread::spawn(move || {
            let Some(handler) = handler else {
                on_event.deliver(id, "", 0, not_found(&name));
                return;
            };
            let mut n = 1;
            while !token.is_cancelled() {
                match handler(&payload, n) {
                    Ok(data) => on_event.deliver(id, data, n, ""),
                    Err(error) => {
                        on_event.deliver(id, "", n, error);
                        break;
                    }
                }
                n += 1;
                thread::sleep(tick);
            }
            debug!(target: "based_client::loopback", "Observer {} stopped", id);
        });
        id
    }

    fn unobserve(&self, id: CallId) {
        self.unobserve_calls.fetch_add(1, Ordering::SeqCst);
        match self.observers.remove(&id) {
            Some((_, token)) => token.cancel(),
            None => warn!(
                target: "based_client::loopback",
                "Unobserve for unknown id {}",
                id
            ),
        }
    }

    fn auth(&self, token: &str, on_event: AuthSink) {
        let data = if token.is_empty() {
            serde_json::json!({"error": {"code": 401, "message": "Empty token"}})
        } else {
            serde_json::json!({"token": token, "authenticated": true})
        };
        thread::spawn(move || on_event.deliver(data.to_string()));
    }

    fn delete(&self) {
        self.deleted.store(true, Ordering::SeqCst);
        for entry in self.observers.iter() {
            entry.value().cancel();
        }
        self.observers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use crate::error::ClientError;
    use serde_json::{Value, json};

    fn client(transport: LoopbackTransport) -> Client<LoopbackTransport> {
        Client::with_transport(ClientConfig::new("o", "p", "e"), transport)
    }

    #[tokio::test]
    async fn function_reply_is_delivered() {
        let transport = LoopbackTransport::default();
        transport.register_function("echo", |payload| Ok(payload.to_string()));
        let client = client(transport);

        let value: Value = client.function("echo", &json!({"a": 1})).await.unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[tokio::test]
    async fn unknown_resource_is_remote_error() {
        let client = client(LoopbackTransport::default());

        let result: ClientResult<Value> = client.get("missing", &json!({})).await;
        assert!(matches!(
            result,
            Err(ClientError::Remote { code: Some(code), .. }) if code == "404"
        ));
    }

    #[tokio::test]
    async fn auth_reports_state() {
        let client = client(LoopbackTransport::default());

        let state = client.authenticate("secret").await.unwrap();
        let state: Value = serde_json::from_str(&state).unwrap();
        assert_eq!(state["authenticated"], true);

        assert!(matches!(
            client.authenticate("").await,
            Err(ClientError::Remote { .. })
        ));
    }

    #[test]
    fn delete_stops_all_observers() {
        let transport = LoopbackTransport::new(Duration::from_millis(5));
        transport.register_observable("tick", |_, n| Ok(n.to_string()));
        let core = Arc::new(crate::bridge::dispatch::DispatchCore::new());

        transport.observe("tick", "{}", ObserveSink::new(&core));
        transport.observe("tick", "{}", ObserveSink::new(&core));
        assert_eq!(transport.active_observers(), 2);

        transport.delete();
        assert_eq!(transport.active_observers(), 0);
        assert!(transport.is_deleted());
    }
}
