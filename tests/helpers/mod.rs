//! Scripted transport for integration tests.
//!
//! Records every adapter call and lets the test deliver events from a
//! foreign thread at a time of its choosing. Sinks are kept after
//! `unobserve` so tests can simulate late deliveries.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use based_client::transport::{AuthSink, CallSink, ObserveSink};
use based_client::{CallId, CallKind, Client, ClientConfig, ClientResult, Transport};

/// Reply computed from `(name, payload)`: `(data, error)`.
pub type AutoReply = Arc<dyn Fn(&str, &str) -> (String, String) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCall {
    pub kind: CallKind,
    pub id: CallId,
    pub name: String,
    pub payload: String,
}

#[derive(Default)]
struct MockState {
    issued: Vec<IssuedCall>,
    call_sinks: HashMap<(CallKind, CallId), CallSink>,
    observations: Vec<(CallId, String, String)>,
    observe_sinks: HashMap<CallId, ObserveSink>,
    auth_tokens: Vec<String>,
    auth_sink: Option<AuthSink>,
    unobserved: Vec<CallId>,
    deleted: usize,
}

#[derive(Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    next_call_id: AtomicI64,
    next_observe_id: AtomicI64,
    auto_reply: Mutex<Option<AutoReply>>,
}

impl MockTransport {
    /// Reply to every get/function from a new thread that starts before the
    /// issuing call returns.
    pub fn with_auto_reply(reply: AutoReply) -> Self {
        let transport = Self::default();
        *transport.auto_reply.lock().unwrap() = Some(reply);
        transport
    }

    /// Handle onto the recorded state that outlives the client.
    pub fn probe(&self) -> MockProbe {
        MockProbe {
            state: Arc::clone(&self.state),
        }
    }

    pub fn issued(&self) -> Vec<IssuedCall> {
        self.state.lock().unwrap().issued.clone()
    }

    pub fn observations(&self) -> Vec<(CallId, String, String)> {
        self.state.lock().unwrap().observations.clone()
    }

    pub fn unobserved(&self) -> Vec<CallId> {
        self.state.lock().unwrap().unobserved.clone()
    }

    pub fn auth_tokens(&self) -> Vec<String> {
        self.state.lock().unwrap().auth_tokens.clone()
    }

    pub fn deleted(&self) -> usize {
        self.state.lock().unwrap().deleted
    }

    /// Deliver a one-shot result from a foreign thread and wait for it.
    pub fn reply(&self, kind: CallKind, id: CallId, data: &str, error: &str) {
        let sink = self
            .state
            .lock()
            .unwrap()
            .call_sinks
            .get(&(kind, id))
            .cloned()
            .expect("no sink for call");
        let (data, error) = (data.to_string(), error.to_string());
        std::thread::spawn(move || sink.deliver(id, data, error))
            .join()
            .unwrap();
    }

    /// Deliver a result for `id` through the sink handed over for `via`.
    pub fn deliver_stray(&self, kind: CallKind, via: CallId, id: CallId, data: &str) {
        let sink = self
            .state
            .lock()
            .unwrap()
            .call_sinks
            .get(&(kind, via))
            .cloned()
            .expect("no sink for call");
        let data = data.to_string();
        std::thread::spawn(move || sink.deliver(id, data, ""))
            .join()
            .unwrap();
    }

    /// Deliver an observe update from a foreign thread and wait for it.
    pub fn push(&self, id: CallId, data: &str, checksum: u64, error: &str) {
        self.probe().push(id, data, checksum, error);
    }

    pub fn complete_auth(&self, data: &str) {
        let sink = self
            .state
            .lock()
            .unwrap()
            .auth_sink
            .clone()
            .expect("no auth pending");
        let data = data.to_string();
        std::thread::spawn(move || sink.deliver(data)).join().unwrap();
    }

    fn issue(&self, kind: CallKind, name: &str, payload: &str, sink: CallSink) -> CallId {
        let id = CallId::new(self.next_call_id.fetch_add(1, Ordering::SeqCst) + 1);
        {
            let mut state = self.state.lock().unwrap();
            state.issued.push(IssuedCall {
                kind,
                id,
                name: name.to_string(),
                payload: payload.to_string(),
            });
            state.call_sinks.insert((kind, id), sink.clone());
        }

        let auto_reply = self.auto_reply.lock().unwrap().clone();
        if let Some(reply) = auto_reply {
            let (data, error) = reply(name, payload);
            std::thread::spawn(move || sink.deliver(id, data, error));
            // Give the delivery thread a head start on the registration.
            std::thread::sleep(Duration::from_millis(1));
        }
        id
    }
}

impl Transport for MockTransport {
    fn create(_config: &ClientConfig) -> ClientResult<Self> {
        Ok(Self::default())
    }

    fn get(&self, name: &str, payload: &str, on_event: CallSink) -> CallId {
        self.issue(CallKind::Get, name, payload, on_event)
    }

    fn function(&self, name: &str, payload: &str, on_event: CallSink) -> CallId {
        self.issue(CallKind::Function, name, payload, on_event)
    }

    fn observe(&self, name: &str, payload: &str, on_event: ObserveSink) -> CallId {
        let id = CallId::new(self.next_observe_id.fetch_add(1, Ordering::SeqCst) + 1);
        let mut state = self.state.lock().unwrap();
        state
            .observations
            .push((id, name.to_string(), payload.to_string()));
        state.observe_sinks.insert(id, on_event);
        id
    }

    fn unobserve(&self, id: CallId) {
        self.state.lock().unwrap().unobserved.push(id);
    }

    fn auth(&self, token: &str, on_event: AuthSink) {
        let mut state = self.state.lock().unwrap();
        state.auth_tokens.push(token.to_string());
        state.auth_sink = Some(on_event);
    }

    fn delete(&self) {
        self.state.lock().unwrap().deleted += 1;
    }
}

#[derive(Clone)]
pub struct MockProbe {
    state: Arc<Mutex<MockState>>,
}

impl MockProbe {
    pub fn unobserved(&self) -> Vec<CallId> {
        self.state.lock().unwrap().unobserved.clone()
    }

    pub fn deleted(&self) -> usize {
        self.state.lock().unwrap().deleted
    }

    pub fn push(&self, id: CallId, data: &str, checksum: u64, error: &str) {
        let sink = self
            .state
            .lock()
            .unwrap()
            .observe_sinks
            .get(&id)
            .cloned()
            .expect("no sink for observation");
        let (data, error) = (data.to_string(), error.to_string());
        std::thread::spawn(move || sink.deliver(id, data, checksum, error))
            .join()
            .unwrap();
    }
}

pub fn config() -> ClientConfig {
    ClientConfig::new("airhub", "airhub", "edge")
}

pub fn mock_client() -> Client<MockTransport> {
    Client::with_transport(config(), MockTransport::default())
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    condition()
}
