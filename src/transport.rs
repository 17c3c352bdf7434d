//! Transport adapter contract.
//!
//! The transport owns the wire connection and the native client. The core
//! only consumes it: it issues calls, gets an id back, and later receives
//! results through the sinks it handed over.
//!
//! # Delivery contract
//!
//! - Sinks may be invoked from any thread, any number of times, concurrently
//!   for different ids.
//! - A sink must not be invoked synchronously on the issuing thread before
//!   the issuing call has returned. The client holds the matching registry
//!   lock across the issuing call so that deliveries racing in from other
//!   threads wait until the id is registered; a synchronous re-entry would
//!   deadlock instead.
//! - Within one subscription id, the order of `ObserveSink::deliver` calls
//!   is the order the consumer sees.

pub mod loopback;

pub use crate::bridge::{AuthSink, CallSink, ObserveSink};

use crate::bridge::protocol::CallId;
use crate::config::ClientConfig;
use crate::error::ClientResult;

/// A connection to the realtime backend.
///
/// Only the owning `Client` creates and deletes the handle.
pub trait Transport: Send + Sync + 'static {
    /// Open a connection for `config`.
    fn create(config: &ClientConfig) -> ClientResult<Self>
    where
        Self: Sized;

    /// Issue a one-shot read of `name`.
    fn get(&self, name: &str, payload: &str, on_event: CallSink) -> CallId;

    /// Invoke the remote function `name`.
    fn function(&self, name: &str, payload: &str, on_event: CallSink) -> CallId;

    /// Start observing `name`. Deliveries continue until `unobserve`.
    fn observe(&self, name: &str, payload: &str, on_event: ObserveSink) -> CallId;

    /// Stop deliveries for subscription `id`.
    fn unobserve(&self, id: CallId);

    /// Authenticate the connection with `token`.
    fn auth(&self, token: &str, on_event: AuthSink);

    /// Release the connection. Called once, after every subscription has
    /// been unobserved.
    fn delete(&self);
}
