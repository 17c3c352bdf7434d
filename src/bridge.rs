//! Correlation and subscription layer between the client facade and the
//! callback-driven transport.

pub(crate) mod dispatch;
pub mod protocol;
pub(crate) mod registry;
mod sink;

pub use registry::Update;
pub use sink::{AuthSink, CallSink, ObserveSink};
