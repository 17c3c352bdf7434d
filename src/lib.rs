pub mod bridge;
pub mod client;
pub mod config;
pub mod error;
pub mod transport;

pub use bridge::protocol::{CallId, CallKind};
pub use client::{Client, Subscription};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use transport::Transport;
pub use transport::loopback::LoopbackTransport;
