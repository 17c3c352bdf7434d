//! Error handling types for based-client
//!
//! Every error is scoped to the single call or subscription it belongs to.
//! Nothing in here aborts the registries or other in-flight operations.

use std::sync::PoisonError;
use thiserror::Error;

use crate::bridge::protocol::CallId;

/// Error type surfaced to the caller of a single call or subscription
#[derive(Debug, Error)]
pub enum ClientError {
    /// Backend reported a structured failure for this call
    #[error("Remote error{}: {message}", code_suffix(.code))]
    Remote {
        code: Option<String>,
        message: String,
    },

    /// Unstructured failure string reported by the transport
    #[error("Transport error: {0}")]
    Transport(String),

    /// Payload could not be parsed into the expected shape
    #[error("Decode error: {0}")]
    Decode(#[source] serde_json::Error),

    /// Request payload could not be serialized
    #[error("Encode error: {0}")]
    Encode(#[source] serde_json::Error),

    /// Client torn down while the call was pending, or the subscription was cancelled
    #[error("Cancelled")]
    Cancelled,

    /// The transport handed out an id that is still live in the registry
    #[error("Duplicate call id from transport: {0}")]
    DuplicateCallId(CallId),

    /// Configuration error
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_ref().map(|c| format!(" ({c})")).unwrap_or_default()
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Helper trait to recover poisoned `std::sync` locks
pub trait LockResultExt<T> {
    /// Recover the guard from a poisoned lock, logging which operation hit it.
    fn recover_poison(self, context: &str) -> T;
}

impl<T> LockResultExt<T> for Result<T, PoisonError<T>> {
    fn recover_poison(self, context: &str) -> T {
        match self {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!(
                    target: "based_client::lock_recovery",
                    "Recovered from poisoned lock in {}",
                    context
                );
                poisoned.into_inner()
            }
        }
    }
}

impl ClientError {
    /// Create a remote error
    pub fn remote(code: Option<String>, message: impl Into<String>) -> Self {
        ClientError::Remote {
            code,
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        ClientError::Transport(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        ClientError::Config {
            message: message.into(),
        }
    }

    /// Whether this error ends the call or stream it was delivered to.
    ///
    /// Decode failures only affect the value that failed to parse.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ClientError::Decode(_))
    }
}
