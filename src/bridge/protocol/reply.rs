//! Classification of raw `(data, error)` deliveries.
//!
//! The transport reports every outcome as a pair of strings. An empty error
//! string means success. A non-empty one is either a structured JSON error
//! body from the backend or a free-form message from the transport itself.
//! Classification is pure, so it can be tested without a live transport.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// Structured error body reported by the backend.
///
/// Accepts both `code`/`message` and the `statusCode`/`statusMessage`
/// spelling used by HTTP-flavoured backend errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteErrorBody {
    #[serde(default, alias = "statusCode", skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    #[serde(alias = "statusMessage")]
    pub message: String,
}

/// Error codes arrive as numbers or strings depending on the backend function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorCode {
    Number(i64),
    Text(String),
}

impl ErrorCode {
    fn into_string(self) -> String {
        match self {
            ErrorCode::Number(n) => n.to_string(),
            ErrorCode::Text(s) => s,
        }
    }
}

/// A classified delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Success(String),
    Remote {
        code: Option<String>,
        message: String,
    },
    Transport(String),
}

impl Reply {
    /// Classify a raw `(data, error)` pair.
    pub fn classify(data: String, error: &str) -> Self {
        if error.is_empty() {
            return Reply::Success(data);
        }

        match serde_json::from_str::<RemoteErrorBody>(error) {
            Ok(body) => Reply::Remote {
                code: body.code.map(ErrorCode::into_string),
                message: body.message,
            },
            Err(_) => Reply::Transport(error.to_string()),
        }
    }

    pub fn into_result(self) -> ClientResult<String> {
        match self {
            Reply::Success(data) => Ok(data),
            Reply::Remote { code, message } => Err(ClientError::remote(code, message)),
            Reply::Transport(message) => Err(ClientError::Transport(message)),
        }
    }
}

/// Decode a successful payload into the caller's expected shape.
///
/// An empty payload decodes as JSON `null`, so `()` and `Option<T>` callers
/// accept replies that carry no data.
pub fn decode<T: DeserializeOwned>(data: &str) -> ClientResult<T> {
    let data = if data.trim().is_empty() { "null" } else { data };
    serde_json::from_str(data).map_err(ClientError::Decode)
}
