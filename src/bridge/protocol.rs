//! Call identifiers, call kinds, and reply classification.

mod call_id;
mod reply;

pub use call_id::{CallId, CallKind};
pub use reply::{ErrorCode, RemoteErrorBody, Reply, decode};
