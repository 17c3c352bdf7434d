//! Per-client callback tables.
//!
//! The transport's delivery entry points carry no caller context, so every
//! delivery is correlated back to its caller through these registries. They
//! are created with a client and torn down with it; there is no
//! process-wide table.

mod auth_slot;
mod correlation;
mod subscription;

pub(crate) use auth_slot::AuthSlot;
pub(crate) use correlation::{Completion, CorrelationRegistry};
pub use subscription::Update;
pub(crate) use subscription::{Forwarded, SubscriptionRegistry};
