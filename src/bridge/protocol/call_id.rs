//! Identifier and kind of a call issued through the transport.

use std::fmt;

/// Identifier the transport assigns to a call.
///
/// Wraps `i64` so ids cannot be confused with checksums or counters. An id is
/// unique within its registry (one-shot or subscription) while an entry
/// referencing it is live; the two registries have independent id spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(i64);

impl CallId {
    /// Create a new CallId from an i64 value.
    #[inline]
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the underlying i64 value.
    #[inline]
    pub fn as_i64(self) -> i64 {
        self.0
    }
}

impl From<i64> for CallId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<CallId> for i64 {
    fn from(id: CallId) -> Self {
        id.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of a one-shot call.
///
/// Subscriptions are not a `CallKind`: they live in their own registry and
/// are never completed by a single delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// One-shot read of a named resource
    Get,
    /// Invocation of a remote function
    Function,
}

impl CallKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CallKind::Get => "get",
            CallKind::Function => "function",
        }
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
