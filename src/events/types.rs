//! Event types published during state mutation.

use serde::{Deserialize, Serialize};

/// The closed set of event kinds a handler can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// The node collection or selection changed.
    StateChanged,
    /// A remote call failed; the local change (if any) was rolled back.
    SyncFailed,
}

/// Details of a failed remote operation.
///
/// The underlying failure reason is forwarded here for display; all
/// failures take the same rollback path regardless of class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    /// The operation that failed (e.g. "add_node", "flush_positions").
    pub operation: String,
    /// Human-readable reason, straight from the error.
    pub reason: String,
    /// ISO 8601 timestamp
    pub timestamp: String,
}

impl SyncFailure {
    /// Create a failure record with the current timestamp.
    pub fn new(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            reason: reason.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// An event published on the bus.
///
/// Each kind carries its own payload type, so publishers and subscribers
/// agree at compile time on the payload shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GraphEvent {
    /// The node collection or selection changed; subscribers re-read the
    /// store.
    StateChanged,
    /// A remote call failed and its local effect was compensated.
    SyncFailed(SyncFailure),
}

impl GraphEvent {
    /// The kind this event is dispatched under.
    pub fn kind(&self) -> EventKind {
        match self {
            GraphEvent::StateChanged => EventKind::StateChanged,
            GraphEvent::SyncFailed(_) => EventKind::SyncFailed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_dispatch() {
        assert_eq!(GraphEvent::StateChanged.kind(), EventKind::StateChanged);
        let failed = GraphEvent::SyncFailed(SyncFailure::new("add_node", "boom"));
        assert_eq!(failed.kind(), EventKind::SyncFailed);
    }

    #[test]
    fn test_sync_failure_serde_roundtrip() {
        let failure = SyncFailure::new("update_link", "network or server error: 500");
        let json = serde_json::to_string(&failure).unwrap();
        let back: SyncFailure = serde_json::from_str(&json).unwrap();
        assert_eq!(back, failure);
    }

    #[test]
    fn test_event_kind_snake_case() {
        assert_eq!(
            serde_json::to_string(&EventKind::StateChanged).unwrap(),
            "\"state_changed\""
        );
    }
}
