//! Error types for remote synchronization and local persistence.

use thiserror::Error;

/// Failure of a remote call or of the local ledger.
///
/// These never escape the mutation engine's public operations; the engine
/// compensates locally and reports through the event bus. `Validation` is
/// the one exception: it is returned to the caller before any local state
/// is touched.
#[derive(Error, Debug, Clone)]
pub enum SyncError {
    /// Transport failure or unexpected HTTP status.
    #[error("network error: {0}")]
    Network(String),

    /// Rejected input, detected before the optimistic apply.
    #[error("validation error: {0}")]
    Validation(String),

    /// The remote rejected the credential (401 or 403).
    #[error("authorization error: {0}")]
    Authorization(String),

    /// The remote has no record with this id (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Local ledger file could not be written.
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl SyncError {
    /// True for the benign "already gone" case that reconciliation skips.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound(_))
    }
}
