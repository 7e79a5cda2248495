//! RemoteStore trait definition
//!
//! Abstract interface over the remote CRUD API, enabling testing with mock
//! implementations and backend swaps. No local logic beyond request
//! shaping lives behind this trait.

use crate::error::SyncError;
use crate::graph::models::{GoalNode, NodeDraft, NodePatch, PositionUpdate, TrackRecord};
use async_trait::async_trait;

/// Abstract interface for all remote node operations.
///
/// Every call requires the authenticated owning principal supplied at
/// construction; any non-success response surfaces as a [`SyncError`].
/// `create` is not assumed idempotent and is never retried.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch every node owned by the caller.
    async fn fetch_all(&self) -> Result<Vec<GoalNode>, SyncError>;

    /// Create a node. The server assigns id and owner.
    async fn create(&self, draft: &NodeDraft) -> Result<GoalNode, SyncError>;

    /// Apply a partial update to one caller-owned node.
    async fn update(&self, id: &str, patch: &NodePatch) -> Result<(), SyncError>;

    /// Delete a node. The server also purges the id from every other owned
    /// node's link map, atomically.
    async fn delete(&self, id: &str) -> Result<(), SyncError>;

    /// Write many positions in one call. Ids not owned by the caller are
    /// silently ignored server-side.
    async fn bulk_update_positions(&self, positions: &[PositionUpdate]) -> Result<(), SyncError>;

    /// Fetch the caller's track records, ordered by date descending.
    async fn fetch_tracks(&self) -> Result<Vec<TrackRecord>, SyncError>;

    /// Privileged bulk-create under another owner. Requires an elevated
    /// principal; regular credentials get an authorization failure.
    async fn bulk_create_for(
        &self,
        owner_id: &str,
        drafts: &[NodeDraft],
    ) -> Result<(), SyncError>;
}
