//! In-memory mock implementation of RemoteStore for testing.
//!
//! Holds nodes in a `tokio::sync::RwLock` map, records every call, and
//! supports per-operation failure injection so optimistic rollback paths
//! can be exercised without a server.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use crate::error::SyncError;
use crate::graph::models::{GoalNode, NodeDraft, NodePatch, PositionUpdate, TrackRecord};
use crate::remote::traits::RemoteStore;

/// A recorded remote call, for assertions on request shaping.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    FetchAll,
    Create(NodeDraft),
    Update(String, NodePatch),
    Delete(String),
    BulkUpdatePositions(Vec<PositionUpdate>),
    FetchTracks,
    BulkCreateFor(String, usize),
}

/// In-memory mock of the remote CRUD API.
pub struct MockRemoteStore {
    pub nodes: RwLock<HashMap<String, GoalNode>>,
    pub tracks: RwLock<Vec<TrackRecord>>,
    pub calls: RwLock<Vec<RecordedCall>>,
    /// Operation names ("create", "update", "delete", "positions",
    /// "fetch_all", "tracks") that fail with the configured error.
    failing: RwLock<HashMap<String, SyncError>>,
    /// Fails only updates whose patch matches, independent of `failing`.
    /// Useful when two updates are in flight and only one should fail.
    failing_update_if: RwLock<Option<(Box<dyn Fn(&NodePatch) -> bool + Send + Sync>, SyncError)>>,
    next_id: AtomicU64,
    owner: String,
}

impl MockRemoteStore {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            tracks: RwLock::new(Vec::new()),
            calls: RwLock::new(Vec::new()),
            failing: RwLock::new(HashMap::new()),
            failing_update_if: RwLock::new(None),
            next_id: AtomicU64::new(1),
            owner: "mock-owner".to_string(),
        }
    }

    /// Make one operation fail until cleared.
    pub async fn fail(&self, operation: &str, error: SyncError) {
        self.failing
            .write()
            .await
            .insert(operation.to_string(), error);
    }

    /// Stop failing an operation.
    pub async fn recover(&self, operation: &str) {
        self.failing.write().await.remove(operation);
    }

    /// Fail only updates whose patch matches the predicate.
    pub async fn fail_update_if(
        &self,
        predicate: impl Fn(&NodePatch) -> bool + Send + Sync + 'static,
        error: SyncError,
    ) {
        *self.failing_update_if.write().await = Some((Box::new(predicate), error));
    }

    /// Seed a node as if it already existed server-side.
    pub async fn seed(&self, node: GoalNode) {
        self.nodes.write().await.insert(node.id.clone(), node);
    }

    /// Calls recorded so far.
    pub async fn recorded(&self) -> Vec<RecordedCall> {
        self.calls.read().await.clone()
    }

    async fn check_failure(&self, operation: &str) -> Result<(), SyncError> {
        if let Some(err) = self.failing.read().await.get(operation) {
            return Err(err.clone());
        }
        Ok(())
    }

    fn assign_id(&self) -> String {
        format!("srv{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for MockRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MockRemoteStore {
    async fn fetch_all(&self) -> Result<Vec<GoalNode>, SyncError> {
        self.calls.write().await.push(RecordedCall::FetchAll);
        self.check_failure("fetch_all").await?;
        let mut nodes: Vec<GoalNode> = self.nodes.read().await.values().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(nodes)
    }

    async fn create(&self, draft: &NodeDraft) -> Result<GoalNode, SyncError> {
        self.calls
            .write()
            .await
            .push(RecordedCall::Create(draft.clone()));
        self.check_failure("create").await?;
        let node = GoalNode {
            id: self.assign_id(),
            name: draft.name.clone(),
            commit: draft.commit,
            x: draft.x,
            y: draft.y,
            links: draft.links.clone(),
            activation: 0.0,
            color: draft.color.clone(),
            starred: draft.starred,
            acute: draft.acute,
            owner_id: Some(self.owner.clone()),
        };
        self.nodes.write().await.insert(node.id.clone(), node.clone());
        Ok(node)
    }

    async fn update(&self, id: &str, patch: &NodePatch) -> Result<(), SyncError> {
        self.calls
            .write()
            .await
            .push(RecordedCall::Update(id.to_string(), patch.clone()));
        self.check_failure("update").await?;
        if let Some((predicate, error)) = self.failing_update_if.read().await.as_ref() {
            if predicate(patch) {
                return Err(error.clone());
            }
        }
        let mut nodes = self.nodes.write().await;
        let node = nodes
            .get_mut(id)
            .ok_or_else(|| SyncError::NotFound(id.to_string()))?;
        if let Some(name) = &patch.name {
            node.name = name.clone();
        }
        if let Some(commit) = patch.commit {
            node.commit = commit;
        }
        if let Some(color) = &patch.color {
            node.color = color.clone();
        }
        if let Some(starred) = patch.starred {
            node.starred = starred;
        }
        if let Some(acute) = patch.acute {
            node.acute = acute;
        }
        if let Some(links) = &patch.links {
            node.links = links.clone();
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), SyncError> {
        self.calls
            .write()
            .await
            .push(RecordedCall::Delete(id.to_string()));
        self.check_failure("delete").await?;
        let mut nodes = self.nodes.write().await;
        nodes
            .remove(id)
            .ok_or_else(|| SyncError::NotFound(id.to_string()))?;
        // Server-side purge of the id from every other link map.
        for node in nodes.values_mut() {
            node.links.remove(id);
        }
        Ok(())
    }

    async fn bulk_update_positions(&self, positions: &[PositionUpdate]) -> Result<(), SyncError> {
        self.calls
            .write()
            .await
            .push(RecordedCall::BulkUpdatePositions(positions.to_vec()));
        self.check_failure("positions").await?;
        let mut nodes = self.nodes.write().await;
        for pos in positions {
            // Unknown ids are silently ignored, like the real endpoint.
            if let Some(node) = nodes.get_mut(&pos.id) {
                node.x = pos.x;
                node.y = pos.y;
            }
        }
        Ok(())
    }

    async fn fetch_tracks(&self) -> Result<Vec<TrackRecord>, SyncError> {
        self.calls.write().await.push(RecordedCall::FetchTracks);
        self.check_failure("tracks").await?;
        let mut tracks = self.tracks.read().await.clone();
        tracks.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(tracks)
    }

    async fn bulk_create_for(
        &self,
        owner_id: &str,
        drafts: &[NodeDraft],
    ) -> Result<(), SyncError> {
        self.calls
            .write()
            .await
            .push(RecordedCall::BulkCreateFor(owner_id.to_string(), drafts.len()));
        self.check_failure("bulk_create").await?;
        let mut nodes = self.nodes.write().await;
        for draft in drafts {
            let id = self.assign_id();
            nodes.insert(
                id.clone(),
                GoalNode {
                    id,
                    name: draft.name.clone(),
                    commit: draft.commit,
                    x: draft.x,
                    y: draft.y,
                    links: draft.links.clone(),
                    activation: 0.0,
                    color: draft.color.clone(),
                    starred: draft.starred,
                    acute: draft.acute,
                    owner_id: Some(owner_id.to_string()),
                },
            );
        }
        Ok(())
    }
}
