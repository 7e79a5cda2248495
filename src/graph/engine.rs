//! Optimistic mutation engine.
//!
//! Every state-changing operation follows the same two-phase protocol:
//!
//! 1. validate, then synchronously apply the change and capture the minimal
//!    inverse needed to undo it — as data, never reconstructed later
//! 2. emit `StateChanged` immediately (zero-latency feedback)
//! 3. spawn the matching remote call
//! 4. on success, reconcile server-assigned fields (temp id → confirmed id,
//!    selection repointed)
//! 5. on failure, apply the captured inverse, emit `SyncFailed`, then emit
//!    `StateChanged` again
//!
//! Operations may be in flight simultaneously. Each captures its own
//! inverse independently, so concurrent compensations never corrupt each
//! other; overlapping fields resolve last-write-wins. A confirmation or
//! rollback whose target node was removed by a later operation is a benign
//! no-op.
//!
//! Mutating operations return the `JoinHandle` of their confirmation task
//! (`None` when the target was missing locally, which is silently skipped).
//! Callers may await settlement or drop the handle fire-and-forget.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::models::{
    validate_color, validate_link_weight, validate_name, GoalNode, NodeDraft, NodePatch,
    TrackRecord,
};
use super::scheduler::PositionScheduler;
use super::store::GraphState;
use crate::activation::{propagate, ActivationConfig};
use crate::error::SyncError;
use crate::events::{EventBus, GraphEvent, SyncFailure};
use crate::history::HistoryLedger;
use crate::remote::traits::RemoteStore;

/// Orchestrates apply-now/confirm-or-compensate for every mutation.
#[derive(Clone)]
pub struct MutationEngine {
    state: Arc<GraphState>,
    remote: Arc<dyn RemoteStore>,
    bus: EventBus,
    history: Arc<HistoryLedger>,
    scheduler: PositionScheduler,
}

impl MutationEngine {
    /// Wire the engine to its collaborators. The position scheduler is
    /// created here with the given quiet window.
    pub fn new(
        state: Arc<GraphState>,
        remote: Arc<dyn RemoteStore>,
        bus: EventBus,
        history: Arc<HistoryLedger>,
        debounce_ms: u64,
    ) -> Self {
        let scheduler = PositionScheduler::new(
            Arc::clone(&state),
            Arc::clone(&remote),
            bus.clone(),
            debounce_ms,
        );
        Self {
            state,
            remote,
            bus,
            history,
            scheduler,
        }
    }

    /// The store this engine mutates.
    pub fn state(&self) -> &Arc<GraphState> {
        &self.state
    }

    fn notify_changed(&self) {
        self.bus.publish(GraphEvent::StateChanged);
    }

    fn notify_failed(&self, operation: &str, error: &SyncError) {
        self.bus
            .publish(GraphEvent::SyncFailed(SyncFailure::new(
                operation,
                error.to_string(),
            )));
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Fetch the full node set and replace local state with it.
    ///
    /// On failure the graph hydrates empty and the error is reported on the
    /// failure channel — an unusable session must not crash the process.
    pub async fn refresh(&self) {
        match self.remote.fetch_all().await {
            Ok(nodes) => self.state.hydrate(nodes),
            Err(e) => {
                self.notify_failed("refresh", &e);
                self.state.hydrate(Vec::new());
            }
        }
    }

    /// Fetch the caller's track records, date-descending. Failures are
    /// reported and yield an empty list.
    pub async fn fetch_tracks(&self) -> Vec<TrackRecord> {
        match self.remote.fetch_tracks().await {
            Ok(tracks) => tracks,
            Err(e) => {
                self.notify_failed("fetch_tracks", &e);
                Vec::new()
            }
        }
    }

    // ========================================================================
    // Derived state
    // ========================================================================

    /// Recompute activation for the whole collection (local only, no remote
    /// call). Always a full recompute from current commit values.
    pub fn recompute_activation(&self, config: &ActivationConfig) {
        self.state.mutate(|nodes, _| {
            let propagated = propagate(nodes, config);
            *nodes = propagated;
        });
        self.notify_changed();
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Create a node at (x, y) with default fields and select it.
    ///
    /// The node carries a temp id until the server confirms; on success the
    /// id is renamed in place and the selection repointed if it still
    /// pointed at the temp id. On failure the node is removed again.
    pub fn add_node(&self, x: f64, y: f64) -> (GoalNode, JoinHandle<()>) {
        let node = GoalNode::draft_at(x, y);
        let temp_id = node.id.clone();
        let draft = NodeDraft::from(&node);

        self.state.mutate(|nodes, selected| {
            nodes.push(node.clone());
            *selected = Some(temp_id.clone());
        });
        self.notify_changed();

        let engine = self.clone();
        let returned = node.clone();
        let handle = tokio::spawn(async move {
            match engine.remote.create(&draft).await {
                Ok(saved) => {
                    engine.state.mutate(|nodes, selected| {
                        // The node may have been deleted while in flight.
                        if let Some(n) = nodes.iter_mut().find(|n| n.id == temp_id) {
                            n.id = saved.id.clone();
                            n.owner_id = saved.owner_id.clone();
                            if selected.as_deref() == Some(temp_id.as_str()) {
                                *selected = Some(saved.id.clone());
                            }
                        }
                    });
                    engine.notify_changed();
                }
                Err(e) => {
                    engine.state.mutate(|nodes, selected| {
                        nodes.retain(|n| n.id != temp_id);
                        if selected.as_deref() == Some(temp_id.as_str()) {
                            *selected = None;
                        }
                    });
                    engine.notify_failed("add_node", &e);
                    engine.notify_changed();
                }
            }
        });

        (returned, handle)
    }

    /// Delete a node, stripping its id from every other node's link map and
    /// clearing the selection if it pointed at it.
    ///
    /// The inverse is the node itself (with its list index) plus exactly
    /// the links stripped here; compensation re-adds those and nothing
    /// else, so link edits made while the delete was in flight survive.
    pub fn delete_node(&self, id: &str) -> Option<JoinHandle<()>> {
        let id = id.to_string();

        struct DeleteInverse {
            node: GoalNode,
            index: usize,
            stripped: Vec<(String, u8)>, // (source id, weight)
        }

        let inverse = self.state.mutate(|nodes, selected| {
            let index = nodes.iter().position(|n| n.id == id)?;
            let node = nodes[index].clone();
            let stripped: Vec<(String, u8)> = nodes
                .iter()
                .filter(|n| n.id != id)
                .filter_map(|n| n.links.get(&id).map(|&w| (n.id.clone(), w)))
                .collect();

            nodes.remove(index);
            for n in nodes.iter_mut() {
                n.links.remove(&id);
            }
            if selected.as_deref() == Some(id.as_str()) {
                *selected = None;
            }
            Some(DeleteInverse {
                node,
                index,
                stripped,
            })
        })?;
        self.notify_changed();

        let engine = self.clone();
        Some(tokio::spawn(async move {
            match engine.remote.delete(&id).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    // Already gone server-side; the local delete stands.
                    debug!(id = %id, "delete confirmed by absence");
                }
                Err(e) => {
                    engine.state.mutate(|nodes, _| {
                        let at = inverse.index.min(nodes.len());
                        nodes.insert(at, inverse.node.clone());
                        for (source_id, weight) in &inverse.stripped {
                            if let Some(source) = nodes.iter_mut().find(|n| n.id == *source_id) {
                                source.links.insert(id.clone(), *weight);
                            }
                        }
                    });
                    engine.notify_failed("delete_node", &e);
                    engine.notify_changed();
                }
            }
        }))
    }

    /// Set a node's name and commit value, appending the signed commit
    /// delta to today's history ledger entry. On failure both fields and
    /// the ledger are compensated.
    pub fn update_content(
        &self,
        id: &str,
        name: &str,
        commit: i64,
    ) -> Result<Option<JoinHandle<()>>, SyncError> {
        validate_name(name)?;
        let id = id.to_string();
        let name = name.to_string();

        let prior = self.state.mutate(|nodes, _| {
            let node = nodes.iter_mut().find(|n| n.id == id)?;
            let prior = (node.name.clone(), node.commit);
            node.name = name.clone();
            node.commit = commit;
            Some(prior)
        });
        let Some((old_name, old_commit)) = prior else {
            return Ok(None);
        };
        self.history
            .append(&id, commit - old_commit, HistoryLedger::today());
        self.notify_changed();

        let history = Arc::clone(&self.history);
        let revert_id = id.clone();
        let patch = NodePatch {
            name: Some(name),
            commit: Some(commit),
            ..Default::default()
        };
        Ok(Some(self.spawn_update(
            "update_content",
            id,
            patch,
            move |nodes| {
                if let Some(node) = nodes.iter_mut().find(|n| n.id == revert_id) {
                    node.name = old_name.clone();
                    node.commit = old_commit;
                }
                // Inverse delta keeps the ledger consistent with confirmed
                // state even if the node itself is gone.
                history.append(&revert_id, old_commit - commit, HistoryLedger::today());
            },
        )))
    }

    /// Set a node's color. Standard apply/compensate.
    pub fn update_color(
        &self,
        id: &str,
        color: &str,
    ) -> Result<Option<JoinHandle<()>>, SyncError> {
        validate_color(color)?;
        let id = id.to_string();
        let color = color.to_string();

        let prior = self.state.mutate(|nodes, _| {
            let node = nodes.iter_mut().find(|n| n.id == id)?;
            let prior = node.color.clone();
            node.color = color.clone();
            Some(prior)
        });
        let Some(old_color) = prior else {
            return Ok(None);
        };
        self.notify_changed();

        let revert_id = id.clone();
        let patch = NodePatch {
            color: Some(color),
            ..Default::default()
        };
        Ok(Some(self.spawn_update(
            "update_color",
            id,
            patch,
            move |nodes| {
                if let Some(node) = nodes.iter_mut().find(|n| n.id == revert_id) {
                    node.color = old_color.clone();
                }
            },
        )))
    }

    /// Flip a node's starred flag.
    pub fn toggle_star(&self, id: &str) -> Option<JoinHandle<()>> {
        self.toggle_flag(id, "toggle_star", |n| &mut n.starred, |p, v| p.starred = Some(v))
    }

    /// Flip a node's acute flag.
    pub fn toggle_acute(&self, id: &str) -> Option<JoinHandle<()>> {
        self.toggle_flag(id, "toggle_acute", |n| &mut n.acute, |p, v| p.acute = Some(v))
    }

    fn toggle_flag(
        &self,
        id: &str,
        operation: &'static str,
        field: impl Fn(&mut GoalNode) -> &mut bool + Send + Sync + 'static,
        set_patch: impl FnOnce(&mut NodePatch, bool),
    ) -> Option<JoinHandle<()>> {
        let id = id.to_string();

        let new_value = self.state.mutate(|nodes, _| {
            let node = nodes.iter_mut().find(|n| n.id == id)?;
            let flag = field(node);
            *flag = !*flag;
            Some(*flag)
        })?;
        self.notify_changed();

        let mut patch = NodePatch::default();
        set_patch(&mut patch, new_value);
        let revert_id = id.clone();
        Some(self.spawn_update(operation, id, patch, move |nodes| {
            if let Some(node) = nodes.iter_mut().find(|n| n.id == revert_id) {
                *field(node) = !new_value;
            }
        }))
    }

    /// Set or delete one entry in the source node's link map.
    ///
    /// `Some(weight)` sets the edge, `None` deletes it. The inverse is the
    /// source's full prior link map. Only the source node is touched — a
    /// reverse edge is independent.
    pub fn update_link(
        &self,
        source_id: &str,
        target_id: &str,
        weight: Option<u8>,
    ) -> Result<Option<JoinHandle<()>>, SyncError> {
        if let Some(w) = weight {
            validate_link_weight(w)?;
        }
        let source_id = source_id.to_string();
        let target_id = target_id.to_string();

        let result = self.state.mutate(|nodes, _| {
            let node = nodes.iter_mut().find(|n| n.id == source_id)?;
            let prior = node.links.clone();
            match weight {
                Some(w) => {
                    node.links.insert(target_id.clone(), w);
                }
                None => {
                    node.links.remove(&target_id);
                }
            }
            Some((prior, node.links.clone()))
        });
        let Some((old_links, new_links)) = result else {
            return Ok(None);
        };
        self.notify_changed();

        let revert_id = source_id.clone();
        let patch = NodePatch {
            links: Some(new_links),
            ..Default::default()
        };
        Ok(Some(self.spawn_update(
            "update_link",
            source_id,
            patch,
            move |nodes| {
                if let Some(node) = nodes.iter_mut().find(|n| n.id == revert_id) {
                    node.links = old_links.clone();
                }
            },
        )))
    }

    /// Set a node's position and schedule a debounced bulk flush.
    ///
    /// Intentionally captures no inverse: reverting a position mid-drag is
    /// more disruptive than a stale coordinate, so failures are only
    /// reported (by the scheduler).
    pub fn update_position(&self, id: &str, x: f64, y: f64) {
        let moved = self.state.mutate(|nodes, _| {
            if let Some(node) = nodes.iter_mut().find(|n| n.id == id) {
                node.x = x;
                node.y = y;
                true
            } else {
                false
            }
        });
        if moved {
            self.notify_changed();
            self.scheduler.trigger();
        }
    }

    // ========================================================================
    // Confirmation plumbing
    // ========================================================================

    /// Spawn the confirm-or-compensate step shared by all field updates:
    /// send the patch, and on failure run the captured inverse, report,
    /// and notify. A remote "not found" means the target was deleted by a
    /// later operation — a benign no-op, neither rolled back nor surfaced.
    fn spawn_update(
        &self,
        operation: &'static str,
        id: String,
        patch: NodePatch,
        revert: impl FnOnce(&mut Vec<GoalNode>) + Send + 'static,
    ) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            match engine.remote.update(&id, &patch).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    debug!(id = %id, operation, "update target gone, skipping");
                }
                Err(e) => {
                    engine.state.mutate(|nodes, _| revert(nodes));
                    engine.notify_failed(operation, &e);
                    engine.notify_changed();
                }
            }
        })
    }
}

/// Convenience wiring for a full engine around a mock or real remote.
///
/// Returns the engine and its bus; the store is reachable via
/// [`MutationEngine::state`].
pub fn build_engine(
    remote: Arc<dyn RemoteStore>,
    history: Arc<HistoryLedger>,
    debounce_ms: u64,
) -> (MutationEngine, EventBus) {
    let bus = EventBus::new();
    let state = Arc::new(GraphState::new(bus.clone()));
    let engine = MutationEngine::new(state, remote, bus.clone(), history, debounce_ms);
    (engine, bus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::mock::MockRemoteStore;

    fn fixture() -> (MutationEngine, Arc<MockRemoteStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(MockRemoteStore::new());
        let history = Arc::new(HistoryLedger::empty(dir.path().join("ledger.json")));
        let (engine, _bus) = build_engine(remote.clone(), history, 20);
        (engine, remote, dir)
    }

    #[tokio::test]
    async fn test_add_node_is_applied_before_confirmation() {
        let (engine, _remote, _dir) = fixture();
        let (node, handle) = engine.add_node(10.0, 20.0);

        // Visible immediately, with a temp id and selected.
        assert!(node.has_temp_id());
        assert_eq!(engine.state().len(), 1);
        assert_eq!(engine.state().selected(), Some(node.id.clone()));

        handle.await.unwrap();
        // Confirmed: renamed in place, selection repointed.
        let confirmed = &engine.state().snapshot()[0];
        assert!(!confirmed.has_temp_id());
        assert_eq!(engine.state().selected().as_deref(), Some(confirmed.id.as_str()));
        assert_eq!(confirmed.owner_id.as_deref(), Some("mock-owner"));
    }

    #[tokio::test]
    async fn test_add_node_failure_removes_node_and_selection() {
        let (engine, remote, _dir) = fixture();
        remote
            .fail("create", SyncError::Network("injected".into()))
            .await;

        let (_node, handle) = engine.add_node(0.0, 0.0);
        assert_eq!(engine.state().len(), 1);
        handle.await.unwrap();
        assert_eq!(engine.state().len(), 0);
        assert!(engine.state().selected().is_none());
    }

    #[tokio::test]
    async fn test_update_position_has_no_rollback() {
        let (engine, remote, _dir) = fixture();
        remote
            .fail("positions", SyncError::Network("injected".into()))
            .await;
        let (_node, handle) = engine.add_node(0.0, 0.0);
        handle.await.unwrap();
        let id = engine.state().snapshot()[0].id.clone();

        engine.update_position(&id, 50.0, 60.0);
        tokio::time::sleep(std::time::Duration::from_millis(120)).await;

        // Position survives the failed flush.
        let n = engine.state().get(&id).unwrap();
        assert_eq!((n.x, n.y), (50.0, 60.0));
    }

    #[tokio::test]
    async fn test_missing_target_is_silently_skipped() {
        let (engine, _remote, _dir) = fixture();
        assert!(engine.delete_node("ghost").is_none());
        assert!(engine.toggle_star("ghost").is_none());
        assert!(engine
            .update_content("ghost", "name", 1)
            .unwrap()
            .is_none());
        engine.update_position("ghost", 1.0, 1.0);
    }

    #[tokio::test]
    async fn test_validation_rejected_before_apply() {
        let (engine, remote, _dir) = fixture();
        let (_, handle) = engine.add_node(0.0, 0.0);
        handle.await.unwrap();
        let id = engine.state().snapshot()[0].id.clone();

        assert!(matches!(
            engine.update_content(&id, "   ", 5),
            Err(SyncError::Validation(_))
        ));
        assert!(matches!(
            engine.update_link(&id, "b", Some(0)),
            Err(SyncError::Validation(_))
        ));
        assert!(matches!(
            engine.update_color(&id, "red"),
            Err(SyncError::Validation(_))
        ));

        // Nothing was applied or transmitted.
        let n = engine.state().get(&id).unwrap();
        assert_eq!(n.name, "New goal");
        assert!(n.links.is_empty());
        let updates = remote
            .recorded()
            .await
            .iter()
            .filter(|c| matches!(c, crate::remote::mock::RecordedCall::Update(_, _)))
            .count();
        assert_eq!(updates, 0);
    }

    #[tokio::test]
    async fn test_toggle_star_roundtrip_and_rollback() {
        let (engine, remote, _dir) = fixture();
        let (_, handle) = engine.add_node(0.0, 0.0);
        handle.await.unwrap();
        let id = engine.state().snapshot()[0].id.clone();

        engine.toggle_star(&id).unwrap().await.unwrap();
        assert!(engine.state().get(&id).unwrap().starred);

        remote
            .fail("update", SyncError::Authorization("injected".into()))
            .await;
        engine.toggle_star(&id).unwrap().await.unwrap();
        // Applied optimistically, then rolled back.
        assert!(engine.state().get(&id).unwrap().starred);
    }

    #[tokio::test]
    async fn test_recompute_activation_swaps_in_propagated_set() {
        let (engine, _remote, _dir) = fixture();
        let (_, h1) = engine.add_node(0.0, 0.0);
        h1.await.unwrap();
        let id = engine.state().snapshot()[0].id.clone();
        engine
            .update_content(&id, "Goal", 12)
            .unwrap()
            .unwrap()
            .await
            .unwrap();

        engine.recompute_activation(&ActivationConfig::default());
        let n = engine.state().get(&id).unwrap();
        assert_eq!(n.activation, 12.0);
        assert_eq!(n.level(), 1);
    }

    #[tokio::test]
    async fn test_refresh_failure_hydrates_empty_and_reports() {
        let (engine, remote, _dir) = fixture();
        let (_, handle) = engine.add_node(0.0, 0.0);
        handle.await.unwrap();
        remote
            .fail("fetch_all", SyncError::Network("injected".into()))
            .await;

        engine.refresh().await;
        assert!(engine.state().is_empty());
    }
}
