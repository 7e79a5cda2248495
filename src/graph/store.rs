//! Canonical in-memory graph state.
//!
//! `GraphState` is the exclusive owner of the node collection and the
//! current selection. All writes flow through the mutation engine (the
//! mutable accessor is crate-private); presentation reads snapshots and
//! re-renders on `StateChanged`.

use std::sync::RwLock;

use super::models::{GoalNode, DEFAULT_COLOR};
use crate::events::{EventBus, GraphEvent};

#[derive(Debug, Default)]
struct Inner {
    nodes: Vec<GoalNode>,
    selected: Option<String>,
}

/// Owner of the canonical node collection and selection.
///
/// The node list is a `Vec` in hydration/creation order so a rolled-back
/// delete can reinsert the node at its original index. Selection may
/// reference a node deleted concurrently; readers degrade to "nothing
/// selected" rather than erroring.
#[derive(Debug)]
pub struct GraphState {
    inner: RwLock<Inner>,
    bus: EventBus,
}

impl GraphState {
    /// Create an empty store publishing on the given bus.
    pub fn new(bus: EventBus) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            bus,
        }
    }

    /// Replace the entire collection, filling missing optional fields with
    /// defaults, and notify. Used for initial load, re-login, and logout
    /// (empty set).
    pub fn hydrate(&self, mut nodes: Vec<GoalNode>) {
        for node in &mut nodes {
            if node.color.is_empty() {
                node.color = DEFAULT_COLOR.to_string();
            }
        }
        {
            let mut inner = self.inner.write().expect("graph state poisoned");
            inner.nodes = nodes;
        }
        self.bus.publish(GraphEvent::StateChanged);
    }

    /// Clone of the current collection. Mutating the clone has no effect on
    /// canonical state.
    pub fn snapshot(&self) -> Vec<GoalNode> {
        self.inner.read().expect("graph state poisoned").nodes.clone()
    }

    /// Clone of one node, if present.
    pub fn get(&self, id: &str) -> Option<GoalNode> {
        self.inner
            .read()
            .expect("graph state poisoned")
            .nodes
            .iter()
            .find(|n| n.id == id)
            .cloned()
    }

    /// Currently selected node id, which may dangle.
    pub fn selected(&self) -> Option<String> {
        self.inner.read().expect("graph state poisoned").selected.clone()
    }

    /// Number of nodes in the collection.
    pub fn len(&self) -> usize {
        self.inner.read().expect("graph state poisoned").nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Set the selection. Always succeeds; no existence check.
    pub fn select(&self, id: impl Into<String>) {
        {
            let mut inner = self.inner.write().expect("graph state poisoned");
            inner.selected = Some(id.into());
        }
        self.bus.publish(GraphEvent::StateChanged);
    }

    /// Clear the selection. Always succeeds.
    pub fn deselect(&self) {
        {
            let mut inner = self.inner.write().expect("graph state poisoned");
            inner.selected = None;
        }
        self.bus.publish(GraphEvent::StateChanged);
    }

    /// Run a closure with mutable access to nodes and selection.
    ///
    /// Engine-only. Does not notify; the engine publishes after it has
    /// captured the operation's inverse.
    pub(crate) fn mutate<R>(&self, f: impl FnOnce(&mut Vec<GoalNode>, &mut Option<String>) -> R) -> R {
        let mut inner = self.inner.write().expect("graph state poisoned");
        let Inner { nodes, selected } = &mut *inner;
        f(nodes, selected)
    }
}
