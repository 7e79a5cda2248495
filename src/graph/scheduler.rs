//! Debounced batch scheduler for position writes.
//!
//! Drag interactions produce position updates far faster than they should
//! hit the network. The scheduler coalesces them: each trigger resets a
//! fixed quiet window, and when the window elapses the current positions of
//! all nodes are written in a single bulk call.
//!
//! ## Design
//!
//! Uses an mpsc channel + timeout loop:
//! 1. `trigger()` sends a non-blocking message
//! 2. The background task waits for the first trigger, then keeps consuming
//!    triggers until the quiet window passes with no new ones
//! 3. After the quiet window, it snapshots positions from the store and
//!    issues one `bulk_update_positions`
//! 4. The loop is sequential, so only one flush is ever pending
//!
//! A failed flush is reported on the bus and not resent; the next position
//! edit schedules a fresh one.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::models::PositionUpdate;
use super::store::GraphState;
use crate::events::{EventBus, GraphEvent, SyncFailure};
use crate::remote::traits::RemoteStore;

/// Default quiet window before a flush.
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Debounced bulk position writer. Cheap to clone; clones share the
/// pending timer.
#[derive(Clone)]
pub struct PositionScheduler {
    trigger_tx: mpsc::Sender<()>,
}

impl PositionScheduler {
    /// Create a scheduler flushing to `remote` after `debounce_ms` of
    /// silence. Spawns a background task that lives until every clone is
    /// dropped.
    pub fn new(
        state: Arc<GraphState>,
        remote: Arc<dyn RemoteStore>,
        bus: EventBus,
        debounce_ms: u64,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<()>(64);
        tokio::spawn(Self::run_loop(state, remote, bus, rx, debounce_ms));
        Self { trigger_tx: tx }
    }

    /// Schedule (or reschedule) a flush. Non-blocking: if the channel is
    /// full the trigger is dropped, which is fine — a flush is already
    /// pending.
    pub fn trigger(&self) {
        let _ = self.trigger_tx.try_send(());
    }

    async fn run_loop(
        state: Arc<GraphState>,
        remote: Arc<dyn RemoteStore>,
        bus: EventBus,
        mut rx: mpsc::Receiver<()>,
        debounce_ms: u64,
    ) {
        let debounce = Duration::from_millis(debounce_ms);

        loop {
            // Wait for the first trigger.
            if rx.recv().await.is_none() {
                break; // channel closed, scheduler dropped
            }

            // Keep consuming triggers until the quiet window passes.
            loop {
                match tokio::time::timeout(debounce, rx.recv()).await {
                    Ok(Some(())) => {} // new trigger, window resets
                    Ok(None) => return,
                    Err(_) => break, // quiet window elapsed
                }
            }

            let positions: Vec<PositionUpdate> = state
                .snapshot()
                .iter()
                .map(|n| PositionUpdate {
                    id: n.id.clone(),
                    x: n.x,
                    y: n.y,
                })
                .collect();

            match remote.bulk_update_positions(&positions).await {
                Ok(()) => {
                    debug!(count = positions.len(), "flushed node positions");
                }
                Err(e) => {
                    warn!("position flush failed: {e}");
                    bus.publish(GraphEvent::SyncFailed(SyncFailure::new(
                        "flush_positions",
                        e.to_string(),
                    )));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::events::EventKind;
    use crate::graph::models::GoalNode;
    use crate::remote::mock::{MockRemoteStore, RecordedCall};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn state_with(nodes: Vec<GoalNode>) -> Arc<GraphState> {
        let state = Arc::new(GraphState::new(EventBus::new()));
        state.hydrate(nodes);
        state
    }

    #[tokio::test]
    async fn test_rapid_triggers_coalesce_into_one_flush() {
        let remote = Arc::new(MockRemoteStore::new());
        let state = state_with(vec![GoalNode::draft_at(1.0, 2.0)]);
        let scheduler =
            PositionScheduler::new(Arc::clone(&state), remote.clone(), EventBus::new(), 50);

        for _ in 0..10 {
            scheduler.trigger();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        let flushes = remote
            .recorded()
            .await
            .iter()
            .filter(|c| matches!(c, RecordedCall::BulkUpdatePositions(_)))
            .count();
        assert_eq!(flushes, 1, "10 rapid triggers should coalesce into 1 flush");
    }

    #[tokio::test]
    async fn test_separate_bursts_flush_separately() {
        let remote = Arc::new(MockRemoteStore::new());
        let state = state_with(vec![GoalNode::draft_at(0.0, 0.0)]);
        let scheduler =
            PositionScheduler::new(Arc::clone(&state), remote.clone(), EventBus::new(), 30);

        scheduler.trigger();
        tokio::time::sleep(Duration::from_millis(120)).await;
        scheduler.trigger();
        tokio::time::sleep(Duration::from_millis(120)).await;

        let flushes = remote
            .recorded()
            .await
            .iter()
            .filter(|c| matches!(c, RecordedCall::BulkUpdatePositions(_)))
            .count();
        assert_eq!(flushes, 2);
    }

    #[tokio::test]
    async fn test_flush_carries_current_positions() {
        let remote = Arc::new(MockRemoteStore::new());
        let mut node = GoalNode::draft_at(0.0, 0.0);
        node.id = "srv1".into();
        let state = state_with(vec![node]);
        let scheduler =
            PositionScheduler::new(Arc::clone(&state), remote.clone(), EventBus::new(), 30);

        scheduler.trigger();
        // Position changes after the trigger but before the flush.
        state.mutate(|nodes, _| {
            nodes[0].x = 42.0;
            nodes[0].y = 7.0;
        });
        tokio::time::sleep(Duration::from_millis(120)).await;

        let calls = remote.recorded().await;
        let positions = calls
            .iter()
            .find_map(|c| match c {
                RecordedCall::BulkUpdatePositions(p) => Some(p.clone()),
                _ => None,
            })
            .expect("flush recorded");
        assert_eq!(positions[0].x, 42.0);
        assert_eq!(positions[0].y, 7.0);
    }

    #[tokio::test]
    async fn test_failed_flush_reports_and_is_not_resent() {
        let remote = Arc::new(MockRemoteStore::new());
        remote
            .fail("positions", SyncError::Network("injected".into()))
            .await;
        let state = state_with(vec![GoalNode::draft_at(0.0, 0.0)]);

        let bus = EventBus::new();
        let failures = Arc::new(AtomicU32::new(0));
        let failures2 = Arc::clone(&failures);
        let _sub = bus.subscribe(EventKind::SyncFailed, move |_| {
            failures2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let scheduler = PositionScheduler::new(Arc::clone(&state), remote.clone(), bus, 30);
        scheduler.trigger();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(failures.load(Ordering::SeqCst), 1);
        let attempts = remote
            .recorded()
            .await
            .iter()
            .filter(|c| matches!(c, RecordedCall::BulkUpdatePositions(_)))
            .count();
        assert_eq!(attempts, 1, "a failed flush is not retried");
    }
}
