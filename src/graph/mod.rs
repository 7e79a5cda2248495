//! Graph state: canonical node collection, optimistic mutation engine,
//! and the debounced position scheduler.

pub mod engine;
pub mod models;
pub mod scheduler;
pub mod store;

pub use engine::MutationEngine;
pub use models::{GoalNode, NodeDraft, NodePatch, PositionUpdate, TrackRecord};
pub use scheduler::PositionScheduler;
pub use store::GraphState;
