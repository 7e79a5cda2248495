//! Typed event bus decoupling state changes from presentation.

pub mod bus;
pub mod types;

pub use bus::{EventBus, Subscription};
pub use types::{EventKind, GraphEvent, SyncFailure};
