//! Pending actions — records, store, and approval matching.

pub mod matcher;
pub mod model;
pub mod store;

pub use matcher::{ApprovalMatcher, Intent, Resolution};
pub use model::{ActionKind, ActionPayload, ActionStatus, PendingAction};
pub use store::{ActionStore, spawn_sweep_task};
