//! Snapshot persistence and cached serving of the canonical tables.

pub mod cache;
pub mod service;
pub mod snapshot;

pub use cache::{CacheState, CacheStore, UpdateOutcome};
pub use service::DataService;
pub use snapshot::Snapshot;
