//! Network → OCPI synchronization

pub mod adapter;
pub mod filter;
mod queue;

pub use adapter::{FailureKind, SharedSyncAdapter, SyncAdapter, SyncConfig, SyncError, SyncFailure};
pub use filter::{restrict_location, InclusionFilter};
