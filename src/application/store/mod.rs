//! Authoritative store of OCPI objects and its change notifications

pub mod changes;
pub mod object_store;

pub use changes::{content_eq, diff, ChangeNotification, FieldChange, ObjectKind, UpsertOutcome};
pub use object_store::{LocationKey, ObjectStore, RemovalPolicy, SharedObjectStore, StoreError};
