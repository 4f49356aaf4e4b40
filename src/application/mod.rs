pub mod client;
pub mod commands;
pub mod events;
pub mod mapping;
pub mod parties;
pub mod push;
pub mod store;
pub mod sync;

// Re-export key types for convenience
pub use client::{ClientError, HttpOcpiClient, OcpiClient, SharedOcpiClient};
pub use commands::{CommandConfig, CommandDispatcher, SharedCommandDispatcher};
pub use events::{create_event_bus, Event, EventBus, EventSubscriber, SharedEventBus};
pub use parties::{
    CredentialsService, LocalIdentity, PartyRegistry, SharedCredentialsService,
    SharedPartyRegistry,
};
pub use push::{PushService, SharedPushService};
pub use store::{ObjectStore, RemovalPolicy, SharedObjectStore};
pub use sync::{SharedSyncAdapter, SyncAdapter, SyncConfig};
