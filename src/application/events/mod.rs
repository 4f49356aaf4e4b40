//! Internal event bus
//!
//! Carries object-store change notifications, party lifecycle changes and
//! command resolutions to in-process subscribers (push service, auditing).

pub mod event_bus;
pub mod types;

pub use event_bus::{create_event_bus, EventBus, EventSubscriber, SharedEventBus};
pub use types::*;
