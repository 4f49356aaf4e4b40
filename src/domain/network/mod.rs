//! WWCP network model
//!
//! Physical charging infrastructure as a pool → station → EVSE → connector
//! hierarchy, the events it emits, and the inclusion filters used when it is
//! roamed.

pub mod events;
pub mod filter;
pub mod model;
pub mod roaming_network;

pub use events::*;
pub use filter::*;
pub use model::*;
pub use roaming_network::*;
