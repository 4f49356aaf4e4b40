//! OCPI 2.2.1 object model
//!
//! Plain data records only; no behaviour beyond small invariant helpers. The
//! flat Location → EVSE → Connector tree shares nothing with the network model
//! in [`crate::domain::network`]; the two are bridged by
//! [`crate::application::mapping`].

pub mod command;
pub mod credentials;
pub mod envelope;
pub mod ids;
pub mod location;
pub mod session;
pub mod tariff;
pub mod token;

pub use command::*;
pub use credentials::*;
pub use envelope::{status, Envelope};
pub use ids::*;
pub use location::*;
pub use session::*;
pub use tariff::*;
pub use token::*;
