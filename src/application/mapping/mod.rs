//! Identity & mapping layer
//!
//! Pure functions bridging the network model and the OCPI model. No state.

pub mod ids;
pub mod projection;
pub mod tables;

pub use ids::*;
pub use projection::*;
pub use tables::*;
