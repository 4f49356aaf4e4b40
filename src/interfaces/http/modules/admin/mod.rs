//! Admin API, guarded by the `X-Admin-Key` header

pub mod dto;
pub mod handlers;
pub mod network;

pub use dto::*;
pub use handlers::*;
