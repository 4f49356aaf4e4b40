//! OCPI HTTP interface
//!
//! - `common`: envelope, error mapping, pagination query, validated JSON
//! - `middleware`: token authentication and the admin key guard
//! - `modules`: handlers per OCPI module, plus admin, health and metrics
//! - `router`: route table and the admin OpenAPI document

pub mod common;
pub mod middleware;
pub mod modules;
pub mod router;

pub use router::{create_router, AppState, RouterOptions};
