//! # Texnouz OCPI Service
//!
//! OCPI 2.2.1 endpoint for a charging network: projects network entities onto
//! OCPI Locations, keeps them synchronized, manages remote parties and their
//! credentials, and routes remote commands.
//!
//! ## Architecture
//!
//! - **domain**: charging network model, OCPI object model, remote parties
//! - **application**: identity mapping, object store, party registry,
//!   synchronization, command dispatch, outbound client, push
//! - **interfaces**: OCPI HTTP surface and admin API
//! - **shared**: pagination, retry, graceful shutdown
//! - **config** / **server**: TOML configuration and runtime wiring

pub mod application;
pub mod config;
pub mod domain;
pub mod interfaces;
pub mod server;
pub mod shared;

pub use config::{default_config_path, AppConfig, ConfigError};
pub use interfaces::http::{create_router, AppState, RouterOptions};
pub use server::{init_tracing, ServerHandle};
