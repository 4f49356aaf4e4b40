//! Outbound OCPI client
//!
//! [`OcpiClient`] is the seam between the application services and the HTTP
//! transport used to call remote parties. [`HttpOcpiClient`] is the
//! production implementation; tests substitute an in-memory double.

pub mod http;

#[cfg(test)]
pub mod fake;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::ocpi::{
    CommandRequest, CommandResponse, CommandResult, Credentials, Version, VersionDetails,
};

pub use http::HttpOcpiClient;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("OCPI status {code}: {message}")]
    Ocpi { code: u32, message: String },
    #[error("malformed response: {0}")]
    Decode(String),
}

impl ClientError {
    /// Whether repeating the call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout => true,
            Self::Status(code) => *code >= 500 || *code == 429,
            Self::Ocpi { .. } | Self::Decode(_) => false,
        }
    }
}

/// Calls made by this service to remote parties. `token` is the remote
/// party's token for us, sent in the `Authorization` header.
#[async_trait]
pub trait OcpiClient: Send + Sync {
    async fn get_versions(&self, url: &str, token: &str) -> Result<Vec<Version>, ClientError>;

    async fn get_version_details(
        &self,
        url: &str,
        token: &str,
    ) -> Result<VersionDetails, ClientError>;

    async fn post_credentials(
        &self,
        url: &str,
        token: &str,
        credentials: &Credentials,
    ) -> Result<Credentials, ClientError>;

    /// `url` is the full command url including the command verb.
    async fn post_command(
        &self,
        url: &str,
        token: &str,
        request: &CommandRequest,
    ) -> Result<CommandResponse, ClientError>;

    async fn post_command_result(
        &self,
        url: &str,
        token: &str,
        result: &CommandResult,
    ) -> Result<(), ClientError>;

    /// Receiver-interface PUT of a full object.
    async fn put_object(&self, url: &str, token: &str, body: &Value) -> Result<(), ClientError>;

    /// Receiver-interface PATCH with only the changed fields.
    async fn patch_object(&self, url: &str, token: &str, body: &Value)
        -> Result<(), ClientError>;
}

pub type SharedOcpiClient = Arc<dyn OcpiClient>;
