//! Response envelope shared by every OCPI module

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OCPI status codes used on the wire.
pub mod status {
    pub const SUCCESS: u32 = 1000;
    pub const CLIENT_ERROR: u32 = 2000;
    pub const INVALID_PARAMETERS: u32 = 2001;
    pub const NOT_ENOUGH_INFORMATION: u32 = 2002;
    pub const UNKNOWN_LOCATION: u32 = 2003;
    pub const UNKNOWN_TOKEN: u32 = 2004;
    pub const SERVER_ERROR: u32 = 3000;
    pub const UNABLE_TO_USE_CLIENT_API: u32 = 3001;
    pub const UNSUPPORTED_VERSION: u32 = 3002;

    pub fn is_success(code: u32) -> bool {
        (1000..2000).contains(&code)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Envelope<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    pub status_code: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> Envelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            status_code: status::SUCCESS,
            status_message: Some("Success".to_string()),
            timestamp: Utc::now(),
        }
    }

    pub fn error(status_code: u32, message: impl Into<String>) -> Self {
        Self {
            data: None,
            status_code,
            status_message: Some(message.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        status::is_success(self.status_code)
    }
}
