//! OCPI envelope responses
//!
//! Every handler answers with [`OcpiResponse`] or [`OcpiError`]; both render
//! the `{data, status_code, status_message, timestamp}` envelope so a client
//! never has to guess the body shape, not even for auth failures.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::application::commands::CommandError;
use crate::application::parties::{AuthError, HandshakeError, RegistryError};
use crate::application::store::StoreError;
use crate::domain::ocpi::{status, Envelope};
use crate::shared::Page;

pub const TOTAL_COUNT_HEADER: &str = "x-total-count";
pub const FILTERED_COUNT_HEADER: &str = "x-filtered-count";
pub const LIMIT_HEADER: &str = "x-limit";

/// Successful envelope, optionally carrying pagination headers.
pub struct OcpiResponse<T> {
    status: StatusCode,
    envelope: Envelope<T>,
    page: Option<(usize, usize, usize)>,
    location: Option<String>,
}

impl<T: Serialize> OcpiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            status: StatusCode::OK,
            envelope: Envelope::success(data),
            page: None,
            location: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.envelope.status_message = Some(message.into());
        self
    }

    /// Adds a `Location` header.
    pub fn with_location(mut self, url: impl Into<String>) -> Self {
        self.location = Some(url.into());
        self
    }
}

impl OcpiResponse<()> {
    /// Success without a `data` member (DELETE, PUT acknowledgements).
    pub fn empty() -> Self {
        Self {
            status: StatusCode::OK,
            envelope: Envelope {
                data: None,
                status_code: status::SUCCESS,
                status_message: Some("Success".to_string()),
                timestamp: Utc::now(),
            },
            page: None,
            location: None,
        }
    }
}

impl<T: Serialize> OcpiResponse<Vec<T>> {
    /// One page of a collection with `X-Total-Count`, `X-Filtered-Count`
    /// and `X-Limit`.
    pub fn page(page: Page<T>) -> Self {
        let counts = (page.total, page.filtered, page.limit);
        let mut response = Self::ok(page.items);
        response.page = Some(counts);
        response
    }
}

impl<T: Serialize> IntoResponse for OcpiResponse<T> {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.envelope)).into_response();
        let headers = response.headers_mut();
        if let Some((total, filtered, limit)) = self.page {
            headers.insert(TOTAL_COUNT_HEADER, HeaderValue::from(total));
            headers.insert(FILTERED_COUNT_HEADER, HeaderValue::from(filtered));
            headers.insert(LIMIT_HEADER, HeaderValue::from(limit));
        }
        if let Some(location) = self.location.and_then(|l| HeaderValue::from_str(&l).ok()) {
            headers.insert(axum::http::header::LOCATION, location);
        }
        response
    }
}

/// Error envelope: HTTP status plus OCPI status code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{status_code}: {message}")]
pub struct OcpiError {
    pub http: StatusCode,
    pub status_code: u32,
    pub message: String,
}

impl OcpiError {
    pub fn new(http: StatusCode, status_code: u32, message: impl Into<String>) -> Self {
        Self {
            http,
            status_code,
            message: message.into(),
        }
    }

    pub fn invalid_parameters(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, status::INVALID_PARAMETERS, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, status::CLIENT_ERROR, message)
    }

    pub fn unknown_location(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, status::UNKNOWN_LOCATION, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, status::CLIENT_ERROR, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, status::SERVER_ERROR, message)
    }
}

impl IntoResponse for OcpiError {
    fn into_response(self) -> Response {
        let body = Envelope::<()>::error(self.status_code, self.message);
        (self.http, Json(body)).into_response()
    }
}

impl From<AuthError> for OcpiError {
    fn from(err: AuthError) -> Self {
        let http = if err.is_unauthenticated() {
            StatusCode::UNAUTHORIZED
        } else {
            StatusCode::FORBIDDEN
        };
        Self::new(http, status::CLIENT_ERROR, err.to_string())
    }
}

impl From<StoreError> for OcpiError {
    fn from(err: StoreError) -> Self {
        let message = err.to_string();
        match err {
            StoreError::Contended(_) => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, status::SERVER_ERROR, message)
            }
            StoreError::UnknownLocation(_)
            | StoreError::UnknownEvse(_)
            | StoreError::UnknownConnector(_) => Self::unknown_location(message),
            StoreError::UnknownObject { .. } => Self::not_found(message),
            StoreError::Immutable(_) => {
                Self::new(StatusCode::CONFLICT, status::CLIENT_ERROR, message)
            }
            StoreError::InvalidPatch(_) => Self::invalid_parameters(message),
        }
    }
}

impl From<HandshakeError> for OcpiError {
    fn from(err: HandshakeError) -> Self {
        let http = match &err {
            HandshakeError::AlreadyRegistered | HandshakeError::NotRegistered => {
                StatusCode::METHOD_NOT_ALLOWED
            }
            HandshakeError::Registry(RegistryError::UnknownParty(_)) => StatusCode::NOT_FOUND,
            HandshakeError::Registry(_) => StatusCode::CONFLICT,
            HandshakeError::InvalidCredentials(_) | HandshakeError::MissingBootstrap => {
                StatusCode::BAD_REQUEST
            }
            // The request itself was fine; the party's API was not.
            HandshakeError::Unreachable(_)
            | HandshakeError::MissingEndpoint(_)
            | HandshakeError::NoMutualVersion => StatusCode::OK,
        };
        Self::new(http, err.status_code(), err.to_string())
    }
}

impl From<RegistryError> for OcpiError {
    fn from(err: RegistryError) -> Self {
        let http = match err {
            RegistryError::UnknownParty(_) => StatusCode::NOT_FOUND,
            RegistryError::AlreadyExists(_) | RegistryError::TokenInUse => StatusCode::CONFLICT,
        };
        Self::new(http, status::CLIENT_ERROR, err.to_string())
    }
}

impl From<CommandError> for OcpiError {
    fn from(err: CommandError) -> Self {
        let http = match err {
            CommandError::UnknownParty(_) | CommandError::UnknownLocation(_) => {
                StatusCode::NOT_FOUND
            }
            CommandError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(http, err.status_code(), err.to_string())
    }
}
