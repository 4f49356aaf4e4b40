//! Authorization middleware for Axum
//!
//! OCPI routes authenticate the calling party through the Remote Party
//! Registry before any handler (and therefore any store read) runs. Admin
//! routes check a static API key against its configured SHA-256 hash.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::application::parties::{AuthError, AuthorizedParty, SharedPartyRegistry};
use crate::domain::ocpi::ModuleId;
use crate::domain::party::TokenScope;
use crate::interfaces::http::common::OcpiError;

/// Header carrying the admin API key.
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Which part of the protocol surface a router serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// `/ocpi/versions` and the version details.
    VersionDiscovery,
    Module(ModuleId),
}

impl Gate {
    fn label(&self) -> &'static str {
        match self {
            Self::VersionDiscovery => "versions",
            Self::Module(module) => module.as_str(),
        }
    }

    /// Routes reachable with Token A, before the handshake completed.
    fn is_bootstrap(&self) -> bool {
        matches!(self, Self::VersionDiscovery | Self::Module(ModuleId::Credentials))
    }
}

/// Authorization state for one OCPI router.
#[derive(Clone)]
pub struct OcpiAuthState {
    pub registry: SharedPartyRegistry,
    pub gate: Gate,
    /// Version discovery requires a token too.
    pub gate_version_discovery: bool,
}

impl OcpiAuthState {
    pub fn new(registry: SharedPartyRegistry, gate: Gate, gate_version_discovery: bool) -> Self {
        Self {
            registry,
            gate,
            gate_version_discovery,
        }
    }
}

/// Token from an `Authorization` header. OCPI 2.2 sends
/// `Token <base64(token)>`; older peers send the token unencoded.
pub fn extract_token(auth_header: &str) -> Option<String> {
    let (scheme, value) = auth_header.trim().split_once(' ')?;
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if scheme.eq_ignore_ascii_case("token") {
        let decoded = STANDARD
            .decode(value)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .filter(|token| !token.is_empty() && token.chars().all(|c| c.is_ascii_graphic()));
        return Some(decoded.unwrap_or_else(|| value.to_string()));
    }
    if scheme.eq_ignore_ascii_case("bearer") {
        return Some(value.to_string());
    }
    None
}

fn reason(err: &AuthError) -> &'static str {
    match err {
        AuthError::Missing => "missing",
        AuthError::UnknownToken => "unknown_token",
        AuthError::Disabled => "disabled",
        AuthError::Blocked => "blocked",
        AuthError::OutOfScope => "out_of_scope",
    }
}

fn reject(gate: Gate, err: AuthError) -> Response {
    metrics::counter!(
        "ocpi_auth_failures_total",
        "module" => gate.label(),
        "reason" => reason(&err)
    )
    .increment(1);
    debug!(module = gate.label(), reason = reason(&err), "Request refused");
    OcpiError::from(err).into_response()
}

/// Resolve the caller's token and enforce the module gate.
pub async fn ocpi_auth_middleware(
    State(auth): State<OcpiAuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if auth.gate == Gate::VersionDiscovery && !auth.gate_version_discovery {
        return next.run(request).await;
    }

    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(extract_token);
    let Some(token) = token else {
        return reject(auth.gate, AuthError::Missing);
    };

    let caller = match auth.registry.authorize(&token) {
        Ok(caller) => caller,
        Err(err) => return reject(auth.gate, err),
    };

    if !auth.gate.is_bootstrap()
        && (caller.scope != TokenScope::Full || !caller.party.is_registered())
    {
        warn!(party = %caller.key(), module = auth.gate.label(), "Token not valid for module");
        return reject(auth.gate, AuthError::OutOfScope);
    }

    request.extensions_mut().insert(Caller(Arc::new(caller)));
    next.run(request).await
}

/// The authorized party behind the current request.
#[derive(Debug, Clone)]
pub struct Caller(pub Arc<AuthorizedParty>);

impl std::ops::Deref for Caller {
    type Target = AuthorizedParty;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = OcpiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Caller>()
            .cloned()
            .ok_or_else(|| OcpiError::from(AuthError::Missing))
    }
}

// ── Admin ──────────────────────────────────────────────────────

/// Hex SHA-256 of an admin key, the form stored in the configuration.
pub fn hash_admin_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

#[derive(Clone)]
pub struct AdminAuthState {
    /// `None` disables the admin API.
    pub key_sha256: Option<Arc<str>>,
}

pub async fn admin_auth_middleware(
    State(auth): State<AdminAuthState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = auth.key_sha256.as_deref() else {
        return OcpiError::forbidden("admin API is disabled").into_response();
    };
    let presented = request
        .headers()
        .get(ADMIN_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(hash_admin_key);
    match presented {
        Some(hash) if hash.eq_ignore_ascii_case(expected) => next.run(request).await,
        Some(_) => {
            warn!("Admin request with wrong key");
            OcpiError::forbidden("invalid admin key").into_response()
        }
        None => OcpiError::from(AuthError::Missing).into_response(),
    }
}
