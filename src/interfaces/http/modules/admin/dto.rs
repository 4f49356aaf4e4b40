//! Admin API DTOs

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::application::parties::{HandshakeError, RegistryError};
use crate::domain::network::{DomainEvseId, InclusionFilter, NetworkError, PoolId};
use crate::domain::ocpi::Role;
use crate::domain::party::{AccessStatus, PartyStatus, RegistrationState, RemoteParty};

/// Admin API response wrapper
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

pub type AdminResult<T> = Result<Json<ApiResponse<T>>, AdminError>;

pub fn ok<T>(data: T) -> AdminResult<T> {
    Ok(Json(ApiResponse::success(data)))
}

#[derive(Debug)]
pub struct AdminError {
    pub status: StatusCode,
    pub message: String,
}

impl AdminError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::error(self.message))).into_response()
    }
}

impl From<RegistryError> for AdminError {
    fn from(e: RegistryError) -> Self {
        let status = match e {
            RegistryError::UnknownParty(_) => StatusCode::NOT_FOUND,
            RegistryError::AlreadyExists(_) | RegistryError::TokenInUse => StatusCode::CONFLICT,
        };
        Self::new(status, e.to_string())
    }
}

impl From<HandshakeError> for AdminError {
    fn from(e: HandshakeError) -> Self {
        let status = match &e {
            HandshakeError::Registry(RegistryError::UnknownParty(_)) => StatusCode::NOT_FOUND,
            HandshakeError::Registry(_) | HandshakeError::AlreadyRegistered => StatusCode::CONFLICT,
            HandshakeError::Unreachable(_)
            | HandshakeError::MissingEndpoint(_)
            | HandshakeError::NoMutualVersion => StatusCode::BAD_GATEWAY,
            _ => StatusCode::BAD_REQUEST,
        };
        Self::new(status, e.to_string())
    }
}

impl From<NetworkError> for AdminError {
    fn from(e: NetworkError) -> Self {
        let status = match e {
            NetworkError::Duplicate(_) => StatusCode::CONFLICT,
            NetworkError::UnknownPool(_)
            | NetworkError::UnknownStation(_)
            | NetworkError::UnknownEvse(_) => StatusCode::NOT_FOUND,
        };
        Self::new(status, e.to_string())
    }
}

/// Inclusion filter as exchanged over the admin API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct FilterDto {
    pub include_pools: Vec<String>,
    pub exclude_pools: Vec<String>,
    pub include_evses: Vec<String>,
    pub exclude_evses: Vec<String>,
}

impl From<&InclusionFilter> for FilterDto {
    fn from(f: &InclusionFilter) -> Self {
        Self {
            include_pools: f.include_pools.iter().map(|p| p.to_string()).collect(),
            exclude_pools: f.exclude_pools.iter().map(|p| p.to_string()).collect(),
            include_evses: f.include_evses.iter().map(|e| e.to_string()).collect(),
            exclude_evses: f.exclude_evses.iter().map(|e| e.to_string()).collect(),
        }
    }
}

impl From<FilterDto> for InclusionFilter {
    fn from(dto: FilterDto) -> Self {
        Self {
            include_pools: dto.include_pools.into_iter().map(PoolId::new).collect(),
            exclude_pools: dto.exclude_pools.into_iter().map(PoolId::new).collect(),
            include_evses: dto.include_evses.into_iter().map(DomainEvseId::new).collect(),
            exclude_evses: dto.exclude_evses.into_iter().map(DomainEvseId::new).collect(),
        }
    }
}

/// Remote party API representation. Tokens are never exposed.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PartyDto {
    pub country_code: String,
    pub party_id: String,
    #[schema(value_type = String, example = "EMSP")]
    pub role: Role,
    pub business_name: String,
    pub status: PartyStatus,
    pub access: AccessStatus,
    pub registration: RegistrationState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub versions_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Number of endpoints learned during the handshake
    pub endpoints: usize,
    pub push: bool,
    pub filter: FilterDto,
    pub violations: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<RemoteParty> for PartyDto {
    fn from(p: RemoteParty) -> Self {
        Self {
            country_code: p.scope.country_code.to_string(),
            party_id: p.scope.party_id.to_string(),
            role: p.role,
            business_name: p.business_name,
            status: p.status,
            access: p.access,
            registration: p.registration,
            versions_url: p.versions_url,
            version: p.version,
            endpoints: p.endpoints.len(),
            push: p.push,
            filter: FilterDto::from(&p.filter),
            violations: p.violations,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

/// Create party request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreatePartyRequest {
    #[validate(length(equal = 2, message = "country_code must be 2 characters"))]
    pub country_code: String,
    #[validate(length(equal = 3, message = "party_id must be 3 characters"))]
    pub party_id: String,
    #[schema(value_type = String, example = "EMSP")]
    pub role: Role,
    #[validate(length(min = 1, max = 100, message = "business_name must be 1-100 characters"))]
    pub business_name: String,
    /// Versions url of the party, when we are the one to start the handshake
    #[validate(url)]
    pub versions_url: Option<String>,
    /// Token A the party handed us out of band
    pub token: Option<String>,
    #[serde(default)]
    pub push: bool,
}

/// A created party together with the Token A it must use to register
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreatedPartyResponse {
    pub party: PartyDto,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StatusRequest {
    pub status: PartyStatus,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AccessRequest {
    pub access: AccessStatus,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PushRequest {
    pub push: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ResyncResponse {
    /// Locations queued for re-synchronization
    pub queued: usize,
}
