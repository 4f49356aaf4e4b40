//! Admin API handlers: remote parties, synchronization, commands

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::info;
use uuid::Uuid;

use super::dto::{
    ok, AccessRequest, AdminError, AdminResult, ApiResponse, CreatePartyRequest,
    CreatedPartyResponse, FilterDto, PartyDto, PushRequest, ResyncResponse, StatusRequest,
    TokenResponse,
};
use crate::application::commands::CommandView;
use crate::application::parties::generate_token;
use crate::application::sync::SyncFailure;
use crate::domain::ocpi::PartyScope;
use crate::domain::party::{AccessToken, RemoteParty, TokenScope};
use crate::interfaces::http::common::ValidatedJson;
use crate::interfaces::http::router::AppState;

fn scope(country_code: &str, party_id: &str) -> Result<PartyScope, AdminError> {
    PartyScope::parse(country_code, party_id)
        .ok_or_else(|| AdminError::bad_request(format!("invalid party {country_code}/{party_id}")))
}

fn party(state: &AppState, scope: &PartyScope) -> AdminResult<PartyDto> {
    state
        .registry
        .get(scope)
        .map(|p| Json(ApiResponse::success(PartyDto::from(p))))
        .ok_or_else(|| AdminError::not_found(format!("unknown party {scope}")))
}

#[utoipa::path(
    get,
    path = "/admin/parties",
    tag = "Parties",
    responses(
        (status = 200, description = "Every remote party", body = ApiResponse<Vec<PartyDto>>)
    ),
    security(("admin_key" = []))
)]
pub async fn list_parties(State(state): State<AppState>) -> AdminResult<Vec<PartyDto>> {
    ok(state
        .registry
        .parties()
        .into_iter()
        .map(PartyDto::from)
        .collect())
}

#[utoipa::path(
    post,
    path = "/admin/parties",
    tag = "Parties",
    request_body = CreatePartyRequest,
    responses(
        (status = 201, description = "Party created, with its Token A", body = ApiResponse<CreatedPartyResponse>),
        (status = 409, description = "Party already exists"),
        (status = 422, description = "Validation error")
    ),
    security(("admin_key" = []))
)]
pub async fn create_party(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<CreatePartyRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CreatedPartyResponse>>), AdminError> {
    let scope = scope(&body.country_code, &body.party_id)?;
    let token = generate_token();
    let mut remote = RemoteParty::new(scope.clone(), body.role, body.business_name);
    remote.local_tokens.push(AccessToken {
        value: token.clone(),
        scope: TokenScope::Registration,
    });
    remote.remote_token = body.token;
    remote.versions_url = body.versions_url;
    remote.push = body.push;
    state.registry.add_party(remote.clone())?;
    info!(party = %scope, "Party created through the admin API");
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(CreatedPartyResponse {
            party: PartyDto::from(remote),
            token,
        })),
    ))
}

#[utoipa::path(
    delete,
    path = "/admin/parties/{country_code}/{party_id}",
    tag = "Parties",
    params(
        ("country_code" = String, Path, description = "ISO 3166-1 alpha-2 country code"),
        ("party_id" = String, Path, description = "Three character party id")
    ),
    responses(
        (status = 200, description = "Party removed", body = ApiResponse<PartyDto>),
        (status = 404, description = "Unknown party")
    ),
    security(("admin_key" = []))
)]
pub async fn delete_party(
    State(state): State<AppState>,
    Path((country_code, party_id)): Path<(String, String)>,
) -> AdminResult<PartyDto> {
    let scope = scope(&country_code, &party_id)?;
    let removed = state.registry.remove_party(&scope)?;
    ok(PartyDto::from(removed))
}

#[utoipa::path(
    post,
    path = "/admin/parties/{country_code}/{party_id}/rotate",
    tag = "Parties",
    params(
        ("country_code" = String, Path, description = "ISO 3166-1 alpha-2 country code"),
        ("party_id" = String, Path, description = "Three character party id")
    ),
    responses(
        (status = 200, description = "New inbound token; the old one stops working", body = ApiResponse<TokenResponse>),
        (status = 404, description = "Unknown party")
    ),
    security(("admin_key" = []))
)]
pub async fn rotate_token(
    State(state): State<AppState>,
    Path((country_code, party_id)): Path<(String, String)>,
) -> AdminResult<TokenResponse> {
    let scope = scope(&country_code, &party_id)?;
    let token = state.registry.rotate_token(&scope)?;
    ok(TokenResponse { token })
}

#[utoipa::path(
    post,
    path = "/admin/parties/{country_code}/{party_id}/status",
    tag = "Parties",
    params(
        ("country_code" = String, Path, description = "ISO 3166-1 alpha-2 country code"),
        ("party_id" = String, Path, description = "Three character party id")
    ),
    request_body = StatusRequest,
    responses(
        (status = 200, description = "Status changed", body = ApiResponse<PartyDto>),
        (status = 404, description = "Unknown party")
    ),
    security(("admin_key" = []))
)]
pub async fn set_status(
    State(state): State<AppState>,
    Path((country_code, party_id)): Path<(String, String)>,
    Json(body): Json<StatusRequest>,
) -> AdminResult<PartyDto> {
    let scope = scope(&country_code, &party_id)?;
    state.registry.set_party_status(&scope, body.status)?;
    party(&state, &scope)
}

#[utoipa::path(
    post,
    path = "/admin/parties/{country_code}/{party_id}/access",
    tag = "Parties",
    params(
        ("country_code" = String, Path, description = "ISO 3166-1 alpha-2 country code"),
        ("party_id" = String, Path, description = "Three character party id")
    ),
    request_body = AccessRequest,
    responses(
        (status = 200, description = "Access changed; allowing again clears violations", body = ApiResponse<PartyDto>),
        (status = 404, description = "Unknown party")
    ),
    security(("admin_key" = []))
)]
pub async fn set_access(
    State(state): State<AppState>,
    Path((country_code, party_id)): Path<(String, String)>,
    Json(body): Json<AccessRequest>,
) -> AdminResult<PartyDto> {
    let scope = scope(&country_code, &party_id)?;
    state.registry.set_access_status(&scope, body.access)?;
    party(&state, &scope)
}

#[utoipa::path(
    put,
    path = "/admin/parties/{country_code}/{party_id}/filter",
    tag = "Parties",
    params(
        ("country_code" = String, Path, description = "ISO 3166-1 alpha-2 country code"),
        ("party_id" = String, Path, description = "Three character party id")
    ),
    request_body = FilterDto,
    responses(
        (status = 200, description = "Per-party inclusion filter replaced", body = ApiResponse<PartyDto>),
        (status = 404, description = "Unknown party")
    ),
    security(("admin_key" = []))
)]
pub async fn set_party_filter(
    State(state): State<AppState>,
    Path((country_code, party_id)): Path<(String, String)>,
    Json(body): Json<FilterDto>,
) -> AdminResult<PartyDto> {
    let scope = scope(&country_code, &party_id)?;
    state.registry.set_filter(&scope, body.into())?;
    party(&state, &scope)
}

#[utoipa::path(
    put,
    path = "/admin/parties/{country_code}/{party_id}/push",
    tag = "Parties",
    params(
        ("country_code" = String, Path, description = "ISO 3166-1 alpha-2 country code"),
        ("party_id" = String, Path, description = "Three character party id")
    ),
    request_body = PushRequest,
    responses(
        (status = 200, description = "Push delivery switched", body = ApiResponse<PartyDto>),
        (status = 404, description = "Unknown party")
    ),
    security(("admin_key" = []))
)]
pub async fn set_push(
    State(state): State<AppState>,
    Path((country_code, party_id)): Path<(String, String)>,
    Json(body): Json<PushRequest>,
) -> AdminResult<PartyDto> {
    let scope = scope(&country_code, &party_id)?;
    state.registry.set_push(&scope, body.push)?;
    party(&state, &scope)
}

#[utoipa::path(
    post,
    path = "/admin/parties/{country_code}/{party_id}/register",
    tag = "Parties",
    params(
        ("country_code" = String, Path, description = "ISO 3166-1 alpha-2 country code"),
        ("party_id" = String, Path, description = "Three character party id")
    ),
    responses(
        (status = 200, description = "Registered with the party", body = ApiResponse<PartyDto>),
        (status = 400, description = "No versions url or token configured"),
        (status = 409, description = "Already registered"),
        (status = 502, description = "Party unreachable or no mutual version")
    ),
    security(("admin_key" = []))
)]
pub async fn register_party(
    State(state): State<AppState>,
    Path((country_code, party_id)): Path<(String, String)>,
) -> AdminResult<PartyDto> {
    let scope = scope(&country_code, &party_id)?;
    state.credentials.register_with(&scope).await?;
    party(&state, &scope)
}

#[utoipa::path(
    post,
    path = "/admin/resync",
    tag = "Sync",
    responses(
        (status = 200, description = "Every pool re-queued for synchronization", body = ApiResponse<ResyncResponse>)
    ),
    security(("admin_key" = []))
)]
pub async fn resync(State(state): State<AppState>) -> AdminResult<ResyncResponse> {
    let queued = state.sync.full_resync().await;
    ok(ResyncResponse { queued })
}

#[utoipa::path(
    put,
    path = "/admin/sync/filter",
    tag = "Sync",
    request_body = FilterDto,
    responses(
        (status = 200, description = "Global inclusion filter replaced; affected pools re-queued", body = ApiResponse<ResyncResponse>)
    ),
    security(("admin_key" = []))
)]
pub async fn set_sync_filter(
    State(state): State<AppState>,
    Json(body): Json<FilterDto>,
) -> AdminResult<ResyncResponse> {
    let queued = state.sync.set_filter(body.into()).await;
    ok(ResyncResponse { queued })
}

#[utoipa::path(
    get,
    path = "/admin/sync/failures",
    tag = "Sync",
    responses(
        (status = 200, description = "Recent synchronization failures, newest last", body = ApiResponse<Vec<SyncFailure>>)
    ),
    security(("admin_key" = []))
)]
pub async fn sync_failures(State(state): State<AppState>) -> AdminResult<Vec<SyncFailure>> {
    ok(state.sync.failures())
}

#[utoipa::path(
    get,
    path = "/admin/commands/{correlation_id}",
    tag = "Commands",
    params(("correlation_id" = Uuid, Path, description = "Correlation id of the command")),
    responses(
        (status = 200, description = "Command snapshot", body = ApiResponse<CommandView>),
        (status = 404, description = "Unknown or purged command")
    ),
    security(("admin_key" = []))
)]
pub async fn get_command(
    State(state): State<AppState>,
    Path(correlation_id): Path<Uuid>,
) -> AdminResult<CommandView> {
    state
        .dispatcher
        .query(&correlation_id)
        .map(|view| Json(ApiResponse::success(view)))
        .ok_or_else(|| AdminError::not_found(format!("unknown command {correlation_id}")))
}
