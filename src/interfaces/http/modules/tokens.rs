//! Tokens module, including real-time authorization.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use super::{ensure_patch, ensure_same, parse_id, read_scope, write_scope};
use crate::domain::ocpi::{
    status, AuthorizationInfo, ScopedId, Token, TokenType, TokenUid,
};
use crate::interfaces::http::common::{page_request, OcpiError, OcpiJson, OcpiResponse, PageQuery};
use crate::interfaces::http::middleware::Caller;
use crate::interfaces::http::router::AppState;
use crate::shared::Page;

fn token_uid(value: String) -> Result<TokenUid, OcpiError> {
    parse_id("token uid", value, |v| TokenUid::parse(v))
}

fn unknown_token(uid: &TokenUid) -> OcpiError {
    OcpiError::new(
        StatusCode::NOT_FOUND,
        status::UNKNOWN_TOKEN,
        format!("unknown token {uid}"),
    )
}

/// `GET /ocpi/2.2.1/tokens`: our tokens plus the caller's own.
pub async fn list_tokens(
    State(state): State<AppState>,
    caller: Caller,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<OcpiResponse<Vec<Token>>, OcpiError> {
    let request = page_request(query)?;
    let entitled: Vec<Token> = state
        .store
        .tokens()
        .into_iter()
        .filter(|t| {
            let owner = t.owner();
            state.identity.owns(&owner) || caller.party.acts_for(&owner)
        })
        .collect();
    let page = Page::paginate(entitled, &request, state.max_page_size, |t| t.last_updated);
    Ok(OcpiResponse::page(page))
}

#[derive(Debug, Default, Deserialize)]
pub struct AuthorizeQuery {
    #[serde(rename = "type")]
    pub token_type: Option<TokenType>,
}

/// `POST /ocpi/2.2.1/tokens/{token_uid}/authorize[?type=RFID]`
///
/// Only tokens issued by us or by the caller are answered; anything else is
/// reported as unknown.
pub async fn authorize(
    State(state): State<AppState>,
    caller: Caller,
    Path(uid): Path<String>,
    query: Result<Query<AuthorizeQuery>, QueryRejection>,
) -> Result<OcpiResponse<AuthorizationInfo>, OcpiError> {
    let uid = token_uid(uid)?;
    let Query(query) =
        query.map_err(|e| OcpiError::invalid_parameters(format!("invalid token type: {e}")))?;
    let info = state
        .store
        .authorize_token(&uid, query.token_type)
        .filter(|info| {
            let issuer = info.token.issuer();
            state.identity.owns(&issuer) || caller.party.acts_for(&issuer)
        })
        .ok_or_else(|| unknown_token(&uid))?;
    info!(party = %caller.key(), token = %uid, allowed = ?info.allowed, "Token authorized");
    Ok(OcpiResponse::ok(info))
}

/// `GET /receiver/tokens/{cc}/{pid}/{token_uid}`
pub async fn get_token(
    State(state): State<AppState>,
    caller: Caller,
    Path((cc, pid, uid)): Path<(String, String, String)>,
) -> Result<OcpiResponse<Token>, OcpiError> {
    let key = ScopedId::new(read_scope(&caller, &cc, &pid)?, token_uid(uid)?);
    state
        .store
        .get_token(&key)
        .map(OcpiResponse::ok)
        .ok_or_else(|| unknown_token(&key.id))
}

/// `PUT /receiver/tokens/{cc}/{pid}/{token_uid}`
pub async fn put_token(
    State(state): State<AppState>,
    caller: Caller,
    Path((cc, pid, uid)): Path<(String, String, String)>,
    OcpiJson(token): OcpiJson<Token>,
) -> Result<OcpiResponse<()>, OcpiError> {
    let scope = write_scope(&state, &caller, &cc, &pid)?;
    let uid = token_uid(uid)?;
    ensure_same("party", &scope, &token.owner())?;
    ensure_same("uid", &uid, &token.uid)?;
    let outcome = state.store.put_token(token);
    debug!(party = %caller.key(), token = %uid, changed = outcome.is_changed(), "Token received");
    Ok(OcpiResponse::empty())
}

/// `PATCH /receiver/tokens/{cc}/{pid}/{token_uid}`
pub async fn patch_token(
    State(state): State<AppState>,
    caller: Caller,
    Path((cc, pid, uid)): Path<(String, String, String)>,
    OcpiJson(patch): OcpiJson<Value>,
) -> Result<OcpiResponse<()>, OcpiError> {
    let scope = write_scope(&state, &caller, &cc, &pid)?;
    ensure_patch(&patch)?;
    let key = ScopedId::new(scope, token_uid(uid)?);
    state.store.patch_token(&key, &patch)?;
    Ok(OcpiResponse::empty())
}
