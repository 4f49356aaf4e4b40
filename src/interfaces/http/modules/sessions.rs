//! Sessions module

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use serde_json::Value;
use tracing::debug;

use super::{ensure_patch, ensure_same, parse_id, read_scope, write_scope};
use crate::domain::ocpi::{ScopedId, Session, SessionId};
use crate::interfaces::http::common::{page_request, OcpiError, OcpiJson, OcpiResponse, PageQuery};
use crate::interfaces::http::middleware::Caller;
use crate::interfaces::http::router::AppState;
use crate::shared::Page;

fn session_id(value: String) -> Result<SessionId, OcpiError> {
    parse_id("session id", value, |v| SessionId::parse(v))
}

/// `GET /ocpi/2.2.1/sessions`
///
/// Our sessions charged to tokens the caller issued, and the caller's own.
pub async fn list_sessions(
    State(state): State<AppState>,
    caller: Caller,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<OcpiResponse<Vec<Session>>, OcpiError> {
    let request = page_request(query)?;
    let entitled: Vec<Session> = state
        .store
        .sessions()
        .into_iter()
        .filter(|s| {
            let owner = s.owner();
            caller.party.acts_for(&owner)
                || (state.identity.owns(&owner) && caller.party.acts_for(&s.cdr_token.issuer()))
        })
        .collect();
    let page = Page::paginate(entitled, &request, state.max_page_size, |s| s.last_updated);
    Ok(OcpiResponse::page(page))
}

/// `GET /receiver/sessions/{cc}/{pid}/{session_id}`
pub async fn get_session(
    State(state): State<AppState>,
    caller: Caller,
    Path((cc, pid, id)): Path<(String, String, String)>,
) -> Result<OcpiResponse<Session>, OcpiError> {
    let key = ScopedId::new(read_scope(&caller, &cc, &pid)?, session_id(id)?);
    state
        .store
        .get_session(&key)
        .map(OcpiResponse::ok)
        .ok_or_else(|| OcpiError::not_found(format!("unknown session {key}")))
}

/// `PUT /receiver/sessions/{cc}/{pid}/{session_id}`
pub async fn put_session(
    State(state): State<AppState>,
    caller: Caller,
    Path((cc, pid, id)): Path<(String, String, String)>,
    OcpiJson(session): OcpiJson<Session>,
) -> Result<OcpiResponse<()>, OcpiError> {
    let scope = write_scope(&state, &caller, &cc, &pid)?;
    let id = session_id(id)?;
    ensure_same("party", &scope, &session.owner())?;
    ensure_same("id", &id, &session.id)?;
    let outcome = state.store.put_session(session);
    debug!(party = %caller.key(), session = %id, changed = outcome.is_changed(), "Session received");
    Ok(OcpiResponse::empty())
}

/// `PATCH /receiver/sessions/{cc}/{pid}/{session_id}`
pub async fn patch_session(
    State(state): State<AppState>,
    caller: Caller,
    Path((cc, pid, id)): Path<(String, String, String)>,
    OcpiJson(patch): OcpiJson<Value>,
) -> Result<OcpiResponse<()>, OcpiError> {
    let scope = write_scope(&state, &caller, &cc, &pid)?;
    ensure_patch(&patch)?;
    let key = ScopedId::new(scope, session_id(id)?);
    state.store.patch_session(&key, &patch)?;
    Ok(OcpiResponse::empty())
}
