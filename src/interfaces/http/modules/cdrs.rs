//! CDRs module. CDRs are immutable once posted.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use tracing::info;

use super::{parse_id, write_scope};
use crate::domain::ocpi::{Cdr, CdrId, ModuleId, ScopedId};
use crate::interfaces::http::common::{page_request, OcpiError, OcpiJson, OcpiResponse, PageQuery};
use crate::interfaces::http::middleware::Caller;
use crate::interfaces::http::router::AppState;
use crate::shared::Page;

/// Our CDRs for tokens the caller issued, and the caller's own.
fn entitled(state: &AppState, caller: &Caller, cdr: &Cdr) -> bool {
    let owner = cdr.owner();
    caller.party.acts_for(&owner)
        || (state.identity.owns(&owner) && caller.party.acts_for(&cdr.cdr_token.issuer()))
}

/// `GET /ocpi/2.2.1/cdrs`
pub async fn list_cdrs(
    State(state): State<AppState>,
    caller: Caller,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<OcpiResponse<Vec<Cdr>>, OcpiError> {
    let request = page_request(query)?;
    let cdrs: Vec<Cdr> = state
        .store
        .cdrs()
        .into_iter()
        .filter(|cdr| entitled(&state, &caller, cdr))
        .collect();
    let page = Page::paginate(cdrs, &request, state.max_page_size, |c| c.last_updated);
    Ok(OcpiResponse::page(page))
}

/// `POST /receiver/cdrs`: the owner is taken from the body.
pub async fn post_cdr(
    State(state): State<AppState>,
    caller: Caller,
    OcpiJson(cdr): OcpiJson<Cdr>,
) -> Result<OcpiResponse<()>, OcpiError> {
    let owner = cdr.owner();
    write_scope(
        &state,
        &caller,
        owner.country_code.as_str(),
        owner.party_id.as_str(),
    )?;
    let id = cdr.id.clone();
    state.store.post_cdr(cdr)?;
    info!(party = %caller.key(), cdr = %id, "CDR received");
    Ok(OcpiResponse::empty().with_location(format!(
        "{}/{}",
        state.identity.receiver_url(ModuleId::Cdrs),
        id
    )))
}

/// `GET /receiver/cdrs/{cdr_id}`: a CDR the caller posted earlier.
pub async fn get_cdr(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<OcpiResponse<Cdr>, OcpiError> {
    let id = parse_id("CDR id", id, |v| CdrId::parse(v))?;
    let key = ScopedId::new(caller.key().clone(), id);
    state
        .store
        .get_cdr(&key)
        .map(OcpiResponse::ok)
        .ok_or_else(|| OcpiError::not_found(format!("unknown CDR {}", key.id)))
}
