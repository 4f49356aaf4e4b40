//! Tariffs module

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use tracing::debug;

use super::{ensure_same, parse_id, read_scope, write_scope};
use crate::domain::ocpi::{ScopedId, Tariff, TariffId};
use crate::interfaces::http::common::{page_request, OcpiError, OcpiJson, OcpiResponse, PageQuery};
use crate::interfaces::http::middleware::Caller;
use crate::interfaces::http::router::AppState;
use crate::shared::Page;

fn tariff_id(value: String) -> Result<TariffId, OcpiError> {
    parse_id("tariff id", value, |v| TariffId::parse(v))
}

/// `GET /ocpi/2.2.1/tariffs`: our tariffs plus the caller's own.
pub async fn list_tariffs(
    State(state): State<AppState>,
    caller: Caller,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<OcpiResponse<Vec<Tariff>>, OcpiError> {
    let request = page_request(query)?;
    let entitled: Vec<Tariff> = state
        .store
        .tariffs()
        .into_iter()
        .filter(|t| {
            let owner = t.owner();
            state.identity.owns(&owner) || caller.party.acts_for(&owner)
        })
        .collect();
    let page = Page::paginate(entitled, &request, state.max_page_size, |t| t.last_updated);
    Ok(OcpiResponse::page(page))
}

/// `GET /receiver/tariffs/{cc}/{pid}/{tariff_id}`
pub async fn get_tariff(
    State(state): State<AppState>,
    caller: Caller,
    Path((cc, pid, id)): Path<(String, String, String)>,
) -> Result<OcpiResponse<Tariff>, OcpiError> {
    let key = ScopedId::new(read_scope(&caller, &cc, &pid)?, tariff_id(id)?);
    state
        .store
        .get_tariff(&key)
        .map(OcpiResponse::ok)
        .ok_or_else(|| OcpiError::not_found(format!("unknown tariff {key}")))
}

/// `PUT /receiver/tariffs/{cc}/{pid}/{tariff_id}`
pub async fn put_tariff(
    State(state): State<AppState>,
    caller: Caller,
    Path((cc, pid, id)): Path<(String, String, String)>,
    OcpiJson(tariff): OcpiJson<Tariff>,
) -> Result<OcpiResponse<()>, OcpiError> {
    let scope = write_scope(&state, &caller, &cc, &pid)?;
    let id = tariff_id(id)?;
    ensure_same("party", &scope, &tariff.owner())?;
    ensure_same("id", &id, &tariff.id)?;
    let outcome = state.store.put_tariff(tariff);
    debug!(party = %caller.key(), tariff = %id, changed = outcome.is_changed(), "Tariff received");
    Ok(OcpiResponse::empty())
}

/// `DELETE /receiver/tariffs/{cc}/{pid}/{tariff_id}`
pub async fn delete_tariff(
    State(state): State<AppState>,
    caller: Caller,
    Path((cc, pid, id)): Path<(String, String, String)>,
) -> Result<OcpiResponse<()>, OcpiError> {
    let key = ScopedId::new(write_scope(&state, &caller, &cc, &pid)?, tariff_id(id)?);
    state.store.delete_tariff(&key)?;
    Ok(OcpiResponse::empty())
}
