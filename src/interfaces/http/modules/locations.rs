//! Locations module
//!
//! Sender interface: our published Locations, seen through the caller's
//! inclusion filter, plus whatever the caller pushed to us itself.
//! Receiver interface: Locations owned by the caller, written by the caller.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use serde_json::Value;
use tracing::debug;

use super::{ensure_patch, ensure_same, parse_id, read_scope, write_scope};
use crate::application::store::LocationKey;
use crate::application::sync::restrict_location;
use crate::domain::ocpi::{Connector, ConnectorId, Evse, EvseUid, Location, LocationId};
use crate::interfaces::http::common::{page_request, OcpiError, OcpiJson, OcpiResponse, PageQuery};
use crate::interfaces::http::middleware::Caller;
use crate::interfaces::http::router::AppState;
use crate::shared::Page;

/// The part of `location` the caller may see, if any.
fn visible(state: &AppState, caller: &Caller, location: Location) -> Option<Location> {
    let owner = location.owner();
    if caller.party.acts_for(&owner) {
        return Some(location);
    }
    if state.identity.owns(&owner) && location.publish {
        return restrict_location(&location, &caller.party.filter);
    }
    None
}

fn location_id(value: String) -> Result<LocationId, OcpiError> {
    parse_id("location id", value, |v| LocationId::parse(v))
}

fn evse_uid(value: String) -> Result<EvseUid, OcpiError> {
    parse_id("EVSE uid", value, |v| EvseUid::parse(v))
}

fn connector_id(value: String) -> Result<ConnectorId, OcpiError> {
    parse_id("connector id", value, |v| ConnectorId::parse(v))
}

/// First Location with this id the caller may see.
async fn find_visible(
    state: &AppState,
    caller: &Caller,
    id: &LocationId,
) -> Result<Location, OcpiError> {
    state
        .store
        .find_locations(id)
        .await?
        .into_iter()
        .find_map(|location| visible(state, caller, location))
        .ok_or_else(|| OcpiError::unknown_location(format!("unknown location {id}")))
}

fn evse_of<'a>(location: &'a Location, uid: &EvseUid) -> Result<&'a Evse, OcpiError> {
    location
        .evse(uid)
        .ok_or_else(|| OcpiError::unknown_location(format!("unknown EVSE {}/{uid}", location.id)))
}

fn connector_of<'a>(evse: &'a Evse, id: &ConnectorId) -> Result<&'a Connector, OcpiError> {
    evse.connector(id)
        .ok_or_else(|| OcpiError::unknown_location(format!("unknown connector {}/{id}", evse.uid)))
}

// ── Sender ─────────────────────────────────────────────────────

/// `GET /ocpi/2.2.1/locations`
pub async fn list_locations(
    State(state): State<AppState>,
    caller: Caller,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<OcpiResponse<Vec<Location>>, OcpiError> {
    let request = page_request(query)?;
    let entitled: Vec<Location> = state
        .store
        .locations()
        .await?
        .into_iter()
        .filter_map(|location| visible(&state, &caller, location))
        .collect();
    debug!(party = %caller.key(), count = entitled.len(), "Locations listed");
    let page = Page::paginate(entitled, &request, state.max_page_size, |l| l.last_updated);
    Ok(OcpiResponse::page(page))
}

/// `GET /ocpi/2.2.1/locations/{location_id}`
pub async fn get_location(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<OcpiResponse<Location>, OcpiError> {
    let id = location_id(id)?;
    Ok(OcpiResponse::ok(find_visible(&state, &caller, &id).await?))
}

/// `GET /ocpi/2.2.1/locations/{location_id}/{evse_uid}`
pub async fn get_evse(
    State(state): State<AppState>,
    caller: Caller,
    Path((id, uid)): Path<(String, String)>,
) -> Result<OcpiResponse<Evse>, OcpiError> {
    let (id, uid) = (location_id(id)?, evse_uid(uid)?);
    let location = find_visible(&state, &caller, &id).await?;
    Ok(OcpiResponse::ok(evse_of(&location, &uid)?.clone()))
}

/// `GET /ocpi/2.2.1/locations/{location_id}/{evse_uid}/{connector_id}`
pub async fn get_connector(
    State(state): State<AppState>,
    caller: Caller,
    Path((id, uid, connector)): Path<(String, String, String)>,
) -> Result<OcpiResponse<Connector>, OcpiError> {
    let (id, uid, connector) = (location_id(id)?, evse_uid(uid)?, connector_id(connector)?);
    let location = find_visible(&state, &caller, &id).await?;
    let evse = evse_of(&location, &uid)?;
    Ok(OcpiResponse::ok(connector_of(evse, &connector)?.clone()))
}

// ── Receiver ───────────────────────────────────────────────────

async fn stored(state: &AppState, key: &LocationKey) -> Result<Location, OcpiError> {
    state
        .store
        .get_location(key)
        .await?
        .ok_or_else(|| OcpiError::unknown_location(format!("unknown location {key}")))
}

/// `GET /receiver/locations/{cc}/{pid}/{location_id}`
pub async fn receiver_get_location(
    State(state): State<AppState>,
    caller: Caller,
    Path((cc, pid, id)): Path<(String, String, String)>,
) -> Result<OcpiResponse<Location>, OcpiError> {
    let key = LocationKey::new(read_scope(&caller, &cc, &pid)?, location_id(id)?);
    Ok(OcpiResponse::ok(stored(&state, &key).await?))
}

/// `GET /receiver/locations/{cc}/{pid}/{location_id}/{evse_uid}`
pub async fn receiver_get_evse(
    State(state): State<AppState>,
    caller: Caller,
    Path((cc, pid, id, uid)): Path<(String, String, String, String)>,
) -> Result<OcpiResponse<Evse>, OcpiError> {
    let key = LocationKey::new(read_scope(&caller, &cc, &pid)?, location_id(id)?);
    let uid = evse_uid(uid)?;
    let location = stored(&state, &key).await?;
    Ok(OcpiResponse::ok(evse_of(&location, &uid)?.clone()))
}

/// `GET /receiver/locations/{cc}/{pid}/{location_id}/{evse_uid}/{connector_id}`
pub async fn receiver_get_connector(
    State(state): State<AppState>,
    caller: Caller,
    Path((cc, pid, id, uid, connector)): Path<(String, String, String, String, String)>,
) -> Result<OcpiResponse<Connector>, OcpiError> {
    let key = LocationKey::new(read_scope(&caller, &cc, &pid)?, location_id(id)?);
    let (uid, connector) = (evse_uid(uid)?, connector_id(connector)?);
    let location = stored(&state, &key).await?;
    let evse = evse_of(&location, &uid)?;
    Ok(OcpiResponse::ok(connector_of(evse, &connector)?.clone()))
}

/// `PUT /receiver/locations/{cc}/{pid}/{location_id}`
pub async fn put_location(
    State(state): State<AppState>,
    caller: Caller,
    Path((cc, pid, id)): Path<(String, String, String)>,
    OcpiJson(mut location): OcpiJson<Location>,
) -> Result<OcpiResponse<()>, OcpiError> {
    let scope = write_scope(&state, &caller, &cc, &pid)?;
    let id = location_id(id)?;
    ensure_same("party", &scope, &location.owner())?;
    ensure_same("id", &id, &location.id)?;
    location.normalize();
    let outcome = state.store.upsert_location(location).await?;
    debug!(party = %caller.key(), location = %id, changed = outcome.is_changed(), "Location received");
    Ok(OcpiResponse::empty())
}

/// `PUT /receiver/locations/{cc}/{pid}/{location_id}/{evse_uid}`
pub async fn put_evse(
    State(state): State<AppState>,
    caller: Caller,
    Path((cc, pid, id, uid)): Path<(String, String, String, String)>,
    OcpiJson(evse): OcpiJson<Evse>,
) -> Result<OcpiResponse<()>, OcpiError> {
    let key = LocationKey::new(write_scope(&state, &caller, &cc, &pid)?, location_id(id)?);
    ensure_same("uid", &evse_uid(uid)?, &evse.uid)?;
    state.store.upsert_evse(&key, evse).await?;
    Ok(OcpiResponse::empty())
}

/// `PUT /receiver/locations/{cc}/{pid}/{location_id}/{evse_uid}/{connector_id}`
pub async fn put_connector(
    State(state): State<AppState>,
    caller: Caller,
    Path((cc, pid, id, uid, connector_id_path)): Path<(String, String, String, String, String)>,
    OcpiJson(connector): OcpiJson<Connector>,
) -> Result<OcpiResponse<()>, OcpiError> {
    let key = LocationKey::new(write_scope(&state, &caller, &cc, &pid)?, location_id(id)?);
    ensure_same("id", &connector_id(connector_id_path)?, &connector.id)?;
    state.store.upsert_connector(&key, &evse_uid(uid)?, connector).await?;
    Ok(OcpiResponse::empty())
}

/// `PATCH /receiver/locations/{cc}/{pid}/{location_id}`
pub async fn patch_location(
    State(state): State<AppState>,
    caller: Caller,
    Path((cc, pid, id)): Path<(String, String, String)>,
    OcpiJson(patch): OcpiJson<Value>,
) -> Result<OcpiResponse<()>, OcpiError> {
    let scope = write_scope(&state, &caller, &cc, &pid)?;
    ensure_patch(&patch)?;
    let key = LocationKey::new(scope, location_id(id)?);
    state.store.patch_location(&key, &patch).await?;
    Ok(OcpiResponse::empty())
}

/// `PATCH /receiver/locations/{cc}/{pid}/{location_id}/{evse_uid}`
pub async fn patch_evse(
    State(state): State<AppState>,
    caller: Caller,
    Path((cc, pid, id, uid)): Path<(String, String, String, String)>,
    OcpiJson(patch): OcpiJson<Value>,
) -> Result<OcpiResponse<()>, OcpiError> {
    let scope = write_scope(&state, &caller, &cc, &pid)?;
    ensure_patch(&patch)?;
    let key = LocationKey::new(scope, location_id(id)?);
    state.store.patch_evse(&key, &evse_uid(uid)?, &patch).await?;
    Ok(OcpiResponse::empty())
}

/// `PATCH /receiver/locations/{cc}/{pid}/{location_id}/{evse_uid}/{connector_id}`
pub async fn patch_connector(
    State(state): State<AppState>,
    caller: Caller,
    Path((cc, pid, id, uid, connector)): Path<(String, String, String, String, String)>,
    OcpiJson(patch): OcpiJson<Value>,
) -> Result<OcpiResponse<()>, OcpiError> {
    let scope = write_scope(&state, &caller, &cc, &pid)?;
    ensure_patch(&patch)?;
    let key = LocationKey::new(scope, location_id(id)?);
    state
        .store
        .patch_connector(&key, &evse_uid(uid)?, &connector_id(connector)?, &patch)
        .await?;
    Ok(OcpiResponse::empty())
}
