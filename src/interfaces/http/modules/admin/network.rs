//! Network feed: the operator's pools, stations and EVSEs.
//!
//! Every write here goes through [`RoamingNetwork`], which emits the network
//! events the sync adapter turns into OCPI Locations.
//!
//! [`RoamingNetwork`]: crate::domain::network::RoamingNetwork

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;

use super::dto::{ok, AdminResult, ApiResponse};
use crate::domain::network::{
    ChargingPool, ChargingStation, DomainEvse, DomainEvseId, DomainEvseStatus, NetworkView, PoolId,
    StationId,
};
use crate::interfaces::http::router::AppState;

const ACTOR: &str = "admin";

type Written = Result<(StatusCode, Json<ApiResponse<String>>), super::dto::AdminError>;

fn written(created: bool, what: String) -> Written {
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(ApiResponse::success(what))))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EvseStatusRequest {
    /// `Available`, `Charging`, `OutOfService`, ...; unknown values are kept
    /// as `Other`.
    pub status: String,
}

impl EvseStatusRequest {
    fn status(self) -> DomainEvseStatus {
        serde_json::from_value(serde_json::Value::String(self.status.clone()))
            .unwrap_or(DomainEvseStatus::Other(self.status))
    }
}

#[utoipa::path(
    post,
    path = "/admin/network/pools",
    tag = "Network",
    responses(
        (status = 201, description = "Pool created"),
        (status = 200, description = "Pool replaced")
    ),
    security(("admin_key" = []))
)]
pub async fn put_pool(State(state): State<AppState>, Json(pool): Json<ChargingPool>) -> Written {
    let id = pool.id.clone();
    let created = state.network.pool(&id).is_none();
    if created {
        state.network.add_pool(pool)?;
    } else {
        state.network.update_pool(&id, Some(ACTOR), |current| *current = pool)?;
    }
    info!(pool = %id, created, "Pool written");
    written(created, id.to_string())
}

#[utoipa::path(
    post,
    path = "/admin/network/stations",
    tag = "Network",
    responses(
        (status = 201, description = "Station created"),
        (status = 200, description = "Station replaced"),
        (status = 404, description = "Unknown pool")
    ),
    security(("admin_key" = []))
)]
pub async fn put_station(
    State(state): State<AppState>,
    Json(station): Json<ChargingStation>,
) -> Written {
    let id = station.id.clone();
    let created = state.network.station(&id).is_none();
    if created {
        state.network.add_station(station)?;
    } else {
        state.network.update_station(&id, Some(ACTOR), |current| *current = station)?;
    }
    written(created, id.to_string())
}

#[utoipa::path(
    post,
    path = "/admin/network/evses",
    tag = "Network",
    responses(
        (status = 201, description = "EVSE created"),
        (status = 200, description = "EVSE replaced"),
        (status = 404, description = "Unknown station")
    ),
    security(("admin_key" = []))
)]
pub async fn put_evse(State(state): State<AppState>, Json(evse): Json<DomainEvse>) -> Written {
    let id = evse.id.clone();
    let created = state.network.evse(&id).is_none();
    if created {
        state.network.add_evse(evse)?;
    } else {
        state.network.update_evse(&id, Some(ACTOR), |current| *current = evse)?;
    }
    written(created, id.to_string())
}

#[utoipa::path(
    put,
    path = "/admin/network/evses/{evse_id}/status",
    tag = "Network",
    params(("evse_id" = String, Path, description = "Network EVSE id")),
    request_body = EvseStatusRequest,
    responses(
        (status = 200, description = "Status changed"),
        (status = 404, description = "Unknown EVSE")
    ),
    security(("admin_key" = []))
)]
pub async fn set_evse_status(
    State(state): State<AppState>,
    Path(evse_id): Path<String>,
    Json(body): Json<EvseStatusRequest>,
) -> AdminResult<String> {
    let id = DomainEvseId::new(evse_id);
    state.network.set_evse_status(&id, body.status())?;
    ok(id.to_string())
}

#[utoipa::path(
    delete,
    path = "/admin/network/pools/{pool_id}",
    tag = "Network",
    params(("pool_id" = String, Path, description = "Network pool id")),
    responses(
        (status = 200, description = "Pool removed with its stations and EVSEs"),
        (status = 404, description = "Unknown pool")
    ),
    security(("admin_key" = []))
)]
pub async fn delete_pool(
    State(state): State<AppState>,
    Path(pool_id): Path<String>,
) -> AdminResult<String> {
    let removed = state.network.remove_pool(&PoolId::new(pool_id))?;
    ok(removed.id.to_string())
}

#[utoipa::path(
    delete,
    path = "/admin/network/stations/{station_id}",
    tag = "Network",
    params(("station_id" = String, Path, description = "Network station id")),
    responses(
        (status = 200, description = "Station removed with its EVSEs"),
        (status = 404, description = "Unknown station")
    ),
    security(("admin_key" = []))
)]
pub async fn delete_station(
    State(state): State<AppState>,
    Path(station_id): Path<String>,
) -> AdminResult<String> {
    let removed = state.network.remove_station(&StationId::new(station_id))?;
    ok(removed.id.to_string())
}

#[utoipa::path(
    delete,
    path = "/admin/network/evses/{evse_id}",
    tag = "Network",
    params(("evse_id" = String, Path, description = "Network EVSE id")),
    responses(
        (status = 200, description = "EVSE removed"),
        (status = 404, description = "Unknown EVSE")
    ),
    security(("admin_key" = []))
)]
pub async fn delete_evse(
    State(state): State<AppState>,
    Path(evse_id): Path<String>,
) -> AdminResult<String> {
    let removed = state.network.remove_evse(&DomainEvseId::new(evse_id))?;
    ok(removed.id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_status_is_kept_as_other() {
        let known = EvseStatusRequest {
            status: "OutOfService".to_string(),
        };
        assert_eq!(known.status(), DomainEvseStatus::OutOfService);
        let unknown = EvseStatusRequest {
            status: "Hibernating".to_string(),
        };
        assert_eq!(unknown.status(), DomainEvseStatus::Other("Hibernating".to_string()));
    }
}
