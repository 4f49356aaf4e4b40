//! Health check handler

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, http::StatusCode, Json};
use chrono::{Duration, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::application::parties::SharedPartyRegistry;
use crate::application::sync::SharedSyncAdapter;
use crate::application::SharedCommandDispatcher;
use crate::domain::party::AccessStatus;

/// Window in which a synchronization failure marks the service degraded.
const RECENT_FAILURE_MINUTES: i64 = 5;

/// Health check state
#[derive(Clone)]
pub struct HealthState {
    pub registry: SharedPartyRegistry,
    pub sync: SharedSyncAdapter,
    pub dispatcher: SharedCommandDispatcher,
    pub started_at: Arc<Instant>,
}

/// Service health response
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub parties: usize,
    pub registered_parties: usize,
    pub blocked_parties: usize,
    pub pending_commands: usize,
    /// Locations with queued synchronization work
    pub sync_queues: usize,
    pub recent_sync_failures: usize,
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Synchronization is failing", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let parties = state.registry.parties();
    let since = Utc::now() - Duration::minutes(RECENT_FAILURE_MINUTES);
    let recent_failures = state
        .sync
        .failures()
        .iter()
        .filter(|f| f.at >= since)
        .count();

    let (http_status, status) = if recent_failures == 0 {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        http_status,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: state.started_at.elapsed().as_secs(),
            parties: parties.len(),
            registered_parties: parties.iter().filter(|p| p.is_registered()).count(),
            blocked_parties: parties
                .iter()
                .filter(|p| p.access == AccessStatus::Blocked)
                .count(),
            pending_commands: state.dispatcher.pending_count(),
            sync_queues: state.sync.queue_count(),
            recent_sync_failures: recent_failures,
        }),
    )
}
