//! Version discovery (bootstrap endpoints)

use axum::extract::State;

use crate::application::parties::OCPI_VERSION;
use crate::domain::ocpi::{Version, VersionDetails};
use crate::interfaces::http::common::OcpiResponse;
use crate::interfaces::http::router::AppState;

/// `GET /ocpi/versions`
pub async fn list_versions(State(state): State<AppState>) -> OcpiResponse<Vec<Version>> {
    OcpiResponse::ok(vec![Version {
        version: OCPI_VERSION.to_string(),
        url: state.identity.version_details_url(),
    }])
}

/// `GET /ocpi/2.2.1`
pub async fn version_details(State(state): State<AppState>) -> OcpiResponse<VersionDetails> {
    OcpiResponse::ok(VersionDetails {
        version: OCPI_VERSION.to_string(),
        endpoints: state.identity.endpoints(),
    })
}
