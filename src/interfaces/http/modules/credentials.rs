//! Credentials module: the registration handshake as seen from the party
//! calling us.

use axum::extract::State;
use tracing::info;

use crate::domain::ocpi::Credentials;
use crate::interfaces::http::common::{OcpiError, OcpiResponse, ValidatedJson};
use crate::interfaces::http::middleware::Caller;
use crate::interfaces::http::router::AppState;

/// `GET credentials`: our credentials, carrying the token the caller uses.
pub async fn get_credentials(
    State(state): State<AppState>,
    caller: Caller,
) -> OcpiResponse<Credentials> {
    OcpiResponse::ok(state.credentials.our_credentials(&caller.token))
}

/// `POST credentials`: the caller registers with Token A.
pub async fn register(
    State(state): State<AppState>,
    caller: Caller,
    ValidatedJson(body): ValidatedJson<Credentials>,
) -> Result<OcpiResponse<Credentials>, OcpiError> {
    let ours = state.credentials.register(caller.key(), body).await?;
    info!(party = %caller.key(), "Party registered");
    Ok(OcpiResponse::ok(ours))
}

/// `PUT credentials`: the caller updates its credentials; we rotate ours.
pub async fn update(
    State(state): State<AppState>,
    caller: Caller,
    ValidatedJson(body): ValidatedJson<Credentials>,
) -> Result<OcpiResponse<Credentials>, OcpiError> {
    let ours = state.credentials.update(caller.key(), body).await?;
    Ok(OcpiResponse::ok(ours))
}

/// `DELETE credentials`: the caller unregisters.
pub async fn unregister(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<OcpiResponse<()>, OcpiError> {
    state.credentials.unregister(caller.key()).await?;
    info!(party = %caller.key(), "Party unregistered");
    Ok(OcpiResponse::empty())
}
