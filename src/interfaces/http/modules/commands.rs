//! Commands module
//!
//! Inbound commands are routed to the party operating the addressed object;
//! results come back on `/{command}/{correlation_id}`.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::commands::{CommandView, ResolveOutcome};
use crate::domain::ocpi::{CommandRequest, CommandResponse, CommandResult, CommandType};
use crate::interfaces::http::common::{OcpiError, OcpiJson, OcpiResponse};
use crate::interfaces::http::middleware::Caller;
use crate::interfaces::http::router::AppState;

fn command_type(value: &str) -> Result<CommandType, OcpiError> {
    CommandType::parse(value)
        .ok_or_else(|| OcpiError::invalid_parameters(format!("unknown command {value}")))
}

fn correlation_id(value: &str) -> Result<Uuid, OcpiError> {
    Uuid::parse_str(value)
        .map_err(|_| OcpiError::invalid_parameters(format!("invalid correlation id {value}")))
}

/// `POST /ocpi/2.2.1/commands/{command}`
///
/// The correlation id is returned in the `Location` header, pointing at the
/// result endpoint.
pub async fn receive_command(
    State(state): State<AppState>,
    caller: Caller,
    Path(command): Path<String>,
    OcpiJson(body): OcpiJson<Value>,
) -> Result<OcpiResponse<CommandResponse>, OcpiError> {
    let kind = command_type(&command)?;
    let request = CommandRequest::from_json(kind, body)
        .map_err(|e| OcpiError::invalid_parameters(format!("invalid {kind} request: {e}")))?;
    let dispatched = state.dispatcher.route(request, caller.key()).await?;
    info!(
        party = %caller.key(),
        command = %kind,
        correlation_id = %dispatched.correlation_id,
        result = ?dispatched.response.result,
        "Command received"
    );
    let location = format!(
        "{}/commands/results/{}",
        state.identity.version_details_url(),
        dispatched.correlation_id
    );
    Ok(OcpiResponse::ok(dispatched.response).with_location(location))
}

/// `POST /ocpi/2.2.1/commands/{command}/{correlation_id}`: asynchronous
/// result from the party that executed a forwarded command.
pub async fn receive_result(
    State(state): State<AppState>,
    caller: Caller,
    Path((command, id)): Path<(String, String)>,
    OcpiJson(result): OcpiJson<CommandResult>,
) -> Result<OcpiResponse<()>, OcpiError> {
    let kind = command_type(&command)?;
    let id = correlation_id(&id)?;
    if let Some(view) = state.dispatcher.query(&id) {
        if view.command != kind {
            return Err(OcpiError::invalid_parameters(format!(
                "{id} is a {} command, not {kind}",
                view.command
            )));
        }
    }
    match state.dispatcher.result(&id, caller.key(), result) {
        ResolveOutcome::Resolved => Ok(OcpiResponse::empty()),
        ResolveOutcome::Late => {
            Ok(OcpiResponse::empty().with_message("result arrived after the command was resolved"))
        }
        ResolveOutcome::Unknown => Err(OcpiError::not_found(format!("unknown command {id}"))),
        ResolveOutcome::Foreign => {
            warn!(party = %caller.key(), correlation_id = %id, "Result from a party that does not execute the command");
            state
                .registry
                .record_violation(caller.key(), "command result for a foreign command");
            Err(OcpiError::forbidden(format!(
                "{} does not execute command {id}",
                caller.key()
            )))
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ResultQuery {
    #[serde(default)]
    pub wait: bool,
}

/// `GET /ocpi/2.2.1/commands/results/{correlation_id}[?wait=true]`
pub async fn get_result(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    query: Result<Query<ResultQuery>, QueryRejection>,
) -> Result<OcpiResponse<CommandView>, OcpiError> {
    let id = correlation_id(&id)?;
    let Query(query) = query.map_err(|e| OcpiError::invalid_parameters(e.body_text()))?;
    state
        .dispatcher
        .result_for(&id, &caller.party, query.wait)
        .await
        .map(OcpiResponse::ok)
        .ok_or_else(|| OcpiError::not_found(format!("unknown command {id}")))
}
