pub mod admin;
pub mod cdrs;
pub mod commands;
pub mod credentials;
pub mod health;
pub mod locations;
pub mod metrics;
pub mod request_id;
pub mod sessions;
pub mod tariffs;
pub mod tokens;
pub mod versions;

use crate::domain::ocpi::PartyScope;
use crate::interfaces::http::common::OcpiError;
use crate::interfaces::http::middleware::Caller;
use crate::interfaces::http::router::AppState;

/// Party named by a receiver path (`/{country_code}/{party_id}/...`).
fn path_scope(country_code: &str, party_id: &str) -> Result<PartyScope, OcpiError> {
    PartyScope::parse(country_code, party_id).ok_or_else(|| {
        OcpiError::invalid_parameters(format!("invalid party {country_code}/{party_id}"))
    })
}

/// Scope of a receiver read; only the caller's own objects are exposed.
pub(crate) fn read_scope(
    caller: &Caller,
    country_code: &str,
    party_id: &str,
) -> Result<PartyScope, OcpiError> {
    let scope = path_scope(country_code, party_id)?;
    if !caller.party.acts_for(&scope) {
        return Err(OcpiError::forbidden(format!(
            "{} may not read objects of {scope}",
            caller.key()
        )));
    }
    Ok(scope)
}

/// Scope of a receiver write. Writing for another party is a protocol
/// violation and counts towards the caller's automatic block.
pub(crate) fn write_scope(
    state: &AppState,
    caller: &Caller,
    country_code: &str,
    party_id: &str,
) -> Result<PartyScope, OcpiError> {
    let scope = path_scope(country_code, party_id)?;
    ensure_writer(state, caller, &scope)?;
    Ok(scope)
}

pub(crate) fn ensure_writer(
    state: &AppState,
    caller: &Caller,
    scope: &PartyScope,
) -> Result<(), OcpiError> {
    if caller.party.acts_for(scope) {
        return Ok(());
    }
    state
        .registry
        .record_violation(caller.key(), "write to a foreign party scope");
    Err(OcpiError::forbidden(format!(
        "{} may not write objects of {scope}",
        caller.key()
    )))
}

/// Path and body must name the same object.
pub(crate) fn ensure_same<T: PartialEq + std::fmt::Display>(
    field: &str,
    path: &T,
    body: &T,
) -> Result<(), OcpiError> {
    if path == body {
        Ok(())
    } else {
        Err(OcpiError::invalid_parameters(format!(
            "{field} in body ({body}) does not match the url ({path})"
        )))
    }
}

/// OCPI PATCH bodies must carry `last_updated`.
pub(crate) fn ensure_patch(patch: &serde_json::Value) -> Result<(), OcpiError> {
    match patch.as_object() {
        Some(fields) if fields.contains_key("last_updated") => Ok(()),
        Some(_) => Err(OcpiError::invalid_parameters("PATCH requires last_updated")),
        None => Err(OcpiError::invalid_parameters("PATCH body must be an object")),
    }
}

/// Parse an id path segment with the OCPI grammar.
pub(crate) fn parse_id<I>(
    kind: &str,
    value: String,
    parse: impl FnOnce(String) -> Option<I>,
) -> Result<I, OcpiError> {
    parse(value.clone()).ok_or_else(|| OcpiError::invalid_parameters(format!("invalid {kind} '{value}'")))
}

#[cfg(test)]
pub(crate) mod testing;
