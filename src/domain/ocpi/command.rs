//! OCPI Commands module objects

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ConnectorId, EvseUid, LocationId, SessionId};
use super::token::Token;

/// Remote command verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandType {
    CancelReservation,
    ReserveNow,
    StartSession,
    StopSession,
    UnlockConnector,
}

impl CommandType {
    pub const ALL: [CommandType; 5] = [
        Self::CancelReservation,
        Self::ReserveNow,
        Self::StartSession,
        Self::StopSession,
        Self::UnlockConnector,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CancelReservation => "CANCEL_RESERVATION",
            Self::ReserveNow => "RESERVE_NOW",
            Self::StartSession => "START_SESSION",
            Self::StopSession => "STOP_SESSION",
            Self::UnlockConnector => "UNLOCK_CONNECTOR",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == value)
    }
}

impl std::fmt::Display for CommandType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveNow {
    pub response_url: String,
    pub token: Token,
    pub expiry_date: DateTime<Utc>,
    pub reservation_id: String,
    pub location_id: LocationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evse_uid: Option<EvseUid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelReservation {
    pub response_url: String,
    pub reservation_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartSession {
    pub response_url: String,
    pub token: Token,
    pub location_id: LocationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evse_uid: Option<EvseUid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector_id: Option<ConnectorId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopSession {
    pub response_url: String,
    pub session_id: SessionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockConnector {
    pub response_url: String,
    pub location_id: LocationId,
    pub evse_uid: EvseUid,
    pub connector_id: ConnectorId,
}

/// A command request of any kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandRequest {
    ReserveNow(ReserveNow),
    CancelReservation(CancelReservation),
    StartSession(StartSession),
    StopSession(StopSession),
    UnlockConnector(UnlockConnector),
}

impl CommandRequest {
    pub fn kind(&self) -> CommandType {
        match self {
            Self::ReserveNow(_) => CommandType::ReserveNow,
            Self::CancelReservation(_) => CommandType::CancelReservation,
            Self::StartSession(_) => CommandType::StartSession,
            Self::StopSession(_) => CommandType::StopSession,
            Self::UnlockConnector(_) => CommandType::UnlockConnector,
        }
    }

    /// Decode a request body for the given command verb.
    pub fn from_json(kind: CommandType, body: serde_json::Value) -> serde_json::Result<Self> {
        Ok(match kind {
            CommandType::ReserveNow => Self::ReserveNow(serde_json::from_value(body)?),
            CommandType::CancelReservation => {
                Self::CancelReservation(serde_json::from_value(body)?)
            }
            CommandType::StartSession => Self::StartSession(serde_json::from_value(body)?),
            CommandType::StopSession => Self::StopSession(serde_json::from_value(body)?),
            CommandType::UnlockConnector => Self::UnlockConnector(serde_json::from_value(body)?),
        })
    }

    pub fn to_json(&self) -> serde_json::Value {
        let value = match self {
            Self::ReserveNow(c) => serde_json::to_value(c),
            Self::CancelReservation(c) => serde_json::to_value(c),
            Self::StartSession(c) => serde_json::to_value(c),
            Self::StopSession(c) => serde_json::to_value(c),
            Self::UnlockConnector(c) => serde_json::to_value(c),
        };
        value.unwrap_or_default()
    }

    pub fn response_url(&self) -> &str {
        match self {
            Self::ReserveNow(c) => &c.response_url,
            Self::CancelReservation(c) => &c.response_url,
            Self::StartSession(c) => &c.response_url,
            Self::StopSession(c) => &c.response_url,
            Self::UnlockConnector(c) => &c.response_url,
        }
    }

    /// Replace the callback url before forwarding to the target party.
    pub fn set_response_url(&mut self, url: String) {
        match self {
            Self::ReserveNow(c) => c.response_url = url,
            Self::CancelReservation(c) => c.response_url = url,
            Self::StartSession(c) => c.response_url = url,
            Self::StopSession(c) => c.response_url = url,
            Self::UnlockConnector(c) => c.response_url = url,
        }
    }

    /// Location the command addresses, if any.
    pub fn location_id(&self) -> Option<&LocationId> {
        match self {
            Self::ReserveNow(c) => Some(&c.location_id),
            Self::StartSession(c) => Some(&c.location_id),
            Self::UnlockConnector(c) => Some(&c.location_id),
            Self::CancelReservation(_) | Self::StopSession(_) => None,
        }
    }
}

/// Synchronous acknowledgement of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandResponseType {
    NotSupported,
    Rejected,
    Accepted,
    UnknownSession,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub result: CommandResponseType,
    /// Seconds the receiver expects to need for the asynchronous result.
    pub timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Asynchronous outcome reported by the party executing the command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandResultType {
    Accepted,
    CanceledReservation,
    EvseOccupied,
    EvseInoperative,
    Failed,
    NotSupported,
    Rejected,
    Timeout,
    UnknownReservation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub result: CommandResultType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
