//! Remote roaming partner aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::network::InclusionFilter;
use crate::domain::ocpi::{CredentialsRole, Endpoint, InterfaceRole, ModuleId, PartyScope, Role};

/// Administrative axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum PartyStatus {
    Enabled,
    Disabled,
}

/// Access axis; flipped to `Blocked` by an operator or after repeated
/// protocol violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccessStatus {
    Allowed,
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationState {
    Unregistered,
    PendingCredentialsExchange,
    Registered,
}

/// What an inbound token may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TokenScope {
    /// Token A: the credentials module only.
    Registration,
    Full,
}

/// Token accepted from a party on inbound requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub value: String,
    pub scope: TokenScope,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteParty {
    pub scope: PartyScope,
    pub role: Role,
    pub business_name: String,
    /// Roles announced by the party during the handshake.
    pub roles: Vec<CredentialsRole>,
    pub local_tokens: Vec<AccessToken>,
    /// Token we present when calling the party.
    pub remote_token: Option<String>,
    pub status: PartyStatus,
    pub access: AccessStatus,
    pub registration: RegistrationState,
    pub versions_url: Option<String>,
    pub version: Option<String>,
    pub endpoints: Vec<Endpoint>,
    /// Push Location/EVSE updates to this party.
    pub push: bool,
    pub filter: InclusionFilter,
    pub violations: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RemoteParty {
    pub fn new(scope: PartyScope, role: Role, business_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            scope,
            role,
            business_name: business_name.into(),
            roles: Vec::new(),
            local_tokens: Vec::new(),
            remote_token: None,
            status: PartyStatus::Enabled,
            access: AccessStatus::Allowed,
            registration: RegistrationState::Unregistered,
            versions_url: None,
            version: None,
            endpoints: Vec::new(),
            push: false,
            filter: InclusionFilter::default(),
            violations: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Both axes must be open for any request to pass.
    pub fn is_authorized(&self) -> bool {
        self.status == PartyStatus::Enabled && self.access == AccessStatus::Allowed
    }

    pub fn is_registered(&self) -> bool {
        self.registration == RegistrationState::Registered
    }

    /// Registered, open and asked for pushed Location updates.
    pub fn receives_push(&self) -> bool {
        self.push && self.is_registered() && self.is_authorized()
    }

    pub fn endpoint(&self, module: ModuleId, role: InterfaceRole) -> Option<&str> {
        self.endpoints
            .iter()
            .find(|e| e.identifier == module && e.role == role)
            .map(|e| e.url.as_str())
    }

    /// Every party scope this party may act for (its own plus announced roles).
    pub fn acts_for(&self, scope: &PartyScope) -> bool {
        &self.scope == scope || self.roles.iter().any(|r| &r.scope() == scope)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
