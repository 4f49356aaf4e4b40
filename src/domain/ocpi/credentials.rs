//! OCPI Credentials and Versions module objects

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::ids::{CountryCode, PartyId, PartyScope};

/// Role of a party in the roaming network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Cpo,
    Emsp,
    Hub,
    Nap,
    Nsp,
    Other,
    Scsp,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpo => "CPO",
            Self::Emsp => "EMSP",
            Self::Hub => "HUB",
            Self::Nap => "NAP",
            Self::Nsp => "NSP",
            Self::Other => "OTHER",
            Self::Scsp => "SCSP",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct BusinessDetails {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(url)]
    pub website: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct CredentialsRole {
    pub role: Role,
    #[validate(nested)]
    pub business_details: BusinessDetails,
    pub party_id: PartyId,
    pub country_code: CountryCode,
}

impl CredentialsRole {
    pub fn scope(&self) -> PartyScope {
        PartyScope::new(self.country_code.clone(), self.party_id.clone())
    }
}

/// Payload exchanged by the credentials handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Credentials {
    /// Token the receiver of this object must use to call the sender.
    #[validate(length(min = 1, max = 64))]
    pub token: String,
    /// Versions endpoint of the sender.
    #[validate(url)]
    pub url: String,
    #[validate(length(min = 1), nested)]
    pub roles: Vec<CredentialsRole>,
}

/// Supported protocol versions, highest first.
pub const SUPPORTED_VERSIONS: &[&str] = &["2.2.1"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub version: String,
    pub url: String,
}

/// OCPI module identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleId {
    Cdrs,
    #[serde(rename = "chargingprofiles")]
    ChargingProfiles,
    Commands,
    Credentials,
    #[serde(rename = "hubclientinfo")]
    HubClientInfo,
    Locations,
    Sessions,
    Tariffs,
    Tokens,
}

impl ModuleId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cdrs => "cdrs",
            Self::ChargingProfiles => "chargingprofiles",
            Self::Commands => "commands",
            Self::Credentials => "credentials",
            Self::HubClientInfo => "hubclientinfo",
            Self::Locations => "locations",
            Self::Sessions => "sessions",
            Self::Tariffs => "tariffs",
            Self::Tokens => "tokens",
        }
    }
}

impl std::fmt::Display for ModuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InterfaceRole {
    Sender,
    Receiver,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub identifier: ModuleId,
    pub role: InterfaceRole,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDetails {
    pub version: String,
    pub endpoints: Vec<Endpoint>,
}

impl VersionDetails {
    pub fn endpoint(&self, module: ModuleId, role: InterfaceRole) -> Option<&Endpoint> {
        self.endpoints
            .iter()
            .find(|e| e.identifier == module && e.role == role)
    }
}

/// Highest version both sides support.
pub fn select_mutual_version<'a>(offered: &'a [Version]) -> Option<&'a Version> {
    SUPPORTED_VERSIONS
        .iter()
        .find_map(|ours| offered.iter().find(|v| v.version == *ours))
}
