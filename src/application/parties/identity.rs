//! Identity of this platform as seen by remote parties

use crate::domain::ocpi::{
    BusinessDetails, CommandType, Credentials, CredentialsRole, Endpoint, InterfaceRole, ModuleId,
    PartyScope, Role,
};

pub const OCPI_VERSION: &str = "2.2.1";

/// Modules served under `/ocpi/2.2.1`.
const SERVED_MODULES: &[ModuleId] = &[
    ModuleId::Credentials,
    ModuleId::Locations,
    ModuleId::Tariffs,
    ModuleId::Sessions,
    ModuleId::Cdrs,
    ModuleId::Tokens,
    ModuleId::Commands,
];

#[derive(Debug, Clone)]
pub struct LocalIdentity {
    pub scope: PartyScope,
    pub business_name: String,
    pub roles: Vec<CredentialsRole>,
    /// Externally reachable base url, without trailing slash.
    pub public_url: String,
}

impl LocalIdentity {
    /// Identity with a single CPO role for `scope`.
    pub fn cpo(scope: PartyScope, business_name: impl Into<String>, public_url: &str) -> Self {
        let business_name = business_name.into();
        let role = CredentialsRole {
            role: Role::Cpo,
            business_details: BusinessDetails {
                name: business_name.clone(),
                website: None,
            },
            party_id: scope.party_id.clone(),
            country_code: scope.country_code.clone(),
        };
        Self {
            scope,
            business_name,
            roles: vec![role],
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn versions_url(&self) -> String {
        format!("{}/ocpi/versions", self.public_url)
    }

    pub fn version_details_url(&self) -> String {
        format!("{}/ocpi/{OCPI_VERSION}", self.public_url)
    }

    pub fn module_url(&self, module: ModuleId) -> String {
        format!("{}/{module}", self.version_details_url())
    }

    /// Where parties push objects they own. Credentials and commands share
    /// one url for both interface roles.
    pub fn receiver_url(&self, module: ModuleId) -> String {
        match module {
            ModuleId::Credentials | ModuleId::Commands => self.module_url(module),
            _ => format!("{}/receiver/{module}", self.version_details_url()),
        }
    }

    /// Callback url handed to the party executing a command.
    pub fn command_response_url(&self, kind: CommandType, correlation_id: &str) -> String {
        format!("{}/{kind}/{correlation_id}", self.module_url(ModuleId::Commands))
    }

    pub fn endpoints(&self) -> Vec<Endpoint> {
        SERVED_MODULES
            .iter()
            .flat_map(|module| {
                [
                    Endpoint {
                        identifier: *module,
                        role: InterfaceRole::Sender,
                        url: self.module_url(*module),
                    },
                    Endpoint {
                        identifier: *module,
                        role: InterfaceRole::Receiver,
                        url: self.receiver_url(*module),
                    },
                ]
            })
            .collect()
    }

    /// Our credentials object carrying the token the party must use to call us.
    pub fn credentials(&self, token: &str) -> Credentials {
        Credentials {
            token: token.to_string(),
            url: self.versions_url(),
            roles: self.roles.clone(),
        }
    }

    /// Whether `scope` is this platform (or one of its roles).
    pub fn owns(&self, scope: &PartyScope) -> bool {
        &self.scope == scope || self.roles.iter().any(|r| &r.scope() == scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_derived_from_public_url() {
        let identity = LocalIdentity::cpo(
            PartyScope::parse("DE", "GEF").unwrap(),
            "GraphDefined",
            "https://ocpi.example.com/",
        );
        assert_eq!(identity.versions_url(), "https://ocpi.example.com/ocpi/versions");
        assert_eq!(
            identity.command_response_url(CommandType::StartSession, "abc"),
            "https://ocpi.example.com/ocpi/2.2.1/commands/START_SESSION/abc"
        );
        assert_eq!(identity.endpoints().len(), 14);
        assert_eq!(
            identity.receiver_url(ModuleId::Locations),
            "https://ocpi.example.com/ocpi/2.2.1/receiver/locations"
        );
        assert!(identity.owns(&PartyScope::parse("DE", "GEF").unwrap()));
        assert!(!identity.owns(&PartyScope::parse("NL", "EMS").unwrap()));
    }
}
