//! Credentials handshake
//!
//! Per-party state machine `Unregistered -> PendingCredentialsExchange ->
//! Registered`. A failed registration falls back to `Unregistered` and keeps
//! Token A; a failed update leaves a registered party as it was. The failure
//! is reported to the initiator and nothing is retried.

use std::sync::Arc;

use tracing::{info, warn};
use validator::Validate;

use super::identity::{LocalIdentity, OCPI_VERSION};
use super::registry::{generate_token, RegistryError, SharedPartyRegistry};
use crate::application::client::{ClientError, SharedOcpiClient};
use crate::domain::ocpi::{
    select_mutual_version, status, Credentials, Endpoint, InterfaceRole, ModuleId, PartyScope,
};
use crate::domain::party::{RegistrationState, RemoteParty, TokenScope};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HandshakeError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("party is already registered")]
    AlreadyRegistered,
    #[error("party is not registered")]
    NotRegistered,
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),
    #[error("party has no versions url or token to register with")]
    MissingBootstrap,
    #[error("unable to use client API: {0}")]
    Unreachable(#[from] ClientError),
    #[error("party does not expose the {0} module")]
    MissingEndpoint(ModuleId),
    #[error("no mutually supported OCPI version")]
    NoMutualVersion,
}

impl HandshakeError {
    pub fn status_code(&self) -> u32 {
        match self {
            Self::Registry(_) | Self::AlreadyRegistered | Self::NotRegistered => {
                status::CLIENT_ERROR
            }
            Self::InvalidCredentials(_) | Self::MissingBootstrap => status::INVALID_PARAMETERS,
            Self::Unreachable(_) | Self::MissingEndpoint(_) => status::UNABLE_TO_USE_CLIENT_API,
            Self::NoMutualVersion => status::UNSUPPORTED_VERSION,
        }
    }
}

/// What the handshake learned about the party's API.
struct Negotiated {
    versions_url: String,
    version: String,
    endpoints: Vec<Endpoint>,
}

pub struct CredentialsService {
    registry: SharedPartyRegistry,
    client: SharedOcpiClient,
    identity: Arc<LocalIdentity>,
}

impl CredentialsService {
    pub fn new(
        registry: SharedPartyRegistry,
        client: SharedOcpiClient,
        identity: Arc<LocalIdentity>,
    ) -> Self {
        Self {
            registry,
            client,
            identity,
        }
    }

    /// `GET credentials`: our credentials carrying the caller's own token.
    pub fn our_credentials(&self, token: &str) -> Credentials {
        self.identity.credentials(token)
    }

    /// `POST credentials`: registration initiated by the party using Token A.
    pub async fn register(
        &self,
        scope: &PartyScope,
        credentials: Credentials,
    ) -> Result<Credentials, HandshakeError> {
        let _guard = self.registry.lock_party(scope).await;
        let party = self.party(scope)?;
        if party.is_registered() {
            return Err(HandshakeError::AlreadyRegistered);
        }

        self.begin(scope)?;
        let result = self.accept(scope, &credentials).await;
        self.finish(scope, RegistrationState::Unregistered, result)
    }

    /// `PUT credentials`: a registered party refreshes its credentials; our
    /// token for it is rotated. A failed update keeps the party registered
    /// with its current tokens.
    pub async fn update(
        &self,
        scope: &PartyScope,
        credentials: Credentials,
    ) -> Result<Credentials, HandshakeError> {
        let _guard = self.registry.lock_party(scope).await;
        let party = self.party(scope)?;
        if !party.is_registered() {
            return Err(HandshakeError::NotRegistered);
        }

        self.begin(scope)?;
        let result = self.accept(scope, &credentials).await;
        self.finish(scope, RegistrationState::Registered, result)
    }

    /// `DELETE credentials`: the party unregisters and loses access.
    pub async fn unregister(&self, scope: &PartyScope) -> Result<(), HandshakeError> {
        let _guard = self.registry.lock_party(scope).await;
        let party = self.party(scope)?;
        if !party.is_registered() {
            return Err(HandshakeError::NotRegistered);
        }
        self.registry.revoke_tokens(scope)?;
        self.registry.update(scope, |party| {
            party.remote_token = None;
            party.endpoints.clear();
        })?;
        self.registry
            .set_registration(scope, RegistrationState::Unregistered)?;
        info!(party = %scope, "Party unregistered");
        Ok(())
    }

    /// Registration initiated by us, using the Token A the party issued and
    /// its versions url.
    pub async fn register_with(&self, scope: &PartyScope) -> Result<(), HandshakeError> {
        let _guard = self.registry.lock_party(scope).await;
        let party = self.party(scope)?;
        if party.is_registered() {
            return Err(HandshakeError::AlreadyRegistered);
        }
        let (Some(versions_url), Some(token_a)) = (party.versions_url.clone(), party.remote_token.clone())
        else {
            return Err(HandshakeError::MissingBootstrap);
        };

        self.begin(scope)?;
        let result = self.initiate(scope, &versions_url, &token_a).await;
        self.finish(scope, RegistrationState::Unregistered, result)
    }

    async fn initiate(
        &self,
        scope: &PartyScope,
        versions_url: &str,
        token_a: &str,
    ) -> Result<(), HandshakeError> {
        let negotiated = self.negotiate(versions_url, token_a).await?;
        let credentials_url = negotiated
            .endpoints
            .iter()
            .find(|e| e.identifier == ModuleId::Credentials)
            .map(|e| e.url.clone())
            .ok_or(HandshakeError::MissingEndpoint(ModuleId::Credentials))?;

        // The party may call back with token B before answering the POST, so
        // it is accepted next to Token A until the exchange succeeds.
        let token_b = generate_token();
        self.registry
            .add_token(scope, token_b.clone(), TokenScope::Full)?;
        let theirs = match self.post_credentials(&credentials_url, token_a, &token_b).await {
            Ok(theirs) => theirs,
            Err(e) => {
                self.registry.remove_token(scope, &token_b)?;
                return Err(e);
            }
        };
        self.registry
            .replace_tokens(scope, token_b, TokenScope::Full)?;

        self.registry.update(scope, |party| {
            party.remote_token = Some(theirs.token);
            party.roles = theirs.roles;
            party.versions_url = Some(negotiated.versions_url);
            party.version = Some(negotiated.version);
            party.endpoints = negotiated.endpoints;
        })?;
        Ok(())
    }

    async fn post_credentials(
        &self,
        url: &str,
        token_a: &str,
        token_b: &str,
    ) -> Result<Credentials, HandshakeError> {
        let theirs = self
            .client
            .post_credentials(url, token_a, &self.identity.credentials(token_b))
            .await?;
        theirs
            .validate()
            .map_err(|e| HandshakeError::InvalidCredentials(e.to_string()))?;
        Ok(theirs)
    }

    /// Validate the party's credentials, discover its API and issue our
    /// token for it.
    async fn accept(
        &self,
        scope: &PartyScope,
        credentials: &Credentials,
    ) -> Result<Credentials, HandshakeError> {
        credentials
            .validate()
            .map_err(|e| HandshakeError::InvalidCredentials(e.to_string()))?;
        let negotiated = self.negotiate(&credentials.url, &credentials.token).await?;

        let token_c = generate_token();
        self.registry
            .replace_tokens(scope, token_c.clone(), TokenScope::Full)?;
        self.registry.update(scope, |party| {
            party.remote_token = Some(credentials.token.clone());
            party.roles = credentials.roles.clone();
            party.versions_url = Some(negotiated.versions_url);
            party.version = Some(negotiated.version);
            party.endpoints = negotiated.endpoints;
        })?;
        Ok(self.identity.credentials(&token_c))
    }

    async fn negotiate(&self, versions_url: &str, token: &str) -> Result<Negotiated, HandshakeError> {
        let versions = self.client.get_versions(versions_url, token).await?;
        let version = select_mutual_version(&versions).ok_or(HandshakeError::NoMutualVersion)?;
        let details = self.client.get_version_details(&version.url, token).await?;
        if details.version != OCPI_VERSION {
            return Err(HandshakeError::NoMutualVersion);
        }
        if details
            .endpoint(ModuleId::Credentials, InterfaceRole::Receiver)
            .or_else(|| details.endpoint(ModuleId::Credentials, InterfaceRole::Sender))
            .is_none()
        {
            return Err(HandshakeError::MissingEndpoint(ModuleId::Credentials));
        }
        Ok(Negotiated {
            versions_url: versions_url.to_string(),
            version: version.version.clone(),
            endpoints: details.endpoints,
        })
    }

    fn party(&self, scope: &PartyScope) -> Result<RemoteParty, HandshakeError> {
        self.registry
            .get(scope)
            .ok_or_else(|| RegistryError::UnknownParty(scope.clone()).into())
    }

    fn begin(&self, scope: &PartyScope) -> Result<(), HandshakeError> {
        self.registry
            .set_registration(scope, RegistrationState::PendingCredentialsExchange)?;
        Ok(())
    }

    /// Settle the exchange: `Registered` on success, `fallback` otherwise.
    fn finish<T>(
        &self,
        scope: &PartyScope,
        fallback: RegistrationState,
        result: Result<T, HandshakeError>,
    ) -> Result<T, HandshakeError> {
        match &result {
            Ok(_) => {
                self.registry
                    .set_registration(scope, RegistrationState::Registered)?;
                info!(party = %scope, "Credentials exchanged, party registered");
            }
            Err(e) if fallback == RegistrationState::Registered => {
                warn!(party = %scope, error = %e, "Credentials update failed, registration kept");
                self.registry
                    .update(scope, |party| party.registration = fallback)?;
            }
            Err(e) => {
                warn!(party = %scope, error = %e, "Credentials exchange failed");
                self.registry.set_registration(scope, fallback)?;
            }
        }
        result
    }
}

pub type SharedCredentialsService = Arc<CredentialsService>;
