//! Remote Party Registry and the credentials handshake

pub mod handshake;
pub mod identity;
pub mod registry;

pub use handshake::{CredentialsService, HandshakeError, SharedCredentialsService};
pub use identity::{LocalIdentity, OCPI_VERSION};
pub use registry::{
    generate_token, AuthError, AuthorizedParty, PartyRegistry, RegistryError, SharedPartyRegistry,
};
