pub mod network;
pub mod ocpi;
pub mod party;

pub use party::{AccessStatus, PartyStatus, RegistrationState, RemoteParty, TokenScope};
