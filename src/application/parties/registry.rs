//! Remote Party Registry
//!
//! Authoritative set of roaming partners. Inbound requests are authorized
//! through a token index (`token -> party`) so the hot path is a single hash
//! lookup. Changes to one party are serialized through a per-party
//! operation lock; parties never block each other.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

use crate::application::events::{Event, PartyChange, PartyChangedEvent, SharedEventBus};
use crate::domain::network::InclusionFilter;
use crate::domain::ocpi::PartyScope;
use crate::domain::party::{
    AccessStatus, AccessToken, PartyStatus, RegistrationState, RemoteParty, TokenScope,
};

const TOKEN_LENGTH: usize = 48;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("party {0} is already registered")]
    AlreadyExists(PartyScope),
    #[error("unknown party {0}")]
    UnknownParty(PartyScope),
    #[error("token is already assigned to another party")]
    TokenInUse,
}

/// Why an inbound request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing authorization token")]
    Missing,
    #[error("unknown authorization token")]
    UnknownToken,
    #[error("party is disabled")]
    Disabled,
    #[error("party is blocked")]
    Blocked,
    #[error("token is not valid for this module")]
    OutOfScope,
}

impl AuthError {
    /// Maps to HTTP 401 rather than 403.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, Self::Missing | Self::UnknownToken)
    }
}

/// Snapshot of the party behind an accepted token.
#[derive(Debug, Clone)]
pub struct AuthorizedParty {
    pub party: RemoteParty,
    pub token: String,
    pub scope: TokenScope,
}

impl AuthorizedParty {
    pub fn key(&self) -> &PartyScope {
        &self.party.scope
    }
}

pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

#[derive(Debug, Clone)]
struct TokenEntry {
    party: PartyScope,
    scope: TokenScope,
}

pub struct PartyRegistry {
    parties: DashMap<PartyScope, RemoteParty>,
    tokens: DashMap<String, TokenEntry>,
    op_locks: DashMap<PartyScope, Arc<Mutex<()>>>,
    violation_threshold: u32,
    bus: SharedEventBus,
}

impl PartyRegistry {
    pub fn new(bus: SharedEventBus, violation_threshold: u32) -> Self {
        Self {
            parties: DashMap::new(),
            tokens: DashMap::new(),
            op_locks: DashMap::new(),
            violation_threshold: violation_threshold.max(1),
            bus,
        }
    }

    fn publish(&self, party: &PartyScope, change: PartyChange) {
        self.bus.publish(Event::PartyChanged(PartyChangedEvent {
            party: party.clone(),
            change,
        }));
    }

    /// Exclusive access to one party for multi-step operations (handshake,
    /// rotation). Other parties are unaffected.
    pub async fn lock_party(&self, scope: &PartyScope) -> OwnedMutexGuard<()> {
        let lock = self
            .op_locks
            .entry(scope.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    // ── Administration ─────────────────────────────────────────

    /// Bind `token` to `party` unless another party already holds it. The
    /// check and the insert happen under one map entry lock.
    fn claim_token(&self, token: &str, party: &PartyScope, scope: TokenScope) -> bool {
        match self.tokens.entry(token.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(TokenEntry {
                    party: party.clone(),
                    scope,
                });
                true
            }
            Entry::Occupied(mut slot) if &slot.get().party == party => {
                slot.get_mut().scope = scope;
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// Add a party together with its initial inbound tokens.
    pub fn add_party(&self, party: RemoteParty) -> Result<(), RegistryError> {
        let scope = party.scope.clone();
        let Entry::Vacant(slot) = self.parties.entry(scope.clone()) else {
            return Err(RegistryError::AlreadyExists(scope));
        };

        for (index, token) in party.local_tokens.iter().enumerate() {
            if !self.claim_token(&token.value, &scope, token.scope) {
                for claimed in &party.local_tokens[..index] {
                    self.tokens.remove(&claimed.value);
                }
                return Err(RegistryError::TokenInUse);
            }
        }

        info!(party = %scope, role = %party.role, "Remote party added");
        slot.insert(party);
        self.publish(&scope, PartyChange::Added);
        Ok(())
    }

    pub fn remove_party(&self, scope: &PartyScope) -> Result<RemoteParty, RegistryError> {
        let (_, party) = self
            .parties
            .remove(scope)
            .ok_or_else(|| RegistryError::UnknownParty(scope.clone()))?;
        for token in &party.local_tokens {
            self.tokens.remove(&token.value);
        }
        self.op_locks.remove(scope);
        info!(party = %scope, "Remote party removed");
        self.publish(scope, PartyChange::Removed);
        Ok(party)
    }

    pub fn get(&self, scope: &PartyScope) -> Option<RemoteParty> {
        self.parties.get(scope).map(|p| p.clone())
    }

    /// Every party, ordered by scope.
    pub fn parties(&self) -> Vec<RemoteParty> {
        let mut parties: Vec<RemoteParty> = self.parties.iter().map(|p| p.clone()).collect();
        parties.sort_by(|a, b| a.scope.cmp(&b.scope));
        parties
    }

    /// Parties that receive pushed Location updates.
    pub fn push_targets(&self) -> Vec<RemoteParty> {
        self.parties()
            .into_iter()
            .filter(RemoteParty::receives_push)
            .collect()
    }

    /// Replace every inbound token of the party with a fresh one. The new
    /// token keeps the party's current scope: Token A before registration,
    /// a full token afterwards.
    pub fn rotate_token(&self, scope: &PartyScope) -> Result<String, RegistryError> {
        let token_scope = {
            let party = self
                .parties
                .get(scope)
                .ok_or_else(|| RegistryError::UnknownParty(scope.clone()))?;
            if party.is_registered() {
                TokenScope::Full
            } else {
                TokenScope::Registration
            }
        };
        let token = generate_token();
        self.replace_tokens(scope, token.clone(), token_scope)?;
        info!(party = %scope, scope = ?token_scope, "Token rotated");
        self.publish(scope, PartyChange::TokenRotated);
        Ok(token)
    }

    /// Swap the party's inbound tokens for `token`.
    pub fn replace_tokens(
        &self,
        scope: &PartyScope,
        token: String,
        token_scope: TokenScope,
    ) -> Result<(), RegistryError> {
        let mut party = self
            .parties
            .get_mut(scope)
            .ok_or_else(|| RegistryError::UnknownParty(scope.clone()))?;
        if !self.claim_token(&token, scope, token_scope) {
            return Err(RegistryError::TokenInUse);
        }
        for old in party.local_tokens.drain(..) {
            if old.value != token {
                self.tokens.remove(&old.value);
            }
        }
        party.local_tokens.push(AccessToken {
            value: token,
            scope: token_scope,
        });
        party.touch();
        Ok(())
    }

    /// Accept `token` next to the party's current tokens.
    pub fn add_token(
        &self,
        scope: &PartyScope,
        token: String,
        token_scope: TokenScope,
    ) -> Result<(), RegistryError> {
        let mut party = self
            .parties
            .get_mut(scope)
            .ok_or_else(|| RegistryError::UnknownParty(scope.clone()))?;
        if !self.claim_token(&token, scope, token_scope) {
            return Err(RegistryError::TokenInUse);
        }
        party.local_tokens.retain(|t| t.value != token);
        party.local_tokens.push(AccessToken {
            value: token,
            scope: token_scope,
        });
        party.touch();
        Ok(())
    }

    /// Stop accepting one token of the party.
    pub fn remove_token(&self, scope: &PartyScope, token: &str) -> Result<(), RegistryError> {
        let mut party = self
            .parties
            .get_mut(scope)
            .ok_or_else(|| RegistryError::UnknownParty(scope.clone()))?;
        party.local_tokens.retain(|t| t.value != token);
        self.tokens.remove_if(token, |_, entry| &entry.party == scope);
        party.touch();
        Ok(())
    }

    /// Remove every inbound token; the party can no longer call us.
    pub fn revoke_tokens(&self, scope: &PartyScope) -> Result<(), RegistryError> {
        let mut party = self
            .parties
            .get_mut(scope)
            .ok_or_else(|| RegistryError::UnknownParty(scope.clone()))?;
        for old in party.local_tokens.drain(..) {
            self.tokens.remove(&old.value);
        }
        party.touch();
        Ok(())
    }

    pub fn set_party_status(
        &self,
        scope: &PartyScope,
        status: PartyStatus,
    ) -> Result<(), RegistryError> {
        self.update(scope, |party| party.status = status)?;
        info!(party = %scope, ?status, "Party status changed");
        self.publish(scope, PartyChange::StatusChanged);
        Ok(())
    }

    /// Set the access axis. Re-allowing a party clears its violation count.
    pub fn set_access_status(
        &self,
        scope: &PartyScope,
        access: AccessStatus,
    ) -> Result<(), RegistryError> {
        self.update(scope, |party| {
            party.access = access;
            if access == AccessStatus::Allowed {
                party.violations = 0;
            }
        })?;
        info!(party = %scope, ?access, "Party access changed");
        self.publish(scope, PartyChange::AccessChanged);
        Ok(())
    }

    pub fn set_filter(
        &self,
        scope: &PartyScope,
        filter: InclusionFilter,
    ) -> Result<(), RegistryError> {
        let mut previous = InclusionFilter::allow_all();
        self.update(scope, |party| previous = std::mem::replace(&mut party.filter, filter))?;
        self.publish(scope, PartyChange::FilterChanged { previous });
        Ok(())
    }

    pub fn set_push(&self, scope: &PartyScope, push: bool) -> Result<(), RegistryError> {
        let mut enabled = false;
        self.update(scope, |party| {
            enabled = push && !party.push;
            party.push = push;
        })?;
        if enabled {
            self.publish(scope, PartyChange::PushEnabled);
        }
        Ok(())
    }

    /// Apply `change` to the stored party.
    pub fn update<F>(&self, scope: &PartyScope, change: F) -> Result<(), RegistryError>
    where
        F: FnOnce(&mut RemoteParty),
    {
        let mut party = self
            .parties
            .get_mut(scope)
            .ok_or_else(|| RegistryError::UnknownParty(scope.clone()))?;
        change(&mut party);
        party.touch();
        Ok(())
    }

    pub fn set_registration(
        &self,
        scope: &PartyScope,
        state: RegistrationState,
    ) -> Result<(), RegistryError> {
        self.update(scope, |party| party.registration = state)?;
        match state {
            RegistrationState::Registered => self.publish(scope, PartyChange::Registered),
            RegistrationState::Unregistered => self.publish(scope, PartyChange::Unregistered),
            RegistrationState::PendingCredentialsExchange => {}
        }
        Ok(())
    }

    /// Count a protocol violation; blocks the party once the threshold is
    /// reached. Returns the resulting access status.
    pub fn record_violation(&self, scope: &PartyScope, reason: &str) -> Option<AccessStatus> {
        let (violations, newly_blocked) = {
            let mut party = self.parties.get_mut(scope)?;
            party.violations += 1;
            let newly_blocked = party.access == AccessStatus::Allowed
                && party.violations >= self.violation_threshold;
            if newly_blocked {
                party.access = AccessStatus::Blocked;
                party.touch();
            }
            (party.violations, newly_blocked)
        };

        warn!(party = %scope, violations, reason, "Protocol violation");
        if newly_blocked {
            warn!(party = %scope, violations, "Party blocked after repeated violations");
            self.publish(scope, PartyChange::AccessChanged);
            return Some(AccessStatus::Blocked);
        }
        self.parties.get(scope).map(|p| p.access)
    }

    // ── Authorization ──────────────────────────────────────────

    /// Resolve an inbound token. Both status axes must be open.
    pub fn authorize(&self, token: &str) -> Result<AuthorizedParty, AuthError> {
        if token.is_empty() {
            return Err(AuthError::Missing);
        }
        let entry = self
            .tokens
            .get(token)
            .map(|e| e.clone())
            .ok_or(AuthError::UnknownToken)?;
        let party = self
            .parties
            .get(&entry.party)
            .map(|p| p.clone())
            .ok_or(AuthError::UnknownToken)?;

        if party.access == AccessStatus::Blocked {
            return Err(AuthError::Blocked);
        }
        if party.status == PartyStatus::Disabled {
            return Err(AuthError::Disabled);
        }
        Ok(AuthorizedParty {
            party,
            token: token.to_string(),
            scope: entry.scope,
        })
    }
}

pub type SharedPartyRegistry = Arc<PartyRegistry>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::EventBus;
    use crate::domain::network::DomainEvseId;
    use crate::domain::ocpi::Role;

    fn scope(pid: &str) -> PartyScope {
        PartyScope::parse("NL", pid).unwrap()
    }

    fn party(pid: &str, token: &str) -> RemoteParty {
        let mut party = RemoteParty::new(scope(pid), Role::Emsp, pid);
        party.local_tokens.push(AccessToken {
            value: token.to_string(),
            scope: TokenScope::Full,
        });
        party
    }

    fn registry(threshold: u32) -> PartyRegistry {
        PartyRegistry::new(Arc::new(EventBus::new()), threshold)
    }

    #[test]
    fn authorize_resolves_token_to_party() {
        let registry = registry(3);
        registry.add_party(party("EMS", "tok-1")).unwrap();

        let authorized = registry.authorize("tok-1").unwrap();
        assert_eq!(authorized.key(), &scope("EMS"));
        assert_eq!(authorized.scope, TokenScope::Full);
        assert_eq!(registry.authorize("nope").unwrap_err(), AuthError::UnknownToken);
        assert_eq!(registry.authorize("").unwrap_err(), AuthError::Missing);
    }

    #[test]
    fn tokens_are_unique_across_parties() {
        let registry = registry(3);
        registry.add_party(party("EMS", "tok-1")).unwrap();
        assert_eq!(
            registry.add_party(party("EMT", "tok-1")).unwrap_err(),
            RegistryError::TokenInUse
        );
        assert_eq!(
            registry.add_party(party("EMS", "tok-2")).unwrap_err(),
            RegistryError::AlreadyExists(scope("EMS"))
        );
    }

    #[test]
    fn status_axes_are_independent() {
        let registry = registry(3);
        registry.add_party(party("EMS", "tok-1")).unwrap();

        registry
            .set_party_status(&scope("EMS"), PartyStatus::Disabled)
            .unwrap();
        assert_eq!(registry.authorize("tok-1").unwrap_err(), AuthError::Disabled);

        registry
            .set_access_status(&scope("EMS"), AccessStatus::Blocked)
            .unwrap();
        registry
            .set_party_status(&scope("EMS"), PartyStatus::Enabled)
            .unwrap();
        assert_eq!(registry.authorize("tok-1").unwrap_err(), AuthError::Blocked);

        registry
            .set_access_status(&scope("EMS"), AccessStatus::Allowed)
            .unwrap();
        assert!(registry.authorize("tok-1").is_ok());
    }

    #[test]
    fn rotation_invalidates_the_old_token() {
        let registry = registry(3);
        registry.add_party(party("EMS", "tok-1")).unwrap();

        let fresh = registry.rotate_token(&scope("EMS")).unwrap();
        assert_eq!(fresh.len(), TOKEN_LENGTH);
        assert!(registry.authorize("tok-1").is_err());
        let authorized = registry.authorize(&fresh).unwrap();
        assert_eq!(authorized.scope, TokenScope::Registration);
    }

    #[test]
    fn repeated_violations_block_the_party() {
        let registry = registry(2);
        registry.add_party(party("EMS", "tok-1")).unwrap();

        assert_eq!(
            registry.record_violation(&scope("EMS"), "foreign scope"),
            Some(AccessStatus::Allowed)
        );
        assert_eq!(
            registry.record_violation(&scope("EMS"), "foreign scope"),
            Some(AccessStatus::Blocked)
        );
        assert_eq!(registry.authorize("tok-1").unwrap_err(), AuthError::Blocked);

        registry
            .set_access_status(&scope("EMS"), AccessStatus::Allowed)
            .unwrap();
        assert_eq!(registry.get(&scope("EMS")).unwrap().violations, 0);
    }

    #[test]
    fn rejected_party_leaves_no_tokens_behind() {
        let registry = registry(3);
        registry.add_party(party("EMS", "tok-1")).unwrap();

        let mut greedy = party("EMT", "tok-2");
        greedy.local_tokens.push(AccessToken {
            value: "tok-1".to_string(),
            scope: TokenScope::Full,
        });
        assert_eq!(registry.add_party(greedy).unwrap_err(), RegistryError::TokenInUse);
        assert_eq!(registry.authorize("tok-2").unwrap_err(), AuthError::UnknownToken);
        assert_eq!(registry.authorize("tok-1").unwrap().key(), &scope("EMS"));
    }

    #[test]
    fn concurrent_adds_never_share_a_token() {
        for _ in 0..200 {
            let registry = Arc::new(registry(3));
            let handles: Vec<_> = ["EMS", "EMT", "EMU", "EMV"]
                .into_iter()
                .map(|pid| {
                    let registry = registry.clone();
                    std::thread::spawn(move || registry.add_party(party(pid, "shared")).is_ok())
                })
                .collect();
            let added = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|ok| *ok)
                .count();
            assert_eq!(added, 1);
            let owner = registry.authorize("shared").unwrap().party.scope;
            assert_eq!(registry.get(&owner).unwrap().local_tokens.len(), 1);
        }
    }

    #[test]
    fn added_token_works_until_removed() {
        let registry = registry(3);
        registry.add_party(party("EMS", "tok-1")).unwrap();
        registry.add_party(party("EMT", "tok-9")).unwrap();

        registry
            .add_token(&scope("EMS"), "tok-2".to_string(), TokenScope::Full)
            .unwrap();
        assert!(registry.authorize("tok-1").is_ok());
        assert!(registry.authorize("tok-2").is_ok());
        assert_eq!(
            registry
                .add_token(&scope("EMS"), "tok-9".to_string(), TokenScope::Full)
                .unwrap_err(),
            RegistryError::TokenInUse
        );

        registry.remove_token(&scope("EMS"), "tok-2").unwrap();
        assert_eq!(registry.authorize("tok-2").unwrap_err(), AuthError::UnknownToken);
        assert!(registry.authorize("tok-1").is_ok());
        // Another party's token is never touched.
        registry.remove_token(&scope("EMS"), "tok-9").unwrap();
        assert!(registry.authorize("tok-9").is_ok());
    }

    #[test]
    fn filter_and_push_changes_are_published() {
        let bus = Arc::new(EventBus::new());
        let mut events = bus.subscribe();
        let registry = PartyRegistry::new(bus, 3);
        registry.add_party(party("EMS", "tok-1")).unwrap();

        let narrowed = InclusionFilter {
            exclude_evses: std::collections::BTreeSet::from([DomainEvseId::new("E2")]),
            ..Default::default()
        };
        registry.set_filter(&scope("EMS"), narrowed.clone()).unwrap();
        registry.set_filter(&scope("EMS"), InclusionFilter::allow_all()).unwrap();
        registry.set_push(&scope("EMS"), true).unwrap();
        registry.set_push(&scope("EMS"), true).unwrap();

        let changes: Vec<PartyChange> = std::iter::from_fn(|| events.try_recv())
            .filter_map(|message| match message.event {
                Event::PartyChanged(e) => Some(e.change),
                _ => None,
            })
            .collect();
        assert_eq!(
            changes,
            vec![
                PartyChange::Added,
                PartyChange::FilterChanged {
                    previous: InclusionFilter::allow_all()
                },
                PartyChange::FilterChanged { previous: narrowed },
                PartyChange::PushEnabled,
            ]
        );
    }

    #[test]
    fn removing_a_party_drops_its_tokens() {
        let registry = registry(3);
        registry.add_party(party("EMS", "tok-1")).unwrap();
        registry.remove_party(&scope("EMS")).unwrap();
        assert_eq!(registry.authorize("tok-1").unwrap_err(), AuthError::UnknownToken);
        assert!(registry.parties().is_empty());
    }
}
