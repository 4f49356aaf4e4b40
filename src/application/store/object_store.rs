//! OCPI object store
//!
//! In-memory authoritative registry of Locations, Tariffs, Sessions, CDRs
//! and Tokens keyed by `(country_code, party_id, id)`.
//!
//! A Location and its EVSE set form one consistency unit guarded by its own
//! `tokio::sync::Mutex`; there is no store-wide lock. Slot locks are taken
//! with a timeout so that a stuck writer surfaces as
//! [`StoreError::Contended`] instead of stalling the caller. Every effective
//! write publishes one [`ChangeNotification`]; a write that changes nothing
//! returns [`UpsertOutcome::Unchanged`] and publishes nothing.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

use super::changes::{content_eq, diff, ChangeNotification, FieldChange, ObjectKind, UpsertOutcome};
use crate::application::events::{Event, SharedEventBus};
use crate::domain::ocpi::{
    AuthorizationInfo, Cdr, CdrId, CdrToken, Connector, ConnectorId, Evse, EvseStatus, EvseUid,
    Location, LocationId, PartyScope, ScopedId, Session, SessionId, Tariff, TariffId, Token,
    TokenType, TokenUid,
};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(500);

/// What happens to a Location or EVSE whose network entity is deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    /// Keep the object, flagged `REMOVED` (and unpublished for Locations).
    #[default]
    SoftDelete,
    Purge,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("location {0} is locked by another writer")]
    Contended(String),
    #[error("unknown location {0}")]
    UnknownLocation(String),
    #[error("unknown EVSE {0}")]
    UnknownEvse(String),
    #[error("unknown connector {0}")]
    UnknownConnector(String),
    #[error("unknown {} {id}", .kind.as_str())]
    UnknownObject { kind: ObjectKind, id: String },
    #[error("{0} already exists and cannot be replaced")]
    Immutable(String),
    #[error("invalid patch: {0}")]
    InvalidPatch(String),
}

impl StoreError {
    /// Worth retrying: the same call may succeed once the lock is free.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Contended(_))
    }
}

pub type LocationKey = ScopedId<LocationId>;
type LocationSlot = Arc<Mutex<Option<Location>>>;

pub struct ObjectStore {
    locations: DashMap<LocationKey, LocationSlot>,
    tariffs: DashMap<ScopedId<TariffId>, Tariff>,
    sessions: DashMap<ScopedId<SessionId>, Session>,
    cdrs: DashMap<ScopedId<CdrId>, Cdr>,
    tokens: DashMap<ScopedId<TokenUid>, Token>,
    lock_timeout: Duration,
    bus: SharedEventBus,
}

impl ObjectStore {
    pub fn new(bus: SharedEventBus) -> Self {
        Self::with_lock_timeout(bus, DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(bus: SharedEventBus, lock_timeout: Duration) -> Self {
        Self {
            locations: DashMap::new(),
            tariffs: DashMap::new(),
            sessions: DashMap::new(),
            cdrs: DashMap::new(),
            tokens: DashMap::new(),
            lock_timeout,
            bus,
        }
    }

    fn notify(
        &self,
        kind: ObjectKind,
        owner: PartyScope,
        id: String,
        location_id: Option<LocationId>,
        changes: Vec<FieldChange>,
    ) {
        debug!(kind = kind.as_str(), %owner, %id, fields = changes.len(), "Object changed");
        self.bus.publish(Event::ObjectChanged(ChangeNotification {
            kind,
            owner,
            id,
            location_id,
            changes,
            timestamp: Utc::now(),
        }));
    }

    // ── Locations ──────────────────────────────────────────────

    fn slot(&self, key: &LocationKey) -> LocationSlot {
        self.locations
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    fn existing_slot(&self, key: &LocationKey) -> Option<LocationSlot> {
        self.locations.get(key).map(|slot| slot.clone())
    }

    async fn lock<'a>(
        &self,
        key: &LocationKey,
        slot: &'a Mutex<Option<Location>>,
    ) -> Result<MutexGuard<'a, Option<Location>>, StoreError> {
        tokio::time::timeout(self.lock_timeout, slot.lock())
            .await
            .map_err(|_| StoreError::Contended(key.to_string()))
    }

    /// Whether `slot` is still the one stored under `key`. A purge detaches
    /// the slot while writers may be waiting on its lock.
    fn is_attached(&self, key: &LocationKey, slot: &LocationSlot) -> bool {
        self.locations
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(&current, slot))
    }

    /// Insert or replace a whole Location (with its EVSEs).
    pub async fn upsert_location(&self, location: Location) -> Result<UpsertOutcome, StoreError> {
        let key = LocationKey::new(location.owner(), location.id.clone());
        loop {
            let slot = self.slot(&key);
            let mut guard = self.lock(&key, &slot).await?;
            if !self.is_attached(&key, &slot) {
                continue;
            }
            let (outcome, changes) = replace_location(&mut guard, location);
            drop(guard);
            self.notify_location(&key, changes);
            return Ok(outcome);
        }
    }

    fn notify_location(&self, key: &LocationKey, changes: Option<Vec<FieldChange>>) {
        if let Some(changes) = changes {
            self.notify(
                ObjectKind::Location,
                key.owner.clone(),
                key.id.to_string(),
                Some(key.id.clone()),
                changes,
            );
        }
    }

    /// Partial Location update (OCPI PATCH semantics: top-level fields replace).
    pub async fn patch_location(
        &self,
        key: &LocationKey,
        patch: &Value,
    ) -> Result<UpsertOutcome, StoreError> {
        let slot = self
            .existing_slot(key)
            .ok_or_else(|| StoreError::UnknownLocation(key.to_string()))?;
        let mut guard = self.lock(key, &slot).await?;
        let current = guard
            .as_ref()
            .ok_or_else(|| StoreError::UnknownLocation(key.to_string()))?;
        let mut patched: Location =
            apply_patch(current, patch, &["country_code", "party_id", "id"])?;
        if patch.get("last_updated").is_none() {
            patched.last_updated = Utc::now();
        }
        let (outcome, changes) = replace_location(&mut guard, patched);
        drop(guard);
        self.notify_location(key, changes);
        Ok(outcome)
    }

    /// Remove a Location according to `policy`.
    pub async fn remove_location(
        &self,
        key: &LocationKey,
        policy: RemovalPolicy,
    ) -> Result<UpsertOutcome, StoreError> {
        let slot = self
            .existing_slot(key)
            .ok_or_else(|| StoreError::UnknownLocation(key.to_string()))?;
        let mut guard = self.lock(key, &slot).await?;
        let current = guard
            .take()
            .ok_or_else(|| StoreError::UnknownLocation(key.to_string()))?;

        let (outcome, changes) = match policy {
            RemovalPolicy::Purge => {
                let old = to_json(&current);
                self.locations.remove(key);
                drop(guard);
                let changes = diff(&old, &Value::Object(Default::default()));
                (UpsertOutcome::Updated(changes.clone()), Some(changes))
            }
            RemovalPolicy::SoftDelete => {
                let mut removed = current.clone();
                *guard = Some(current);
                removed.publish = false;
                for evse in &mut removed.evses {
                    evse.status = EvseStatus::Removed;
                }
                removed.last_updated = Utc::now();
                let result = replace_location(&mut guard, removed);
                drop(guard);
                result
            }
        };
        self.notify_location(key, changes);
        Ok(outcome)
    }

    /// Insert or replace one EVSE of an existing Location.
    pub async fn upsert_evse(
        &self,
        key: &LocationKey,
        evse: Evse,
    ) -> Result<UpsertOutcome, StoreError> {
        self.with_location(key, |location| {
            let uid = evse.uid.clone();
            let old = location.evse(&uid).map(to_json);
            if let Some(old) = &old {
                if content_eq(old, &to_json(&evse)) {
                    return Ok(None);
                }
            }
            let stamp = evse.last_updated;
            let new = to_json(&evse);
            match location.evse_mut(&uid) {
                Some(slot) => *slot = evse,
                None => location.evses.push(evse),
            }
            location.last_updated = location.last_updated.max(stamp);
            let outcome = match old {
                Some(old) => UpsertOutcome::Updated(diff(&old, &new)),
                None => UpsertOutcome::Created,
            };
            Ok(Some((ObjectKind::Evse, uid.to_string(), outcome, new)))
        })
        .await
    }

    /// Partial EVSE update.
    pub async fn patch_evse(
        &self,
        key: &LocationKey,
        uid: &EvseUid,
        patch: &Value,
    ) -> Result<UpsertOutcome, StoreError> {
        let evse_key = format!("{key}/{uid}");
        self.with_location(key, |location| {
            let current = location
                .evse(uid)
                .ok_or_else(|| StoreError::UnknownEvse(evse_key.clone()))?;
            let mut patched: Evse = apply_patch(current, patch, &["uid"])?;
            if patch.get("last_updated").is_none() {
                patched.last_updated = Utc::now();
            }
            let old = to_json(current);
            let new = to_json(&patched);
            if content_eq(&old, &new) {
                return Ok(None);
            }
            location.last_updated = location.last_updated.max(patched.last_updated);
            if let Some(slot) = location.evse_mut(uid) {
                *slot = patched;
            }
            Ok(Some((
                ObjectKind::Evse,
                uid.to_string(),
                UpsertOutcome::Updated(diff(&old, &new)),
                new,
            )))
        })
        .await
    }

    /// Remove one EVSE according to `policy`.
    pub async fn remove_evse(
        &self,
        key: &LocationKey,
        uid: &EvseUid,
        policy: RemovalPolicy,
    ) -> Result<UpsertOutcome, StoreError> {
        let evse_key = format!("{key}/{uid}");
        self.with_location(key, |location| {
            let position = location
                .evses
                .iter()
                .position(|e| &e.uid == uid)
                .ok_or_else(|| StoreError::UnknownEvse(evse_key.clone()))?;
            let now = Utc::now();
            let old = to_json(&location.evses[position]);
            match policy {
                RemovalPolicy::Purge => {
                    location.evses.remove(position);
                }
                RemovalPolicy::SoftDelete => {
                    let evse = &mut location.evses[position];
                    if evse.status == EvseStatus::Removed {
                        return Ok(None);
                    }
                    evse.status = EvseStatus::Removed;
                    evse.last_updated = now;
                }
            }
            location.last_updated = now;
            let new = location
                .evse(uid)
                .map(to_json)
                .unwrap_or(Value::Object(Default::default()));
            Ok(Some((
                ObjectKind::Evse,
                uid.to_string(),
                UpsertOutcome::Updated(diff(&old, &new)),
                new,
            )))
        })
        .await
    }

    /// Insert or replace one Connector of an existing EVSE.
    pub async fn upsert_connector(
        &self,
        key: &LocationKey,
        uid: &EvseUid,
        connector: Connector,
    ) -> Result<UpsertOutcome, StoreError> {
        let evse_key = format!("{key}/{uid}");
        self.with_location(key, |location| {
            let evse = location
                .evse_mut(uid)
                .ok_or_else(|| StoreError::UnknownEvse(evse_key.clone()))?;
            let id = format!("{uid}/{}", connector.id);
            let stamp = connector.last_updated;
            let new = to_json(&connector);
            let old = evse.connector(&connector.id).map(to_json);
            if let Some(old) = &old {
                if content_eq(old, &new) {
                    return Ok(None);
                }
            }
            match evse.connectors.iter_mut().find(|c| c.id == connector.id) {
                Some(slot) => *slot = connector,
                None => evse.connectors.push(connector),
            }
            evse.last_updated = evse.last_updated.max(stamp);
            location.last_updated = location.last_updated.max(stamp);
            let outcome = match old {
                Some(old) => UpsertOutcome::Updated(diff(&old, &new)),
                None => UpsertOutcome::Created,
            };
            Ok(Some((ObjectKind::Connector, id, outcome, new)))
        })
        .await
    }

    /// Partial Connector update.
    pub async fn patch_connector(
        &self,
        key: &LocationKey,
        uid: &EvseUid,
        connector_id: &ConnectorId,
        patch: &Value,
    ) -> Result<UpsertOutcome, StoreError> {
        let current = self
            .try_get_evse(key, uid)
            .await?
            .ok_or_else(|| StoreError::UnknownEvse(format!("{key}/{uid}")))?
            .connector(connector_id)
            .cloned()
            .ok_or_else(|| StoreError::UnknownConnector(format!("{key}/{uid}/{connector_id}")))?;
        let mut patched: Connector = apply_patch(&current, patch, &["id"])?;
        if patch.get("last_updated").is_none() {
            patched.last_updated = Utc::now();
        }
        self.upsert_connector(key, uid, patched).await
    }

    /// Run `mutate` on an existing Location under its slot lock. The closure
    /// returns `None` for a no-op, otherwise the child kind/id, outcome and
    /// the child's new value.
    async fn with_location<F>(&self, key: &LocationKey, mutate: F) -> Result<UpsertOutcome, StoreError>
    where
        F: FnOnce(
            &mut Location,
        ) -> Result<Option<(ObjectKind, String, UpsertOutcome, Value)>, StoreError>,
    {
        let slot = self
            .existing_slot(key)
            .ok_or_else(|| StoreError::UnknownLocation(key.to_string()))?;
        let mut guard = self.lock(key, &slot).await?;
        let location = guard
            .as_mut()
            .ok_or_else(|| StoreError::UnknownLocation(key.to_string()))?;

        let Some((kind, child_id, outcome, new)) = mutate(location)? else {
            return Ok(UpsertOutcome::Unchanged);
        };
        location.normalize();
        location.refresh_hash();
        drop(guard);

        let changes = match &outcome {
            UpsertOutcome::Updated(changes) => changes.clone(),
            _ => diff(&Value::Object(Default::default()), &new),
        };
        self.notify(
            kind,
            key.owner.clone(),
            format!("{}/{child_id}", key.id),
            Some(key.id.clone()),
            changes,
        );
        Ok(outcome)
    }

    pub async fn get_location(&self, key: &LocationKey) -> Result<Option<Location>, StoreError> {
        let Some(slot) = self.existing_slot(key) else {
            return Ok(None);
        };
        let guard = self.lock(key, &slot).await?;
        Ok(guard.clone())
    }

    pub async fn try_get_evse(
        &self,
        key: &LocationKey,
        uid: &EvseUid,
    ) -> Result<Option<Evse>, StoreError> {
        Ok(self
            .get_location(key)
            .await?
            .and_then(|location| location.evse(uid).cloned()))
    }

    /// Every Location, ordered by owner and id.
    pub async fn locations(&self) -> Result<Vec<Location>, StoreError> {
        let mut slots: Vec<(LocationKey, LocationSlot)> = self
            .locations
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        slots.sort_by(|a, b| a.0.cmp(&b.0));

        let mut locations = Vec::with_capacity(slots.len());
        for (key, slot) in slots {
            if let Some(location) = self.lock(&key, &slot).await?.clone() {
                locations.push(location);
            }
        }
        Ok(locations)
    }

    /// Locations with a given id across all owners.
    pub async fn find_locations(&self, id: &LocationId) -> Result<Vec<Location>, StoreError> {
        let keys: Vec<LocationKey> = self
            .locations
            .iter()
            .filter(|entry| &entry.key().id == id)
            .map(|entry| entry.key().clone())
            .collect();
        let mut found = Vec::new();
        for key in keys {
            if let Some(location) = self.get_location(&key).await? {
                found.push(location);
            }
        }
        Ok(found)
    }

    // ── Tariffs ────────────────────────────────────────────────

    pub fn put_tariff(&self, tariff: Tariff) -> UpsertOutcome {
        let key = ScopedId::new(tariff.owner(), tariff.id.clone());
        self.put_object(&self.tariffs, ObjectKind::Tariff, key, tariff)
    }

    pub fn get_tariff(&self, key: &ScopedId<TariffId>) -> Option<Tariff> {
        self.tariffs.get(key).map(|t| t.clone())
    }

    pub fn tariffs(&self) -> Vec<Tariff> {
        sorted_values(&self.tariffs)
    }

    pub fn delete_tariff(&self, key: &ScopedId<TariffId>) -> Result<Tariff, StoreError> {
        let (_, tariff) = self.tariffs.remove(key).ok_or_else(|| StoreError::UnknownObject {
            kind: ObjectKind::Tariff,
            id: key.to_string(),
        })?;
        self.notify(
            ObjectKind::Tariff,
            key.owner.clone(),
            key.id.to_string(),
            None,
            diff(&to_json(&tariff), &Value::Object(Default::default())),
        );
        Ok(tariff)
    }

    // ── Sessions ───────────────────────────────────────────────

    pub fn put_session(&self, session: Session) -> UpsertOutcome {
        let key = ScopedId::new(session.owner(), session.id.clone());
        self.put_object(&self.sessions, ObjectKind::Session, key, session)
    }

    pub fn patch_session(
        &self,
        key: &ScopedId<SessionId>,
        patch: &Value,
    ) -> Result<UpsertOutcome, StoreError> {
        self.patch_object(&self.sessions, ObjectKind::Session, key, patch, &["country_code", "party_id", "id"])
    }

    pub fn get_session(&self, key: &ScopedId<SessionId>) -> Option<Session> {
        self.sessions.get(key).map(|s| s.clone())
    }

    /// First session with a given id, whatever its owner.
    pub fn find_session(&self, id: &SessionId) -> Option<Session> {
        self.sessions
            .iter()
            .find(|entry| &entry.key().id == id)
            .map(|entry| entry.value().clone())
    }

    pub fn sessions(&self) -> Vec<Session> {
        sorted_values(&self.sessions)
    }

    // ── CDRs ───────────────────────────────────────────────────

    /// Store a CDR. CDRs are immutable: a second POST with the same id fails.
    pub fn post_cdr(&self, cdr: Cdr) -> Result<UpsertOutcome, StoreError> {
        let key = ScopedId::new(cdr.owner(), cdr.id.clone());
        let new = to_json(&cdr);
        match self.cdrs.entry(key.clone()) {
            Entry::Occupied(_) => return Err(StoreError::Immutable(key.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(cdr);
            }
        }
        self.notify(
            ObjectKind::Cdr,
            key.owner.clone(),
            key.id.to_string(),
            None,
            diff(&Value::Object(Default::default()), &new),
        );
        Ok(UpsertOutcome::Created)
    }

    pub fn get_cdr(&self, key: &ScopedId<CdrId>) -> Option<Cdr> {
        self.cdrs.get(key).map(|c| c.clone())
    }

    pub fn cdrs(&self) -> Vec<Cdr> {
        sorted_values(&self.cdrs)
    }

    // ── Tokens ─────────────────────────────────────────────────

    pub fn put_token(&self, token: Token) -> UpsertOutcome {
        let key = ScopedId::new(token.owner(), token.uid.clone());
        self.put_object(&self.tokens, ObjectKind::Token, key, token)
    }

    pub fn patch_token(
        &self,
        key: &ScopedId<TokenUid>,
        patch: &Value,
    ) -> Result<UpsertOutcome, StoreError> {
        self.patch_object(&self.tokens, ObjectKind::Token, key, patch, &["country_code", "party_id", "uid"])
    }

    pub fn get_token(&self, key: &ScopedId<TokenUid>) -> Option<Token> {
        self.tokens.get(key).map(|t| t.clone())
    }

    pub fn tokens(&self) -> Vec<Token> {
        sorted_values(&self.tokens)
    }

    /// Real-time authorization of a stored token. `None` when the token is
    /// unknown.
    pub fn authorize_token(
        &self,
        uid: &TokenUid,
        token_type: Option<TokenType>,
    ) -> Option<AuthorizationInfo> {
        let token = self
            .tokens
            .iter()
            .find(|entry| {
                &entry.key().id == uid && token_type.map_or(true, |t| entry.value().token_type == t)
            })
            .map(|entry| entry.value().clone())?;
        Some(AuthorizationInfo {
            allowed: token.authorization(),
            token: CdrToken::from(&token),
            authorization_reference: Some(Uuid::new_v4().simple().to_string()),
        })
    }

    // ── Generic helpers ────────────────────────────────────────

    fn put_object<I, T>(
        &self,
        map: &DashMap<ScopedId<I>, T>,
        kind: ObjectKind,
        key: ScopedId<I>,
        value: T,
    ) -> UpsertOutcome
    where
        I: Clone + Eq + Hash + std::fmt::Display,
        T: Serialize,
    {
        let new = to_json(&value);
        let (outcome, changes) = match map.entry(key.clone()) {
            Entry::Occupied(mut slot) => {
                let old = to_json(slot.get());
                if content_eq(&old, &new) {
                    return UpsertOutcome::Unchanged;
                }
                slot.insert(value);
                let changes = diff(&old, &new);
                (UpsertOutcome::Updated(changes.clone()), changes)
            }
            Entry::Vacant(slot) => {
                slot.insert(value);
                (
                    UpsertOutcome::Created,
                    diff(&Value::Object(Default::default()), &new),
                )
            }
        };
        self.notify(kind, key.owner.clone(), key.id.to_string(), None, changes);
        outcome
    }

    fn patch_object<I, T>(
        &self,
        map: &DashMap<ScopedId<I>, T>,
        kind: ObjectKind,
        key: &ScopedId<I>,
        patch: &Value,
        identity: &[&str],
    ) -> Result<UpsertOutcome, StoreError>
    where
        I: Clone + Eq + Hash + std::fmt::Display,
        T: Serialize + DeserializeOwned,
    {
        let changes = {
            let mut slot = map.get_mut(key).ok_or_else(|| StoreError::UnknownObject {
                kind,
                id: key.to_string(),
            })?;
            let old = to_json(slot.value());
            let patched: T = apply_patch(slot.value(), patch, identity)?;
            let new = to_json(&patched);
            if content_eq(&old, &new) {
                return Ok(UpsertOutcome::Unchanged);
            }
            *slot = patched;
            diff(&old, &new)
        };
        self.notify(kind, key.owner.clone(), key.id.to_string(), None, changes.clone());
        Ok(UpsertOutcome::Updated(changes))
    }
}

pub type SharedObjectStore = Arc<ObjectStore>;

fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn sorted_values<I, T>(map: &DashMap<ScopedId<I>, T>) -> Vec<T>
where
    I: Clone + Eq + Hash + Ord,
    T: Clone,
{
    let mut entries: Vec<(ScopedId<I>, T)> = map
        .iter()
        .map(|entry| (entry.key().clone(), entry.value().clone()))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries.into_iter().map(|(_, value)| value).collect()
}

/// Merge the top-level fields of `patch` into `current`. Identity fields may
/// be repeated in the patch but not changed.
fn apply_patch<T>(current: &T, patch: &Value, identity: &[&str]) -> Result<T, StoreError>
where
    T: Serialize + DeserializeOwned,
{
    let Value::Object(fields) = patch else {
        return Err(StoreError::InvalidPatch("patch must be a JSON object".to_string()));
    };
    let mut merged = to_json(current);
    let Value::Object(target) = &mut merged else {
        return Err(StoreError::InvalidPatch("stored object is not an object".to_string()));
    };
    for (field, value) in fields {
        if identity.contains(&field.as_str()) && target.get(field) != Some(value) {
            return Err(StoreError::InvalidPatch(format!("{field} cannot be changed")));
        }
        target.insert(field.clone(), value.clone());
    }
    serde_json::from_value(merged).map_err(|e| StoreError::InvalidPatch(e.to_string()))
}

/// Replace the slot content. Unchanged EVSEs keep their stored timestamps.
/// Returns the outcome and the changes to notify (none for a no-op).
fn replace_location(
    slot: &mut Option<Location>,
    mut incoming: Location,
) -> (UpsertOutcome, Option<Vec<FieldChange>>) {
    incoming.normalize();
    let Some(current) = slot.as_ref() else {
        incoming.refresh_hash();
        let changes = diff(&Value::Object(Default::default()), &to_json(&incoming));
        *slot = Some(incoming);
        return (UpsertOutcome::Created, Some(changes));
    };

    let changes = diff(&to_json(current), &to_json(&incoming));
    if changes.is_empty() {
        return (UpsertOutcome::Unchanged, None);
    }
    for evse in &mut incoming.evses {
        if let Some(previous) = current.evse(&evse.uid) {
            if content_eq(&to_json(previous), &to_json(&*evse)) {
                *evse = previous.clone();
            }
        }
    }
    incoming.refresh_hash();
    *slot = Some(incoming);
    (UpsertOutcome::Updated(changes.clone()), Some(changes))
}
