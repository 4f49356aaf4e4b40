//! In-memory roaming network
//!
//! Owns the pool/station/EVSE records and publishes a [`NetworkEvent`] for
//! every lifecycle, property and status change. Events for one entity are
//! emitted while its map entry is held, so per-entity order is causal.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use super::events::{EntityRef, NetworkChange, NetworkEvent};
use super::model::{
    ChargingPool, ChargingStation, DomainEvse, DomainEvseId, DomainEvseStatus, PoolId, StationId,
};

const DEFAULT_CAPACITY: usize = 4096;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NetworkError {
    #[error("unknown pool {0}")]
    UnknownPool(PoolId),
    #[error("unknown station {0}")]
    UnknownStation(StationId),
    #[error("unknown EVSE {0}")]
    UnknownEvse(DomainEvseId),
    #[error("{0} already exists")]
    Duplicate(String),
}

/// Read access to the current network state.
pub trait NetworkView: Send + Sync {
    fn pool(&self, id: &PoolId) -> Option<ChargingPool>;
    fn pools(&self) -> Vec<ChargingPool>;
    fn station(&self, id: &StationId) -> Option<ChargingStation>;
    fn evse(&self, id: &DomainEvseId) -> Option<DomainEvse>;
    fn stations_of(&self, pool: &PoolId) -> Vec<ChargingStation>;
    fn evses_of_station(&self, station: &StationId) -> Vec<DomainEvse>;

    /// All EVSEs below a pool, through every station.
    fn evses_of_pool(&self, pool: &PoolId) -> Vec<DomainEvse> {
        self.stations_of(pool)
            .iter()
            .flat_map(|station| self.evses_of_station(&station.id))
            .collect()
    }

    fn pool_of_station(&self, station: &StationId) -> Option<PoolId> {
        self.station(station).map(|s| s.pool)
    }

    fn pool_of_evse(&self, evse: &DomainEvseId) -> Option<PoolId> {
        self.evse(evse)
            .and_then(|e| self.pool_of_station(&e.station))
    }
}

pub struct RoamingNetwork {
    pools: DashMap<PoolId, ChargingPool>,
    stations: DashMap<StationId, ChargingStation>,
    evses: DashMap<DomainEvseId, DomainEvse>,
    sender: broadcast::Sender<NetworkEvent>,
}

impl RoamingNetwork {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            pools: DashMap::new(),
            stations: DashMap::new(),
            evses: DashMap::new(),
            sender,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NetworkEvent> {
        self.sender.subscribe()
    }

    fn emit(&self, event: NetworkEvent) {
        debug!(entity = %event.entity, event_type = event.event_type(), "Network event");
        // No subscribers is fine: the network does not depend on its consumers.
        let _ = self.sender.send(event);
    }

    pub fn add_pool(&self, pool: ChargingPool) -> Result<(), NetworkError> {
        let id = pool.id.clone();
        match self.pools.entry(id.clone()) {
            Entry::Occupied(_) => Err(NetworkError::Duplicate(format!("pool {id}"))),
            Entry::Vacant(slot) => {
                slot.insert(pool);
                self.emit(NetworkEvent::created(EntityRef::Pool(id)));
                Ok(())
            }
        }
    }

    pub fn add_station(&self, station: ChargingStation) -> Result<(), NetworkError> {
        if !self.pools.contains_key(&station.pool) {
            return Err(NetworkError::UnknownPool(station.pool));
        }
        let id = station.id.clone();
        match self.stations.entry(id.clone()) {
            Entry::Occupied(_) => Err(NetworkError::Duplicate(format!("station {id}"))),
            Entry::Vacant(slot) => {
                slot.insert(station);
                self.emit(NetworkEvent::created(EntityRef::Station(id)));
                Ok(())
            }
        }
    }

    pub fn add_evse(&self, evse: DomainEvse) -> Result<(), NetworkError> {
        if !self.stations.contains_key(&evse.station) {
            return Err(NetworkError::UnknownStation(evse.station));
        }
        let id = evse.id.clone();
        match self.evses.entry(id.clone()) {
            Entry::Occupied(_) => Err(NetworkError::Duplicate(format!("EVSE {id}"))),
            Entry::Vacant(slot) => {
                slot.insert(evse);
                self.emit(NetworkEvent::created(EntityRef::Evse(id)));
                Ok(())
            }
        }
    }

    /// Mutate a pool; one `PropertyChanged` event per changed field.
    pub fn update_pool(
        &self,
        id: &PoolId,
        actor: Option<&str>,
        update: impl FnOnce(&mut ChargingPool),
    ) -> Result<(), NetworkError> {
        let mut entry = self
            .pools
            .get_mut(id)
            .ok_or_else(|| NetworkError::UnknownPool(id.clone()))?;
        let before = to_fields(&*entry);
        update(entry.value_mut());
        let after = to_fields(&*entry);
        for (property, old, new) in changed_fields(&before, &after) {
            self.emit(NetworkEvent::new(
                EntityRef::Pool(id.clone()),
                NetworkChange::PropertyChanged { property, old, new },
                actor.map(String::from),
            ));
        }
        Ok(())
    }

    /// Mutate a station. Changing `pool` re-parents it (and its EVSEs).
    pub fn update_station(
        &self,
        id: &StationId,
        actor: Option<&str>,
        update: impl FnOnce(&mut ChargingStation),
    ) -> Result<(), NetworkError> {
        let mut entry = self
            .stations
            .get_mut(id)
            .ok_or_else(|| NetworkError::UnknownStation(id.clone()))?;
        let mut candidate = entry.clone();
        update(&mut candidate);
        if candidate.pool != entry.pool && !self.pools.contains_key(&candidate.pool) {
            return Err(NetworkError::UnknownPool(candidate.pool));
        }
        let before = to_fields(&*entry);
        *entry = candidate;
        let after = to_fields(&*entry);
        for (property, old, new) in changed_fields(&before, &after) {
            self.emit(NetworkEvent::new(
                EntityRef::Station(id.clone()),
                NetworkChange::PropertyChanged { property, old, new },
                actor.map(String::from),
            ));
        }
        Ok(())
    }

    /// Mutate an EVSE. A status change is reported as `StatusChanged`.
    pub fn update_evse(
        &self,
        id: &DomainEvseId,
        actor: Option<&str>,
        update: impl FnOnce(&mut DomainEvse),
    ) -> Result<(), NetworkError> {
        let mut entry = self
            .evses
            .get_mut(id)
            .ok_or_else(|| NetworkError::UnknownEvse(id.clone()))?;
        let old_status = entry.status.clone();
        let mut candidate = entry.clone();
        update(&mut candidate);
        if candidate.station != entry.station && !self.stations.contains_key(&candidate.station) {
            return Err(NetworkError::UnknownStation(candidate.station));
        }
        let before = to_fields(&*entry);
        *entry = candidate;
        let after = to_fields(&*entry);
        for (property, old, new) in changed_fields(&before, &after) {
            let change = if property == "status" {
                NetworkChange::StatusChanged {
                    old: old_status.clone(),
                    new: entry.status.clone(),
                }
            } else {
                NetworkChange::PropertyChanged { property, old, new }
            };
            self.emit(NetworkEvent::new(
                EntityRef::Evse(id.clone()),
                change,
                actor.map(String::from),
            ));
        }
        Ok(())
    }

    pub fn set_evse_status(
        &self,
        id: &DomainEvseId,
        status: DomainEvseStatus,
    ) -> Result<(), NetworkError> {
        self.update_evse(id, None, |evse| evse.status = status)
    }

    pub fn remove_evse(&self, id: &DomainEvseId) -> Result<DomainEvse, NetworkError> {
        let (_, evse) = self
            .evses
            .remove(id)
            .ok_or_else(|| NetworkError::UnknownEvse(id.clone()))?;
        self.emit(NetworkEvent::removed(EntityRef::Evse(id.clone())));
        Ok(evse)
    }

    /// Removes the station together with its EVSEs.
    pub fn remove_station(&self, id: &StationId) -> Result<ChargingStation, NetworkError> {
        if !self.stations.contains_key(id) {
            return Err(NetworkError::UnknownStation(id.clone()));
        }
        for evse in self.evses_of_station(id) {
            // A concurrent removal may already have taken it.
            let _ = self.remove_evse(&evse.id);
        }
        let (_, station) = self
            .stations
            .remove(id)
            .ok_or_else(|| NetworkError::UnknownStation(id.clone()))?;
        self.emit(NetworkEvent::removed(EntityRef::Station(id.clone())));
        Ok(station)
    }

    /// Removes the pool together with its stations and EVSEs.
    pub fn remove_pool(&self, id: &PoolId) -> Result<ChargingPool, NetworkError> {
        if !self.pools.contains_key(id) {
            return Err(NetworkError::UnknownPool(id.clone()));
        }
        for station in self.stations_of(id) {
            let _ = self.remove_station(&station.id);
        }
        let (_, pool) = self
            .pools
            .remove(id)
            .ok_or_else(|| NetworkError::UnknownPool(id.clone()))?;
        self.emit(NetworkEvent::removed(EntityRef::Pool(id.clone())));
        Ok(pool)
    }
}

impl Default for RoamingNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkView for RoamingNetwork {
    fn pool(&self, id: &PoolId) -> Option<ChargingPool> {
        self.pools.get(id).map(|p| p.clone())
    }

    fn pools(&self) -> Vec<ChargingPool> {
        let mut pools: Vec<_> = self.pools.iter().map(|p| p.clone()).collect();
        pools.sort_by(|a, b| a.id.cmp(&b.id));
        pools
    }

    fn station(&self, id: &StationId) -> Option<ChargingStation> {
        self.stations.get(id).map(|s| s.clone())
    }

    fn evse(&self, id: &DomainEvseId) -> Option<DomainEvse> {
        self.evses.get(id).map(|e| e.clone())
    }

    fn stations_of(&self, pool: &PoolId) -> Vec<ChargingStation> {
        let mut stations: Vec<_> = self
            .stations
            .iter()
            .filter(|s| &s.pool == pool)
            .map(|s| s.clone())
            .collect();
        stations.sort_by(|a, b| a.id.cmp(&b.id));
        stations
    }

    fn evses_of_station(&self, station: &StationId) -> Vec<DomainEvse> {
        let mut evses: Vec<_> = self
            .evses
            .iter()
            .filter(|e| &e.station == station)
            .map(|e| e.clone())
            .collect();
        evses.sort_by(|a, b| a.id.cmp(&b.id));
        evses
    }
}

pub type SharedRoamingNetwork = Arc<RoamingNetwork>;
pub type SharedNetworkView = Arc<dyn NetworkView>;

fn to_fields<T: Serialize>(value: &T) -> serde_json::Map<String, Value> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    }
}

fn changed_fields(
    before: &serde_json::Map<String, Value>,
    after: &serde_json::Map<String, Value>,
) -> Vec<(String, Value, Value)> {
    after
        .iter()
        .filter_map(|(key, new)| {
            let old = before.get(key).cloned().unwrap_or(Value::Null);
            (&old != new).then(|| (key.clone(), old, new.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::model::fixtures::*;
    use super::*;

    fn drain(rx: &mut broadcast::Receiver<NetworkEvent>) -> Vec<NetworkEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn building_a_pool_emits_created_events_in_order() {
        let network = RoamingNetwork::new();
        let mut rx = network.subscribe();
        network.add_pool(pool("P1")).unwrap();
        network.add_station(station("S1", "P1")).unwrap();
        network.add_evse(evse("E1", "S1")).unwrap();

        let entities: Vec<_> = drain(&mut rx).into_iter().map(|e| e.entity).collect();
        assert_eq!(
            entities,
            vec![
                EntityRef::Pool("P1".into()),
                EntityRef::Station("S1".into()),
                EntityRef::Evse("E1".into()),
            ]
        );
        assert_eq!(network.pool_of_evse(&"E1".into()), Some("P1".into()));
    }

    #[test]
    fn orphans_are_rejected() {
        let network = RoamingNetwork::new();
        assert_eq!(
            network.add_station(station("S1", "P9")),
            Err(NetworkError::UnknownPool("P9".into()))
        );
        assert_eq!(
            network.add_evse(evse("E1", "S9")),
            Err(NetworkError::UnknownStation("S9".into()))
        );
    }

    #[test]
    fn property_updates_emit_one_event_per_changed_field() {
        let network = RoamingNetwork::new();
        network.add_pool(pool("P1")).unwrap();
        let mut rx = network.subscribe();

        network
            .update_pool(&"P1".into(), Some("admin"), |p| {
                p.name = Some("Renamed".to_string());
                p.time_zone = "Europe/Amsterdam".to_string();
            })
            .unwrap();
        network.update_pool(&"P1".into(), None, |_| {}).unwrap();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        let properties: Vec<_> = events
            .iter()
            .map(|e| match &e.change {
                NetworkChange::PropertyChanged { property, .. } => property.as_str(),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert!(properties.contains(&"name"));
        assert!(properties.contains(&"time_zone"));
        assert_eq!(events[0].actor.as_deref(), Some("admin"));
    }

    #[test]
    fn status_update_emits_status_changed() {
        let network = RoamingNetwork::new();
        network.add_pool(pool("P1")).unwrap();
        network.add_station(station("S1", "P1")).unwrap();
        network.add_evse(evse("E1", "S1")).unwrap();
        let mut rx = network.subscribe();

        network
            .set_evse_status(&"E1".into(), DomainEvseStatus::Charging)
            .unwrap();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].change,
            NetworkChange::StatusChanged {
                old: DomainEvseStatus::Available,
                new: DomainEvseStatus::Charging,
            }
        );
    }

    #[test]
    fn removing_a_pool_cascades() {
        let network = RoamingNetwork::new();
        network.add_pool(pool("P1")).unwrap();
        network.add_station(station("S1", "P1")).unwrap();
        network.add_evse(evse("E1", "S1")).unwrap();
        let mut rx = network.subscribe();

        network.remove_pool(&"P1".into()).unwrap();

        let removed: Vec<_> = drain(&mut rx).into_iter().map(|e| e.entity).collect();
        assert_eq!(
            removed,
            vec![
                EntityRef::Evse("E1".into()),
                EntityRef::Station("S1".into()),
                EntityRef::Pool("P1".into()),
            ]
        );
        assert!(network.evse(&"E1".into()).is_none());
    }

    #[test]
    fn reparenting_to_unknown_pool_is_rejected() {
        let network = RoamingNetwork::new();
        network.add_pool(pool("P1")).unwrap();
        network.add_station(station("S1", "P1")).unwrap();
        let err = network
            .update_station(&"S1".into(), None, |s| s.pool = "P9".into())
            .unwrap_err();
        assert_eq!(err, NetworkError::UnknownPool("P9".into()));
        assert_eq!(network.pool_of_station(&"S1".into()), Some("P1".into()));
    }
}
