//! Lifecycle, property and status events emitted by the roaming network

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::model::{DomainEvseId, DomainEvseStatus, PoolId, StationId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Pool,
    Station,
    Evse,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pool => "pool",
            Self::Station => "station",
            Self::Evse => "evse",
        }
    }
}

/// The entity an event is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EntityRef {
    Pool(PoolId),
    Station(StationId),
    Evse(DomainEvseId),
}

impl EntityRef {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Pool(_) => EntityKind::Pool,
            Self::Station(_) => EntityKind::Station,
            Self::Evse(_) => EntityKind::Evse,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Pool(id) => id.as_str(),
            Self::Station(id) => id.as_str(),
            Self::Evse(id) => id.as_str(),
        }
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind().as_str(), self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NetworkChange {
    Created,
    PropertyChanged {
        property: String,
        old: Value,
        new: Value,
    },
    /// EVSEs only.
    StatusChanged {
        old: DomainEvseStatus,
        new: DomainEvseStatus,
    },
    Removed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkEvent {
    pub entity: EntityRef,
    pub change: NetworkChange,
    pub timestamp: DateTime<Utc>,
    /// Originating user or system, kept for audit.
    pub actor: Option<String>,
}

impl NetworkEvent {
    pub fn new(entity: EntityRef, change: NetworkChange, actor: Option<String>) -> Self {
        Self {
            entity,
            change,
            timestamp: Utc::now(),
            actor,
        }
    }

    pub fn created(entity: EntityRef) -> Self {
        Self::new(entity, NetworkChange::Created, None)
    }

    pub fn removed(entity: EntityRef) -> Self {
        Self::new(entity, NetworkChange::Removed, None)
    }

    pub fn property_changed(
        entity: EntityRef,
        property: impl Into<String>,
        old: Value,
        new: Value,
    ) -> Self {
        Self::new(
            entity,
            NetworkChange::PropertyChanged {
                property: property.into(),
                old,
                new,
            },
            None,
        )
    }

    pub fn event_type(&self) -> &'static str {
        match self.change {
            NetworkChange::Created => "created",
            NetworkChange::PropertyChanged { .. } => "property_changed",
            NetworkChange::StatusChanged { .. } => "status_changed",
            NetworkChange::Removed => "removed",
        }
    }
}
