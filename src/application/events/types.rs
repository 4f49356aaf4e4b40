//! Event types published on the internal bus

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::store::ChangeNotification;
use crate::domain::network::InclusionFilter;
use crate::domain::ocpi::{CommandResultType, CommandType, PartyScope};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyChange {
    Added,
    Removed,
    Registered,
    Unregistered,
    TokenRotated,
    StatusChanged,
    AccessChanged,
    /// The party's inclusion filter was replaced; carries the filter it had.
    FilterChanged { previous: InclusionFilter },
    PushEnabled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartyChangedEvent {
    pub party: PartyScope,
    pub change: PartyChange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResolvedEvent {
    pub correlation_id: Uuid,
    pub command: CommandType,
    pub target: PartyScope,
    pub result: CommandResultType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    ObjectChanged(ChangeNotification),
    PartyChanged(PartyChangedEvent),
    CommandResolved(CommandResolvedEvent),
}

impl Event {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ObjectChanged(_) => "object_changed",
            Self::PartyChanged(_) => "party_changed",
            Self::CommandResolved(_) => "command_resolved",
        }
    }

    pub fn party(&self) -> &PartyScope {
        match self {
            Self::ObjectChanged(n) => &n.owner,
            Self::PartyChanged(e) => &e.party,
            Self::CommandResolved(e) => &e.target,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event: Event,
}

impl EventMessage {
    pub fn new(event: Event) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}
