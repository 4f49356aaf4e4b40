//! Charging infrastructure as the operator sees it:
//! pool → station → EVSE → connector.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

macro_rules! domain_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

domain_id!(
    /// Charging pool id. A pool is a site and becomes one OCPI Location.
    PoolId
);
domain_id!(StationId);
domain_id!(DomainEvseId);
domain_id!(
    /// Connector id, unique within its EVSE.
    DomainConnectorId
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Address {
    pub street: String,
    pub postal_code: Option<String>,
    pub city: String,
    /// ISO 3166-1 alpha-3
    pub country: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeoCoordinate {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OpeningPeriod {
    /// 1 = Monday ... 7 = Sunday
    pub weekday: u8,
    /// `HH:MM`
    pub begin: String,
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OpeningTimes {
    pub open_24_7: bool,
    #[serde(default)]
    pub periods: Vec<OpeningPeriod>,
}

impl OpeningTimes {
    pub fn always_open() -> Self {
        Self {
            open_24_7: true,
            periods: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ChargingPool {
    pub id: PoolId,
    pub name: Option<String>,
    pub description: Option<String>,
    pub address: Address,
    pub geo_location: GeoCoordinate,
    pub opening_times: Option<OpeningTimes>,
    pub charging_when_closed: Option<bool>,
    /// IANA time zone, e.g. `Europe/Berlin`
    pub time_zone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ChargingStation {
    pub id: StationId,
    pub pool: PoolId,
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Operational status of an EVSE as reported by the network.
///
/// The set is open: statuses added by newer firmware arrive as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum DomainEvseStatus {
    Available,
    Reserved,
    Charging,
    Occupied,
    Blocked,
    OutOfService,
    Error,
    Faulted,
    Planned,
    InDeployment,
    Removed,
    Offline,
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum PlugType {
    Type1,
    Type2,
    Ccs1,
    Ccs2,
    Chademo,
    TeslaConnector,
    Schuko,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum CurrentType {
    Ac1Phase,
    Ac3Phase,
    Dc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DomainConnector {
    pub id: DomainConnectorId,
    pub plug: PlugType,
    pub cable_attached: bool,
    pub current: CurrentType,
    pub voltage: u32,
    pub amperage: u32,
    /// Watts
    pub max_power: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DomainEvse {
    pub id: DomainEvseId,
    pub station: StationId,
    /// Public eMI3 EVSE id, assigned by the operator's id authority.
    pub public_id: Option<String>,
    pub status: DomainEvseStatus,
    pub connectors: Vec<DomainConnector>,
    /// Watts; caps every connector's own limit.
    pub max_power: Option<u32>,
    pub physical_reference: Option<String>,
    pub floor_level: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn pool(id: &str) -> ChargingPool {
        ChargingPool {
            id: PoolId::new(id),
            name: Some(format!("Pool {id}")),
            description: Some("internal notes".to_string()),
            address: Address {
                street: "Main Street 1".to_string(),
                postal_code: Some("07743".to_string()),
                city: "Jena".to_string(),
                country: "DEU".to_string(),
            },
            geo_location: GeoCoordinate {
                latitude: 50.928,
                longitude: 11.589,
            },
            opening_times: Some(OpeningTimes::always_open()),
            charging_when_closed: Some(true),
            time_zone: "Europe/Berlin".to_string(),
        }
    }

    pub fn station(id: &str, pool: &str) -> ChargingStation {
        ChargingStation {
            id: StationId::new(id),
            pool: PoolId::new(pool),
            name: None,
            description: None,
        }
    }

    pub fn connector(id: &str) -> DomainConnector {
        DomainConnector {
            id: DomainConnectorId::new(id),
            plug: PlugType::Type2,
            cable_attached: false,
            current: CurrentType::Ac3Phase,
            voltage: 400,
            amperage: 32,
            max_power: Some(22_000),
        }
    }

    pub fn evse(id: &str, station: &str) -> DomainEvse {
        DomainEvse {
            id: DomainEvseId::new(id),
            station: StationId::new(station),
            public_id: Some(format!("DE*GEF*E{id}")),
            status: DomainEvseStatus::Available,
            connectors: vec![connector("1")],
            max_power: None,
            physical_reference: None,
            floor_level: None,
            name: None,
            description: None,
        }
    }
}
