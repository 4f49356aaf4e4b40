//! Fixed mapping tables: EVSE status and OCPI-visible properties

use crate::domain::network::{DomainEvseStatus, EntityKind};
use crate::domain::ocpi::EvseStatus;

/// Network → OCPI status. Total: anything unrecognised is `UNKNOWN`.
pub fn to_ocpi_status(status: &DomainEvseStatus) -> EvseStatus {
    match status {
        DomainEvseStatus::Available => EvseStatus::Available,
        DomainEvseStatus::Reserved => EvseStatus::Reserved,
        DomainEvseStatus::Charging | DomainEvseStatus::Occupied => EvseStatus::Charging,
        DomainEvseStatus::Blocked => EvseStatus::Blocked,
        DomainEvseStatus::OutOfService => EvseStatus::Inoperative,
        DomainEvseStatus::Error | DomainEvseStatus::Faulted => EvseStatus::OutOfOrder,
        DomainEvseStatus::Planned | DomainEvseStatus::InDeployment => EvseStatus::Planned,
        DomainEvseStatus::Removed => EvseStatus::Removed,
        DomainEvseStatus::Offline | DomainEvseStatus::Other(_) => EvseStatus::Unknown,
    }
}

/// OCPI → network status, picking the canonical network status for each
/// OCPI value. `to_ocpi_status(from_ocpi_status(s)) == s` for every `s`.
pub fn from_ocpi_status(status: EvseStatus) -> DomainEvseStatus {
    match status {
        EvseStatus::Available => DomainEvseStatus::Available,
        EvseStatus::Reserved => DomainEvseStatus::Reserved,
        EvseStatus::Charging => DomainEvseStatus::Charging,
        EvseStatus::Blocked => DomainEvseStatus::Blocked,
        EvseStatus::Inoperative => DomainEvseStatus::OutOfService,
        EvseStatus::OutOfOrder => DomainEvseStatus::Error,
        EvseStatus::Planned => DomainEvseStatus::Planned,
        EvseStatus::Removed => DomainEvseStatus::Removed,
        EvseStatus::Unknown => DomainEvseStatus::Offline,
    }
}

/// OCPI field (or group of fields) a network property projects onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OcpiField {
    LocationName,
    /// address, city, postal_code and country together
    LocationAddress,
    LocationCoordinates,
    LocationOpeningTimes,
    LocationChargingWhenClosed,
    LocationTimeZone,
    /// Membership changed; both affected Locations are reprojected.
    EvseSet,
    EvseStatus,
    EvseId,
    EvsePhysicalReference,
    EvseFloorLevel,
    EvseConnectors,
}

/// The explicit property table. `None` means the property is not visible
/// over OCPI and changes to it are dropped.
pub fn property_mapping(kind: EntityKind, property: &str) -> Option<OcpiField> {
    match (kind, property) {
        (EntityKind::Pool, "name") => Some(OcpiField::LocationName),
        (EntityKind::Pool, "address") => Some(OcpiField::LocationAddress),
        (EntityKind::Pool, "geo_location") => Some(OcpiField::LocationCoordinates),
        (EntityKind::Pool, "opening_times") => Some(OcpiField::LocationOpeningTimes),
        (EntityKind::Pool, "charging_when_closed") => Some(OcpiField::LocationChargingWhenClosed),
        (EntityKind::Pool, "time_zone") => Some(OcpiField::LocationTimeZone),
        (EntityKind::Station, "pool") => Some(OcpiField::EvseSet),
        (EntityKind::Evse, "station") => Some(OcpiField::EvseSet),
        (EntityKind::Evse, "status") => Some(OcpiField::EvseStatus),
        (EntityKind::Evse, "public_id") => Some(OcpiField::EvseId),
        (EntityKind::Evse, "physical_reference") => Some(OcpiField::EvsePhysicalReference),
        (EntityKind::Evse, "floor_level") => Some(OcpiField::EvseFloorLevel),
        (EntityKind::Evse, "connectors" | "max_power") => Some(OcpiField::EvseConnectors),
        _ => None,
    }
}
