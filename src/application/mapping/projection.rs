//! Projection builders: network records → OCPI records, and back for EVSEs
//!
//! Full projections are built from the complete current network state.
//! Incremental updates go through [`apply_pool_field`] and
//! [`apply_evse_field`], which touch exactly the OCPI fields of one table
//! row, so both paths converge on the same Location.

use chrono::{DateTime, Utc};

use super::ids::{from_connector_id, from_evse_uid, to_connector_id, to_evse_uid, to_location_id};
use super::tables::{from_ocpi_status, to_ocpi_status, OcpiField};
use super::MappingError;
use crate::domain::network::{
    Address, ChargingPool, CurrentType, DomainConnector, DomainEvse, GeoCoordinate,
    InclusionFilter, OpeningPeriod, OpeningTimes, PlugType, StationId,
};
use crate::domain::ocpi::{
    Connector, ConnectorFormat, ConnectorStandard, Evse, GeoLocation, Hours, Location, PartyScope,
    PowerType, RegularHours,
};

/// A projected Location plus the EVSEs that had to be left out.
#[derive(Debug)]
pub struct Projection {
    pub location: Location,
    pub skipped: Vec<MappingError>,
}

fn standard(plug: PlugType) -> ConnectorStandard {
    match plug {
        PlugType::Type1 => ConnectorStandard::Iec62196T1,
        PlugType::Type2 => ConnectorStandard::Iec62196T2,
        PlugType::Ccs1 => ConnectorStandard::Iec62196T1Combo,
        PlugType::Ccs2 => ConnectorStandard::Iec62196T2Combo,
        PlugType::Chademo => ConnectorStandard::Chademo,
        PlugType::TeslaConnector => ConnectorStandard::Tesla,
        PlugType::Schuko => ConnectorStandard::DomesticF,
    }
}

fn plug(standard: ConnectorStandard) -> PlugType {
    match standard {
        ConnectorStandard::Iec62196T1 => PlugType::Type1,
        ConnectorStandard::Iec62196T2 => PlugType::Type2,
        ConnectorStandard::Iec62196T1Combo => PlugType::Ccs1,
        ConnectorStandard::Iec62196T2Combo => PlugType::Ccs2,
        ConnectorStandard::Chademo => PlugType::Chademo,
        ConnectorStandard::Tesla => PlugType::TeslaConnector,
        ConnectorStandard::DomesticF => PlugType::Schuko,
    }
}

fn power_type(current: CurrentType) -> PowerType {
    match current {
        CurrentType::Ac1Phase => PowerType::Ac1Phase,
        CurrentType::Ac3Phase => PowerType::Ac3Phase,
        CurrentType::Dc => PowerType::Dc,
    }
}

fn current(power: PowerType) -> CurrentType {
    match power {
        PowerType::Ac1Phase => CurrentType::Ac1Phase,
        PowerType::Ac3Phase => CurrentType::Ac3Phase,
        PowerType::Dc => CurrentType::Dc,
    }
}

fn coordinates(geo: &GeoCoordinate) -> GeoLocation {
    GeoLocation {
        latitude: format!("{:.6}", geo.latitude),
        longitude: format!("{:.6}", geo.longitude),
    }
}

fn hours(times: &OpeningTimes) -> Hours {
    Hours {
        twentyfourseven: times.open_24_7,
        regular_hours: times
            .periods
            .iter()
            .map(|p: &OpeningPeriod| RegularHours {
                weekday: p.weekday,
                period_begin: p.begin.clone(),
                period_end: p.end.clone(),
            })
            .collect(),
    }
}

fn apply_address(location: &mut Location, address: &Address) {
    location.address = address.street.clone();
    location.city = address.city.clone();
    location.postal_code = address.postal_code.clone();
    location.country = address.country.clone();
}

/// Effective power limit: the tighter of connector and EVSE limits.
fn power_limit(connector: Option<u32>, evse: Option<u32>) -> Option<u32> {
    match (connector, evse) {
        (Some(c), Some(e)) => Some(c.min(e)),
        (c, e) => c.or(e),
    }
}

pub fn project_connector(
    connector: &DomainConnector,
    evse_max_power: Option<u32>,
    now: DateTime<Utc>,
) -> Result<Connector, MappingError> {
    Ok(Connector {
        id: to_connector_id(&connector.id)?,
        standard: standard(connector.plug),
        format: if connector.cable_attached {
            ConnectorFormat::Cable
        } else {
            ConnectorFormat::Socket
        },
        power_type: power_type(connector.current),
        max_voltage: connector.voltage,
        max_amperage: connector.amperage,
        max_electric_power: power_limit(connector.max_power, evse_max_power),
        tariff_ids: Vec::new(),
        last_updated: now,
    })
}

fn project_connectors(evse: &DomainEvse, now: DateTime<Utc>) -> Result<Vec<Connector>, MappingError> {
    let mut connectors = evse
        .connectors
        .iter()
        .map(|c| project_connector(c, evse.max_power, now))
        .collect::<Result<Vec<_>, _>>()?;
    connectors.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(connectors)
}

pub fn project_evse(evse: &DomainEvse, now: DateTime<Utc>) -> Result<Evse, MappingError> {
    Ok(Evse {
        uid: to_evse_uid(&evse.id)?,
        evse_id: evse.public_id.clone(),
        status: to_ocpi_status(&evse.status),
        connectors: project_connectors(evse, now)?,
        floor_level: evse.floor_level.clone(),
        coordinates: None,
        physical_reference: evse.physical_reference.clone(),
        last_updated: now,
    })
}

/// Build a Location from the full current state of a pool and its EVSEs.
/// EVSEs rejected by `filter` are left out; unmappable EVSEs are skipped
/// and reported.
pub fn project_location(
    owner: &PartyScope,
    pool: &ChargingPool,
    evses: &[DomainEvse],
    filter: &InclusionFilter,
    now: DateTime<Utc>,
) -> Result<Projection, MappingError> {
    let mut skipped = Vec::new();
    let mut projected = Vec::with_capacity(evses.len());
    for evse in evses.iter().filter(|e| filter.allows_evse(&pool.id, &e.id)) {
        match project_evse(evse, now) {
            Ok(evse) => projected.push(evse),
            Err(err) => skipped.push(err),
        }
    }

    let mut location = Location {
        country_code: owner.country_code.clone(),
        party_id: owner.party_id.clone(),
        id: to_location_id(&pool.id)?,
        publish: true,
        name: None,
        address: String::new(),
        city: String::new(),
        postal_code: None,
        country: String::new(),
        coordinates: coordinates(&pool.geo_location),
        evses: projected,
        opening_times: None,
        charging_when_closed: None,
        time_zone: String::new(),
        last_updated: now,
        hash: String::new(),
    };
    for field in [
        OcpiField::LocationName,
        OcpiField::LocationAddress,
        OcpiField::LocationOpeningTimes,
        OcpiField::LocationChargingWhenClosed,
        OcpiField::LocationTimeZone,
    ] {
        apply_pool_field(&mut location, pool, field);
    }
    location.normalize();
    location.refresh_hash();
    Ok(Projection { location, skipped })
}

/// Copy one mapped pool field into an existing Location. Returns whether
/// `field` is a Location field at all.
pub fn apply_pool_field(location: &mut Location, pool: &ChargingPool, field: OcpiField) -> bool {
    match field {
        OcpiField::LocationName => location.name = pool.name.clone(),
        OcpiField::LocationAddress => apply_address(location, &pool.address),
        OcpiField::LocationCoordinates => location.coordinates = coordinates(&pool.geo_location),
        OcpiField::LocationOpeningTimes => location.opening_times = pool.opening_times.as_ref().map(hours),
        OcpiField::LocationChargingWhenClosed => {
            location.charging_when_closed = pool.charging_when_closed
        }
        OcpiField::LocationTimeZone => location.time_zone = pool.time_zone.clone(),
        _ => return false,
    }
    true
}

/// Copy one mapped EVSE field into an existing OCPI EVSE. Returns whether
/// `field` is an EVSE field at all.
pub fn apply_evse_field(
    target: &mut Evse,
    evse: &DomainEvse,
    field: OcpiField,
    now: DateTime<Utc>,
) -> Result<bool, MappingError> {
    match field {
        OcpiField::EvseStatus => target.status = to_ocpi_status(&evse.status),
        OcpiField::EvseId => target.evse_id = evse.public_id.clone(),
        OcpiField::EvsePhysicalReference => {
            target.physical_reference = evse.physical_reference.clone()
        }
        OcpiField::EvseFloorLevel => target.floor_level = evse.floor_level.clone(),
        OcpiField::EvseConnectors => target.connectors = project_connectors(evse, now)?,
        _ => return Ok(false),
    }
    Ok(true)
}

pub fn connector_from_ocpi(connector: &Connector) -> DomainConnector {
    DomainConnector {
        id: from_connector_id(&connector.id),
        plug: plug(connector.standard),
        cable_attached: connector.cable_attached(),
        current: current(connector.power_type),
        voltage: connector.max_voltage,
        amperage: connector.max_amperage,
        max_power: connector.max_electric_power,
    }
}

/// Inverse of [`project_evse`] over the OCPI-mapped fields. Unmapped
/// network fields (name, description) come back empty and the per-EVSE
/// power cap is folded into the connectors.
pub fn evse_from_ocpi(evse: &Evse, station: &StationId) -> DomainEvse {
    DomainEvse {
        id: from_evse_uid(&evse.uid),
        station: station.clone(),
        public_id: evse.evse_id.clone(),
        status: from_ocpi_status(evse.status),
        connectors: evse.connectors.iter().map(connector_from_ocpi).collect(),
        max_power: None,
        physical_reference: evse.physical_reference.clone(),
        floor_level: evse.floor_level.clone(),
        name: None,
        description: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::network::model::fixtures::{connector, evse, pool};
    use crate::domain::network::{DomainEvseId, DomainEvseStatus, PoolId};
    use crate::domain::ocpi::EvseStatus;
    use std::collections::BTreeSet;

    fn owner() -> PartyScope {
        PartyScope::parse("DE", "GEF").unwrap()
    }

    #[test]
    fn pool_with_two_evses_projects_to_one_location() {
        let evses = vec![evse("E2", "S1"), evse("E1", "S1")];
        let projection = project_location(
            &owner(),
            &pool("P1"),
            &evses,
            &InclusionFilter::allow_all(),
            Utc::now(),
        )
        .unwrap();
        let location = projection.location;
        assert_eq!(location.id.as_str(), "P1");
        assert_eq!(location.evses.len(), 2);
        assert_eq!(location.evses[0].uid.as_str(), "E1");
        assert_eq!(location.name.as_deref(), Some("Pool P1"));
        assert_eq!(location.city, "Jena");
        assert_eq!(location.coordinates.latitude, "50.928000");
        assert!(location.opening_times.unwrap().twentyfourseven);
        assert!(!location.hash.is_empty());
    }

    #[test]
    fn filtered_and_unmappable_evses_are_left_out() {
        let evses = vec![evse("E1", "S1"), evse("E2", "S1"), evse("bad id", "S1")];
        let filter = InclusionFilter {
            exclude_evses: BTreeSet::from([DomainEvseId::new("E2")]),
            ..Default::default()
        };
        let projection =
            project_location(&owner(), &pool("P1"), &evses, &filter, Utc::now()).unwrap();
        assert_eq!(projection.location.evses.len(), 1);
        assert_eq!(projection.skipped.len(), 1);
    }

    #[test]
    fn unmappable_pool_fails_the_whole_location() {
        let mut p = pool("P1");
        p.id = PoolId::new("pool/1");
        let result = project_location(&owner(), &p, &[], &InclusionFilter::allow_all(), Utc::now());
        assert!(result.is_err());
    }

    #[test]
    fn evse_power_cap_limits_connectors() {
        let mut e = evse("E1", "S1");
        e.max_power = Some(11_000);
        let projected = project_evse(&e, Utc::now()).unwrap();
        assert_eq!(projected.connectors[0].max_electric_power, Some(11_000));
    }

    #[test]
    fn from_ocpi_preserves_every_mapped_field() {
        let mut e = evse("E1", "S1");
        e.status = DomainEvseStatus::Occupied;
        e.max_power = Some(11_000);
        e.physical_reference = Some("left".to_string());
        e.floor_level = Some("-1".to_string());
        e.name = Some("not mapped".to_string());
        let mut dc = connector("2");
        dc.cable_attached = true;
        dc.current = CurrentType::Dc;
        dc.plug = PlugType::Ccs2;
        e.connectors.push(dc);

        let now = Utc::now();
        let projected = project_evse(&e, now).unwrap();
        let back = evse_from_ocpi(&projected, &e.station);
        assert_eq!(project_evse(&back, now).unwrap(), projected);
        assert_eq!(back.id, e.id);
        assert_eq!(back.public_id, e.public_id);
        assert_eq!(projected.status, EvseStatus::Charging);
    }

    #[test]
    fn incremental_field_update_matches_full_projection() {
        let now = Utc::now();
        let mut p = pool("P1");
        let full_before =
            project_location(&owner(), &p, &[], &InclusionFilter::allow_all(), now).unwrap();

        p.address.city = "Weimar".to_string();
        p.name = None;
        let mut incremental = full_before.location.clone();
        assert!(apply_pool_field(&mut incremental, &p, OcpiField::LocationAddress));
        assert!(apply_pool_field(&mut incremental, &p, OcpiField::LocationName));
        assert!(!apply_pool_field(&mut incremental, &p, OcpiField::EvseStatus));

        let full_after =
            project_location(&owner(), &p, &[], &InclusionFilter::allow_all(), now).unwrap();
        assert_eq!(incremental.content_hash(), full_after.location.content_hash());
    }
}
