//! OCPI Locations module objects: Location → EVSE → Connector

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::ids::{ConnectorId, CountryCode, EvseUid, LocationId, PartyId, PartyScope, TariffId};

/// EVSE status as published over OCPI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvseStatus {
    Available,
    Blocked,
    Charging,
    Inoperative,
    OutOfOrder,
    Planned,
    Removed,
    Reserved,
    Unknown,
}

impl EvseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "AVAILABLE",
            Self::Blocked => "BLOCKED",
            Self::Charging => "CHARGING",
            Self::Inoperative => "INOPERATIVE",
            Self::OutOfOrder => "OUTOFORDER",
            Self::Planned => "PLANNED",
            Self::Removed => "REMOVED",
            Self::Reserved => "RESERVED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for EvseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectorStandard {
    Chademo,
    DomesticF,
    #[serde(rename = "IEC_62196_T1")]
    Iec62196T1,
    #[serde(rename = "IEC_62196_T1_COMBO")]
    Iec62196T1Combo,
    #[serde(rename = "IEC_62196_T2")]
    Iec62196T2,
    #[serde(rename = "IEC_62196_T2_COMBO")]
    Iec62196T2Combo,
    Tesla,
}

/// `CABLE` means the cable is attached to the EVSE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectorFormat {
    Socket,
    Cable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PowerType {
    #[serde(rename = "AC_1_PHASE")]
    Ac1Phase,
    #[serde(rename = "AC_3_PHASE")]
    Ac3Phase,
    Dc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connector {
    pub id: ConnectorId,
    pub standard: ConnectorStandard,
    pub format: ConnectorFormat,
    pub power_type: PowerType,
    pub max_voltage: u32,
    pub max_amperage: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_electric_power: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tariff_ids: Vec<TariffId>,
    pub last_updated: DateTime<Utc>,
}

impl Connector {
    pub fn cable_attached(&self) -> bool {
        self.format == ConnectorFormat::Cable
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: String,
    pub longitude: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegularHours {
    /// 1 = Monday ... 7 = Sunday
    pub weekday: u8,
    pub period_begin: String,
    pub period_end: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hours {
    pub twentyfourseven: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub regular_hours: Vec<RegularHours>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evse {
    pub uid: EvseUid,
    /// Public, regulator-visible EVSE id (eMI3), assigned externally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evse_id: Option<String>,
    pub status: EvseStatus,
    pub connectors: Vec<Connector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floor_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<GeoLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_reference: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl Evse {
    pub fn connector(&self, id: &ConnectorId) -> Option<&Connector> {
        self.connectors.iter().find(|c| &c.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub country_code: CountryCode,
    pub party_id: PartyId,
    pub id: LocationId,
    pub publish: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub address: String,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    /// ISO 3166-1 alpha-3
    pub country: String,
    pub coordinates: GeoLocation,
    #[serde(default)]
    pub evses: Vec<Evse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opening_times: Option<Hours>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charging_when_closed: Option<bool>,
    pub time_zone: String,
    pub last_updated: DateTime<Utc>,
    /// Content hash used for change detection and ETags; not part of the wire object.
    #[serde(skip)]
    pub hash: String,
}

impl Location {
    pub fn owner(&self) -> PartyScope {
        PartyScope::new(self.country_code.clone(), self.party_id.clone())
    }

    pub fn evse(&self, uid: &EvseUid) -> Option<&Evse> {
        self.evses.iter().find(|e| &e.uid == uid)
    }

    pub fn evse_mut(&mut self, uid: &EvseUid) -> Option<&mut Evse> {
        self.evses.iter_mut().find(|e| &e.uid == uid)
    }

    /// Soft-deleted: hidden and every EVSE flagged `REMOVED`.
    pub fn is_removed(&self) -> bool {
        !self.publish && self.evses.iter().all(|e| e.status == EvseStatus::Removed)
    }

    /// Keep EVSEs ordered by uid so incremental and full projections agree.
    pub fn normalize(&mut self) {
        self.evses.sort_by(|a, b| a.uid.cmp(&b.uid));
        for evse in &mut self.evses {
            evse.connectors.sort_by(|a, b| a.id.cmp(&b.id));
        }
    }

    /// SHA-256 over the canonical JSON content, ignoring `last_updated`.
    pub fn content_hash(&self) -> String {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        strip_last_updated(&mut value);
        let canonical = value.to_string();
        hex::encode(Sha256::digest(canonical.as_bytes()))
    }

    pub fn refresh_hash(&mut self) {
        self.hash = self.content_hash();
    }
}

fn strip_last_updated(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            map.remove("last_updated");
            for v in map.values_mut() {
                strip_last_updated(v);
            }
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(strip_last_updated),
        _ => {}
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    fn owner() -> PartyScope {
        PartyScope::parse("DE", "GEF").unwrap()
    }

    #[test]
    fn status_serializes_as_ocpi_enum() {
        assert_eq!(
            serde_json::to_string(&EvseStatus::OutOfOrder).unwrap(),
            "\"OUTOFORDER\""
        );
        let parsed: EvseStatus = serde_json::from_str("\"CHARGING\"").unwrap();
        assert_eq!(parsed, EvseStatus::Charging);
    }

    #[test]
    fn connector_enums_use_ocpi_names() {
        let json = serde_json::to_value(connector("1")).unwrap();
        assert_eq!(json["standard"], "IEC_62196_T2");
        assert_eq!(json["power_type"], "AC_3_PHASE");
        assert_eq!(json["format"], "SOCKET");
    }

    #[test]
    fn hash_ignores_timestamps_but_not_content() {
        let a = location(&owner(), "L1", vec![evse("E1")]);
        let mut b = a.clone();
        b.last_updated = a.last_updated + chrono::Duration::hours(1);
        b.evses[0].last_updated = b.last_updated;
        assert_eq!(a.content_hash(), b.content_hash());

        b.evses[0].status = EvseStatus::Charging;
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn normalize_orders_evses_by_uid() {
        let loc = location(&owner(), "L1", vec![evse("E2"), evse("E1")]);
        let uids: Vec<_> = loc.evses.iter().map(|e| e.uid.as_str()).collect();
        assert_eq!(uids, vec!["E1", "E2"]);
    }

    #[test]
    fn hash_is_not_serialized() {
        let loc = location(&owner(), "L1", vec![]);
        let json = serde_json::to_value(&loc).unwrap();
        assert!(json.get("hash").is_none());
        assert_eq!(json["country_code"], "DE");
    }
}
