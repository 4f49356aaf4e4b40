//! OCPI Sessions and CDRs module objects

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::{
    CdrId, ConnectorId, CountryCode, EvseUid, LocationId, PartyId, PartyScope, SessionId,
    TariffId,
};
use super::token::CdrToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Active,
    Completed,
    Invalid,
    Pending,
    Reservation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub excl_vat: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incl_vat: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub country_code: CountryCode,
    pub party_id: PartyId,
    pub id: SessionId,
    pub start_date_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date_time: Option<DateTime<Utc>>,
    pub kwh: Decimal,
    pub cdr_token: CdrToken,
    pub location_id: LocationId,
    pub evse_uid: EvseUid,
    pub connector_id: ConnectorId,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<Price>,
    pub status: SessionStatus,
    pub last_updated: DateTime<Utc>,
}

impl Session {
    pub fn owner(&self) -> PartyScope {
        PartyScope::new(self.country_code.clone(), self.party_id.clone())
    }
}

/// Location snapshot frozen into a CDR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdrLocation {
    pub id: LocationId,
    pub address: String,
    pub city: String,
    pub country: String,
    pub evse_uid: EvseUid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evse_id: Option<String>,
    pub connector_id: ConnectorId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cdr {
    pub country_code: CountryCode,
    pub party_id: PartyId,
    pub id: CdrId,
    pub start_date_time: DateTime<Utc>,
    pub end_date_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    pub cdr_token: CdrToken,
    pub cdr_location: CdrLocation,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tariff_ids: Vec<TariffId>,
    pub total_cost: Price,
    pub total_energy: Decimal,
    /// Hours
    pub total_time: Decimal,
    pub last_updated: DateTime<Utc>,
}

impl Cdr {
    pub fn owner(&self) -> PartyScope {
        PartyScope::new(self.country_code.clone(), self.party_id.clone())
    }
}
