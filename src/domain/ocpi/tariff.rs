//! OCPI Tariffs module objects

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::{CountryCode, PartyId, PartyScope, TariffId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TariffDimensionType {
    Energy,
    Flat,
    ParkingTime,
    Time,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceComponent {
    #[serde(rename = "type")]
    pub dimension: TariffDimensionType,
    /// Price per unit excluding VAT.
    pub price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vat: Option<Decimal>,
    pub step_size: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TariffElement {
    pub price_components: Vec<PriceComponent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tariff {
    pub country_code: CountryCode,
    pub party_id: PartyId,
    pub id: TariffId,
    /// ISO 4217
    pub currency: String,
    pub elements: Vec<TariffElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date_time: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
}

impl Tariff {
    pub fn owner(&self) -> PartyScope {
        PartyScope::new(self.country_code.clone(), self.party_id.clone())
    }

    /// Whether the tariff applies at `at`.
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.start_date_time.map_or(true, |start| at >= start)
            && self.end_date_time.map_or(true, |end| at < end)
    }
}
