//! OCPI identifiers
//!
//! All object identifiers are `CiString(36)`: 1..=36 printable ASCII
//! characters. We accept the conservative subset `[A-Za-z0-9*_.-]` so ids can
//! be embedded in URL paths without escaping.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum length of an OCPI object identifier.
pub const MAX_ID_LEN: usize = 36;

/// Whether `value` satisfies the OCPI identifier grammar.
pub fn is_valid_ocpi_id(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_ID_LEN
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '*' | '_' | '.' | '-'))
}

/// Rejected identifier during deserialization.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid {kind}: {value:?}")]
pub struct InvalidId {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! ocpi_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String")]
        pub struct $name(String);

        impl TryFrom<String> for $name {
            type Error = InvalidId;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(value.clone()).ok_or(InvalidId { kind: stringify!($name), value })
            }
        }

        impl $name {
            /// Validating constructor.
            pub fn parse(value: impl Into<String>) -> Option<Self> {
                let value = value.into();
                is_valid_ocpi_id(&value).then_some(Self(value))
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

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

ocpi_id!(
    /// Location id, unique per CPO.
    LocationId
);
ocpi_id!(
    /// Internal EVSE id (`EVSE.uid`), unique within the CPO.
    EvseUid
);
ocpi_id!(
    /// Connector id, unique within its EVSE.
    ConnectorId
);
ocpi_id!(TariffId);
ocpi_id!(SessionId);
ocpi_id!(CdrId);
ocpi_id!(
    /// Token uid (RFID UID, app user id, ...).
    TokenUid
);

/// ISO 3166-1 alpha-2 country code of a party.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct CountryCode(String);

impl TryFrom<String> for CountryCode {
    type Error = InvalidId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or(InvalidId {
            kind: "CountryCode",
            value,
        })
    }
}

impl CountryCode {
    pub fn parse(value: impl AsRef<str>) -> Option<Self> {
        let value = value.as_ref();
        (value.len() == 2 && value.chars().all(|c| c.is_ascii_uppercase()))
            .then(|| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// ISO 15118 party id (three characters) of a CPO or EMSP.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct PartyId(String);

impl TryFrom<String> for PartyId {
    type Error = InvalidId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or(InvalidId {
            kind: "PartyId",
            value,
        })
    }
}

impl PartyId {
    pub fn parse(value: impl AsRef<str>) -> Option<Self> {
        let value = value.as_ref();
        (value.len() == 3
            && value
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()))
        .then(|| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `(country_code, party_id)`: the owner scope of every OCPI object and the
/// composite key of a remote party.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartyScope {
    pub country_code: CountryCode,
    pub party_id: PartyId,
}

impl PartyScope {
    pub fn new(country_code: CountryCode, party_id: PartyId) -> Self {
        Self {
            country_code,
            party_id,
        }
    }

    /// Parse `"DE"` + `"ABC"`.
    pub fn parse(country_code: &str, party_id: &str) -> Option<Self> {
        Some(Self::new(
            CountryCode::parse(country_code)?,
            PartyId::parse(party_id)?,
        ))
    }
}

impl fmt::Display for PartyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}*{}", self.country_code, self.party_id)
    }
}

/// Party-scoped key used by the object store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopedId<I> {
    pub owner: PartyScope,
    pub id: I,
}

impl<I> ScopedId<I> {
    pub fn new(owner: PartyScope, id: I) -> Self {
        Self { owner, id }
    }
}

impl<I: fmt::Display> fmt::Display for ScopedId<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grammar_accepts_emi3_style_ids() {
        assert!(is_valid_ocpi_id("DE*GEF*E12345*1"));
        assert!(is_valid_ocpi_id("pool-1_a.b"));
    }

    #[test]
    fn grammar_rejects_bad_ids() {
        assert!(!is_valid_ocpi_id(""));
        assert!(!is_valid_ocpi_id("has space"));
        assert!(!is_valid_ocpi_id("slash/inside"));
        assert!(!is_valid_ocpi_id(&"x".repeat(37)));
        assert!(is_valid_ocpi_id(&"x".repeat(36)));
    }

    #[test]
    fn country_and_party_codes() {
        assert!(CountryCode::parse("DE").is_some());
        assert!(CountryCode::parse("de").is_none());
        assert!(CountryCode::parse("DEU").is_none());
        assert!(PartyId::parse("GE1").is_some());
        assert!(PartyId::parse("GE").is_none());
        assert_eq!(PartyScope::parse("NL", "TNM").unwrap().to_string(), "NL*TNM");
    }

    #[test]
    fn ids_serialize_transparently() {
        let id = LocationId::parse("LOC1").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"LOC1\"");
    }

    #[test]
    fn deserialization_validates_grammar() {
        assert!(serde_json::from_str::<LocationId>("\"LOC1\"").is_ok());
        assert!(serde_json::from_str::<LocationId>("\"bad id\"").is_err());
        assert!(serde_json::from_str::<CountryCode>("\"nl\"").is_err());
    }
}
