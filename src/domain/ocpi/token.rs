//! OCPI Tokens module objects

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{CountryCode, PartyId, PartyScope, TokenUid};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenType {
    AdHocUser,
    AppUser,
    Other,
    Rfid,
}

/// When a CPO may authorize the token without asking the EMSP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WhitelistType {
    Always,
    Allowed,
    AllowedOffline,
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllowedType {
    Allowed,
    Blocked,
    Expired,
    NoCredit,
    NotAllowed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub country_code: CountryCode,
    pub party_id: PartyId,
    pub uid: TokenUid,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub contract_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_number: Option<String>,
    pub issuer: String,
    pub valid: bool,
    pub whitelist: WhitelistType,
    /// ISO 639-1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl Token {
    pub fn owner(&self) -> PartyScope {
        PartyScope::new(self.country_code.clone(), self.party_id.clone())
    }

    /// Local authorization decision for a stored token.
    pub fn authorization(&self) -> AllowedType {
        if !self.valid {
            AllowedType::Blocked
        } else if self.whitelist == WhitelistType::Never {
            AllowedType::NotAllowed
        } else {
            AllowedType::Allowed
        }
    }
}

/// Reference to a token embedded in sessions and CDRs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdrToken {
    pub country_code: CountryCode,
    pub party_id: PartyId,
    pub uid: TokenUid,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub contract_id: String,
}

impl CdrToken {
    pub fn issuer(&self) -> PartyScope {
        PartyScope::new(self.country_code.clone(), self.party_id.clone())
    }
}

impl From<&Token> for CdrToken {
    fn from(token: &Token) -> Self {
        Self {
            country_code: token.country_code.clone(),
            party_id: token.party_id.clone(),
            uid: token.uid.clone(),
            token_type: token.token_type,
            contract_id: token.contract_id.clone(),
        }
    }
}

/// Answer of the real-time authorization request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationInfo {
    pub allowed: AllowedType,
    pub token: CdrToken,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_reference: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(valid: bool, whitelist: WhitelistType) -> Token {
        Token {
            country_code: CountryCode::parse("NL").unwrap(),
            party_id: PartyId::parse("EMS").unwrap(),
            uid: TokenUid::parse("04A1B2C3").unwrap(),
            token_type: TokenType::Rfid,
            contract_id: "NL-EMS-C12345678-X".to_string(),
            visual_number: None,
            issuer: "EMS Mobility".to_string(),
            valid,
            whitelist,
            language: Some("nl".to_string()),
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn invalid_token_is_blocked() {
        assert_eq!(token(false, WhitelistType::Always).authorization(), AllowedType::Blocked);
    }

    #[test]
    fn never_whitelisted_token_is_not_allowed() {
        assert_eq!(token(true, WhitelistType::Never).authorization(), AllowedType::NotAllowed);
        assert_eq!(token(true, WhitelistType::Allowed).authorization(), AllowedType::Allowed);
    }

    #[test]
    fn token_type_wire_names() {
        let json = serde_json::to_value(token(true, WhitelistType::AllowedOffline)).unwrap();
        assert_eq!(json["type"], "RFID");
        assert_eq!(json["whitelist"], "ALLOWED_OFFLINE");
    }
}
