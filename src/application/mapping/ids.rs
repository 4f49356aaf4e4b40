//! Identity mapping between network ids and OCPI ids
//!
//! The OCPI id is the domain id's exact string, so the mapping is injective
//! and stable across restarts by construction. Ids outside the OCPI grammar
//! are rejected rather than rewritten, since any rewrite could collide.

use crate::domain::network::{DomainConnectorId, DomainEvseId, EntityKind, PoolId};
use crate::domain::ocpi::{ConnectorId, EvseUid, LocationId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    #[error("{kind} id {id:?} cannot be represented as an OCPI identifier")]
    UnmappableIdentifier { kind: &'static str, id: String },
}

fn unmappable(kind: &'static str, id: &str) -> MappingError {
    MappingError::UnmappableIdentifier {
        kind,
        id: id.to_string(),
    }
}

pub fn to_location_id(pool: &PoolId) -> Result<LocationId, MappingError> {
    LocationId::parse(pool.as_str()).ok_or_else(|| unmappable(EntityKind::Pool.as_str(), pool.as_str()))
}

pub fn to_evse_uid(evse: &DomainEvseId) -> Result<EvseUid, MappingError> {
    EvseUid::parse(evse.as_str()).ok_or_else(|| unmappable(EntityKind::Evse.as_str(), evse.as_str()))
}

pub fn to_connector_id(connector: &DomainConnectorId) -> Result<ConnectorId, MappingError> {
    ConnectorId::parse(connector.as_str()).ok_or_else(|| unmappable("connector", connector.as_str()))
}

pub fn from_location_id(id: &LocationId) -> PoolId {
    PoolId::new(id.as_str())
}

pub fn from_evse_uid(uid: &EvseUid) -> DomainEvseId {
    DomainEvseId::new(uid.as_str())
}

pub fn from_connector_id(id: &ConnectorId) -> DomainConnectorId {
    DomainConnectorId::new(id.as_str())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn distinct_evse_ids_map_to_distinct_uids() {
        let ids: Vec<DomainEvseId> = (0..500)
            .flat_map(|i| {
                [
                    DomainEvseId::new(format!("DE*GEF*E{i}")),
                    DomainEvseId::new(format!("DE*GEF*E{i}*1")),
                    DomainEvseId::new(format!("de*gef*e{i}")),
                ]
            })
            .collect();
        let uids: HashSet<_> = ids.iter().map(|id| to_evse_uid(id).unwrap()).collect();
        assert_eq!(uids.len(), ids.len());
    }

    #[test]
    fn mapping_is_deterministic_and_invertible() {
        let pool = PoolId::new("DE*GEF*P1");
        let first = to_location_id(&pool).unwrap();
        assert_eq!(first, to_location_id(&pool).unwrap());
        assert_eq!(from_location_id(&first), pool);

        let evse = DomainEvseId::new("DE*GEF*E1*1");
        assert_eq!(from_evse_uid(&to_evse_uid(&evse).unwrap()), evse);

        let connector = DomainConnectorId::new("2");
        assert_eq!(from_connector_id(&to_connector_id(&connector).unwrap()), connector);
    }

    #[test]
    fn out_of_grammar_ids_are_unmappable() {
        let err = to_location_id(&PoolId::new("Pool with spaces")).unwrap_err();
        assert_eq!(
            err,
            MappingError::UnmappableIdentifier {
                kind: "pool",
                id: "Pool with spaces".to_string()
            }
        );
        assert!(to_evse_uid(&DomainEvseId::new("x".repeat(37))).is_err());
        assert!(to_connector_id(&DomainConnectorId::new("")).is_err());
    }
}
