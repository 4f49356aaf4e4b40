//! Inclusion filters applied to projected Locations
//!
//! The adapter-wide filter decides what enters the store at all; a party's
//! own filter further narrows what that party reads and receives by push.

use crate::application::mapping::{from_evse_uid, from_location_id};
use crate::domain::ocpi::Location;

pub use crate::domain::network::InclusionFilter;

/// Narrow a stored Location to what `filter` lets through. `None` when the
/// whole Location (its pool) is filtered out.
pub fn restrict_location(location: &Location, filter: &InclusionFilter) -> Option<Location> {
    if filter.is_allow_all() {
        return Some(location.clone());
    }
    let pool = from_location_id(&location.id);
    if !filter.allows_pool(&pool) {
        return None;
    }
    let mut restricted = location.clone();
    restricted
        .evses
        .retain(|evse| filter.allows_evse(&pool, &from_evse_uid(&evse.uid)));
    if restricted.evses.len() != location.evses.len() {
        restricted.refresh_hash();
    }
    Some(restricted)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::domain::network::{DomainEvseId, PoolId};
    use crate::domain::ocpi::location::fixtures::{evse, location};
    use crate::domain::ocpi::PartyScope;

    fn site() -> Location {
        let owner = PartyScope::parse("DE", "GEF").unwrap();
        location(&owner, "P1", vec![evse("E1"), evse("E2")])
    }

    #[test]
    fn allow_all_keeps_the_location_untouched() {
        let site = site();
        assert_eq!(restrict_location(&site, &InclusionFilter::allow_all()), Some(site));
    }

    #[test]
    fn excluded_evses_are_hidden() {
        let filter = InclusionFilter {
            exclude_evses: BTreeSet::from([DomainEvseId::new("E2")]),
            ..Default::default()
        };
        let restricted = restrict_location(&site(), &filter).unwrap();
        assert_eq!(restricted.evses.len(), 1);
        assert_eq!(restricted.evses[0].uid.as_str(), "E1");
    }

    #[test]
    fn excluded_pool_hides_the_location() {
        let filter = InclusionFilter {
            exclude_pools: BTreeSet::from([PoolId::new("P1")]),
            ..Default::default()
        };
        assert!(restrict_location(&site(), &filter).is_none());
    }
}
