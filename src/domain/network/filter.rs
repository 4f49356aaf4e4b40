//! Inclusion filters deciding which parts of the network are roamed

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::model::{DomainEvseId, PoolId};

/// Allow-list / exclude-list predicate over pools and EVSEs.
///
/// An empty include list means "everything". Exclusions always win.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InclusionFilter {
    pub include_pools: BTreeSet<PoolId>,
    pub exclude_pools: BTreeSet<PoolId>,
    pub include_evses: BTreeSet<DomainEvseId>,
    pub exclude_evses: BTreeSet<DomainEvseId>,
}

impl InclusionFilter {
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn is_allow_all(&self) -> bool {
        self == &Self::default()
    }

    pub fn allows_pool(&self, pool: &PoolId) -> bool {
        !self.exclude_pools.contains(pool)
            && (self.include_pools.is_empty() || self.include_pools.contains(pool))
    }

    pub fn allows_evse(&self, pool: &PoolId, evse: &DomainEvseId) -> bool {
        self.allows_pool(pool)
            && !self.exclude_evses.contains(evse)
            && (self.include_evses.is_empty() || self.include_evses.contains(evse))
    }
}
