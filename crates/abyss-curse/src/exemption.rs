//! Runtime exemption registry.
//!
//! Ids granted exemption while the process runs (narehate conversion, admin
//! grants). Statically configured ids live in [`RegionConfig::exempt_ids`]
//! and survive reloads separately.
//!
//! [`RegionConfig::exempt_ids`]: abyss_core::region::RegionConfig::exempt_ids

use dashmap::DashSet;
use tracing::debug;

use abyss_core::traits::ExemptionSet;
use abyss_core::types::EntityId;

/// Concurrent set of runtime-exempt entity ids.
#[derive(Debug, Default)]
pub struct ExemptionRegistry {
    ids: DashSet<EntityId>,
}

impl ExemptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from persisted grants.
    pub fn from_ids(ids: impl IntoIterator<Item = EntityId>) -> Self {
        let registry = Self::new();
        for id in ids {
            registry.ids.insert(id);
        }
        registry
    }

    /// Returns `true` if `id` was not already exempt.
    pub fn grant(&self, id: EntityId) -> bool {
        let added = self.ids.insert(id);
        if added {
            debug!(entity = %id, "exemption granted");
        }
        added
    }

    /// Returns `true` if `id` was exempt.
    pub fn revoke(&self, id: &EntityId) -> bool {
        let removed = self.ids.remove(id).is_some();
        if removed {
            debug!(entity = %id, "exemption revoked");
        }
        removed
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.ids.contains(id)
    }

    /// Sorted copy of all granted ids.
    pub fn list(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.ids.iter().map(|r| *r).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl ExemptionSet for ExemptionRegistry {
    fn is_exempt(&self, id: &EntityId) -> bool {
        self.contains(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_and_revoke() {
        let reg = ExemptionRegistry::new();
        let id = EntityId::from_u128(1);
        assert!(!reg.is_exempt(&id));
        assert!(reg.grant(id));
        assert!(!reg.grant(id));
        assert!(reg.is_exempt(&id));
        assert!(reg.revoke(&id));
        assert!(!reg.revoke(&id));
        assert!(reg.is_empty());
    }

    #[test]
    fn list_is_sorted() {
        let reg = ExemptionRegistry::from_ids([3, 1, 2].map(EntityId::from_u128));
        assert_eq!(reg.list(), [1, 2, 3].map(EntityId::from_u128).to_vec());
        assert_eq!(reg.len(), 3);
    }
}
