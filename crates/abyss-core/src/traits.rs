//! Trait interfaces between the abyss crates:
//! - [`Clock`]: source of wall-clock time, injected so tests control it
//! - [`CurseEventSink`]: outbound event channel from the engine
//! - [`ExemptionSet`]: runtime-exempt entity ids
//! - [`CurseStore`]: persisted per-entity state (abyss-node implements)

use std::collections::BTreeSet;

use crate::error::StorageError;
use crate::events::CurseEvent;
use crate::types::{CurseSnapshot, EntityId, Timestamp};

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Receiver of engine events.
///
/// Implementations must not block; the engine calls this while holding the
/// entity's lock.
pub trait CurseEventSink {
    fn emit(&mut self, event: CurseEvent);
}

impl CurseEventSink for Vec<CurseEvent> {
    fn emit(&mut self, event: CurseEvent) {
        self.push(event);
    }
}

/// Membership test for exempt entity ids.
pub trait ExemptionSet: Send + Sync {
    fn is_exempt(&self, id: &EntityId) -> bool;
}

impl ExemptionSet for BTreeSet<EntityId> {
    fn is_exempt(&self, id: &EntityId) -> bool {
        self.contains(id)
    }
}

/// Persistent storage of curse snapshots and runtime exemption grants.
///
/// Calls may block on I/O; the node runs them off the sampling path.
pub trait CurseStore: Send + Sync {
    /// Load a snapshot. `Ok(None)` if the entity was never saved.
    fn load(&self, id: &EntityId) -> Result<Option<CurseSnapshot>, StorageError>;

    fn save(&self, id: &EntityId, snapshot: &CurseSnapshot) -> Result<(), StorageError>;

    /// All ids granted exemption at runtime.
    fn load_exemptions(&self) -> Result<Vec<EntityId>, StorageError>;

    fn save_exemption(&self, id: &EntityId) -> Result<(), StorageError>;

    fn remove_exemption(&self, id: &EntityId) -> Result<(), StorageError>;

    /// Flush buffered writes. Default: nothing to flush.
    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
