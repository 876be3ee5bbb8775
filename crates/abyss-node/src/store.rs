//! In-memory store of tracked entities.
//!
//! One `parking_lot::Mutex` per entity serializes the sampler, expiry,
//! narehate and interrupt steps for that entity. Different entities never
//! contend.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use abyss_core::types::{CurseSnapshot, EntityId};
use abyss_curse::EntityCurseState;

/// Handle to one entity's state.
pub type SharedState = Arc<Mutex<EntityCurseState>>;

#[derive(Debug, Default)]
pub struct EntityStore {
    entities: DashMap<EntityId, SharedState>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &EntityId) -> Option<SharedState> {
        self.entities.get(id).map(|r| Arc::clone(r.value()))
    }

    /// Insert or replace, returning the stored handle.
    pub fn put(&self, state: EntityCurseState) -> SharedState {
        let id = state.id;
        let shared = Arc::new(Mutex::new(state));
        self.entities.insert(id, Arc::clone(&shared));
        shared
    }

    pub fn delete(&self, id: &EntityId) -> Option<SharedState> {
        self.entities.remove(id).map(|(_, state)| state)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    pub fn ids(&self) -> Vec<EntityId> {
        self.entities.iter().map(|r| *r.key()).collect()
    }

    /// All handles. Map shards are released before the caller locks any
    /// entity.
    pub fn handles(&self) -> Vec<SharedState> {
        self.entities.iter().map(|r| Arc::clone(r.value())).collect()
    }

    /// Owned snapshots of every tracked entity, for persistence.
    pub fn snapshots(&self) -> Vec<(EntityId, CurseSnapshot)> {
        self.handles()
            .into_iter()
            .map(|handle| {
                let state = handle.lock();
                (state.id, state.snapshot())
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
