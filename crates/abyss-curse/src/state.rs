//! Per-entity curse state and its persisted form.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use abyss_core::constants::NO_LAYER;
use abyss_core::types::{ActiveCurse, CurseSnapshot, EntityId, Narehate, Timestamp};

use crate::rise::RiseAccumulator;

/// Everything the engine tracks for one entity.
///
/// Mutated only under the entity's lock. The rise window is shared behind an
/// `Arc` so readers can inspect it without that lock.
#[derive(Debug)]
pub struct EntityCurseState {
    pub id: EntityId,
    /// Height a triggered curse is classified by.
    pub safe_height: f64,
    pub last_sampled_y: f64,
    pub rise: Arc<RiseAccumulator>,
    /// `Some` exactly while the curse is ACTIVE.
    pub curse: Option<ActiveCurse>,
    pub narehate: Narehate,
    /// Running stopwatch for narehate eligibility.
    pub deep_exposure_start: Option<Timestamp>,
    /// Cleared on death, set on respawn and join. Not persisted.
    pub alive: bool,
}

impl EntityCurseState {
    /// Fresh DORMANT state anchored at height `y`.
    pub fn new(id: EntityId, y: f64, rise_window: Duration) -> Self {
        Self {
            id,
            safe_height: y,
            last_sampled_y: y,
            rise: Arc::new(RiseAccumulator::new(rise_window)),
            curse: None,
            narehate: Narehate::None,
            deep_exposure_start: None,
            alive: true,
        }
    }

    /// Restore from a persisted snapshot. Incomplete curse data is logged
    /// and normalized to DORMANT.
    pub fn from_snapshot(id: EntityId, snapshot: &CurseSnapshot, rise_window: Duration) -> Self {
        let curse = match snapshot.active_curse() {
            Ok(curse) => curse,
            Err(()) => {
                warn!(
                    entity = %id,
                    layer = snapshot.current_layer,
                    start_ms = snapshot.curse_start_ms,
                    duration_ticks = snapshot.curse_duration_ticks,
                    "incomplete curse data, resetting to dormant"
                );
                None
            }
        };
        Self {
            id,
            safe_height: snapshot.safe_height,
            last_sampled_y: snapshot.last_y,
            rise: Arc::new(RiseAccumulator::new(rise_window)),
            curse,
            narehate: snapshot.narehate,
            deep_exposure_start: None,
            alive: true,
        }
    }

    /// Owned copy for persistence.
    pub fn snapshot(&self) -> CurseSnapshot {
        let (current_layer, curse_start_ms, curse_duration_ticks, curse_arm) = match &self.curse {
            Some(c) => (c.layer, c.started_at.as_millis(), c.duration_ticks, c.arm),
            None => (NO_LAYER, 0, 0, 0),
        };
        CurseSnapshot {
            safe_height: self.safe_height,
            last_y: self.last_sampled_y,
            current_layer,
            curse_start_ms,
            curse_duration_ticks,
            curse_arm,
            narehate: self.narehate,
        }
    }

    /// 0 when DORMANT.
    pub fn current_layer(&self) -> u8 {
        self.curse.map_or(NO_LAYER, |c| c.layer)
    }

    pub fn is_active(&self) -> bool {
        self.curse.is_some()
    }

    /// Drop the rise window and anchor both heights at `y`.
    pub fn reanchor(&mut self, y: f64) {
        self.rise.clear();
        self.safe_height = y;
        self.last_sampled_y = y;
    }
}
