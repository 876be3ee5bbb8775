//! The per-entity curse state machine.
//!
//! Two states: DORMANT (`curse == None`) and ACTIVE. Transitions:
//! - sample step crossing the rise threshold → **trigger** (ACTIVE, or
//!   overwrite of a running curse)
//! - expiry check past the duration → **expire** (DORMANT)
//! - death, respawn and join interrupts, which bypass the sampler
//!
//! Every operation takes the entity state by `&mut`, so the caller's lock is
//! the single-writer guarantee. Side effects leave through a
//! [`CurseEventSink`].

use tracing::{debug, info};

use abyss_core::constants::{
    AMBIENT_SOUND_LAYER, BASE_CURSE_DURATION_TICKS, CHAT_LOCK_LAYER, INTERACTION_LOCK_LAYER,
    NO_LAYER, RISE_EPSILON, RISE_PAID_OFF_EPSILON, TERMINAL_LAYER,
};
use abyss_core::events::CurseEvent;
use abyss_core::traits::CurseEventSink;
use abyss_core::types::{ActiveCurse, Position, Timestamp};

use crate::classifier::RegionClassifier;
use crate::state::EntityCurseState;

/// Curse duration in ticks for a trigger at `arm` chunks from the center.
///
/// Linear from the full base duration at the center down to zero at the
/// boundary. A non-positive radius falls back to the base duration.
///
/// # Examples
///
/// ```
/// use abyss_curse::calc_duration;
/// assert_eq!(calc_duration(4, 10), 7_200);
/// assert_eq!(calc_duration(10, 10), 0);
/// assert_eq!(calc_duration(3, 0), 12_000);
/// ```
pub fn calc_duration(arm: i64, radius: i64) -> u64 {
    if radius <= 0 {
        return BASE_CURSE_DURATION_TICKS;
    }
    let scaled = BASE_CURSE_DURATION_TICKS as i128 * (radius as i128 - arm as i128);
    (scaled / radius as i128).clamp(0, BASE_CURSE_DURATION_TICKS as i128) as u64
}

/// What one sample step did. Mostly useful to tests and trace logs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleOutcome {
    /// Outside the region, exempt, or in an exemption zone.
    Unaffected,
    /// Movement below the jitter threshold.
    Steady,
    Rose { total: f64 },
    Descended { total: f64 },
    Triggered(ActiveCurse),
    /// Threshold crossed but the safe height is in no band.
    TriggerDiscarded,
}

/// Stateless driver over a [`RegionClassifier`] snapshot.
#[derive(Debug, Clone)]
pub struct CurseStateMachine {
    classifier: RegionClassifier,
}

impl CurseStateMachine {
    pub fn new(classifier: RegionClassifier) -> Self {
        Self { classifier }
    }

    pub fn classifier(&self) -> &RegionClassifier {
        &self.classifier
    }

    /// One sampler tick for an entity at `pos`.
    pub fn sample(
        &self,
        state: &mut EntityCurseState,
        pos: &Position,
        now: Timestamp,
        sink: &mut impl CurseEventSink,
    ) -> SampleOutcome {
        let y = pos.y;
        sink.emit(CurseEvent::LayerDisplay {
            entity: state.id,
            layer: self.classifier.display_layer(pos),
        });

        if !self.classifier.is_affected_by_curse(pos, &state.id) {
            state.last_sampled_y = y;
            return SampleOutcome::Unaffected;
        }

        let threshold = self.classifier.config().rise_threshold;
        let delta = y - state.last_sampled_y;
        let mut outcome = SampleOutcome::Steady;

        if delta >= RISE_EPSILON {
            state.rise.add_rise(now, delta);
            let total = state.rise.total(now);
            outcome = SampleOutcome::Rose { total };
            if total >= threshold {
                outcome = match self.trigger(state, pos, now, sink) {
                    Some(curse) => SampleOutcome::Triggered(curse),
                    None => SampleOutcome::TriggerDiscarded,
                };
                state.rise.clear();
                state.safe_height = y;
            }
        } else if -delta >= RISE_EPSILON {
            state.rise.consume(now, -delta);
            state.safe_height = y;
            outcome = SampleOutcome::Descended { total: state.rise.total(now) };
        }

        if state.rise.total(now) <= RISE_PAID_OFF_EPSILON && state.safe_height != y {
            state.safe_height = y;
        }
        state.last_sampled_y = y;
        outcome
    }

    /// Activate a curse classified by the entity's safe height.
    ///
    /// Returns `None` without touching the state when the safe height falls
    /// in no band. A running curse is overwritten.
    pub fn trigger(
        &self,
        state: &mut EntityCurseState,
        pos: &Position,
        now: Timestamp,
        sink: &mut impl CurseEventSink,
    ) -> Option<ActiveCurse> {
        let layer = self.classifier.layer_by_height(state.safe_height);
        if layer == NO_LAYER {
            debug!(entity = %state.id, safe_height = state.safe_height, "rise threshold crossed outside every band");
            return None;
        }

        let arm = self.classifier.arm_of_curse(pos);
        let duration_ticks = calc_duration(arm, self.classifier.config().radius);
        let curse = ActiveCurse { layer, started_at: now, duration_ticks, arm };
        let previous = state.curse.replace(curse);
        let ambient_running = previous.is_some_and(|p| p.layer == AMBIENT_SOUND_LAYER);

        if ambient_running && layer != AMBIENT_SOUND_LAYER {
            sink.emit(CurseEvent::StopAmbientSound { entity: state.id });
        }
        sink.emit(CurseEvent::CurseTriggered { entity: state.id, layer, duration_ticks, arm });
        sink.emit(CurseEvent::PlayTriggerSound { entity: state.id });
        if layer == AMBIENT_SOUND_LAYER && !ambient_running {
            sink.emit(CurseEvent::StartAmbientSound { entity: state.id });
        }

        info!(
            entity = %state.id,
            layer,
            safe_height = state.safe_height,
            duration_ticks,
            arm,
            retrigger = previous.is_some(),
            "curse triggered"
        );
        Some(curse)
    }

    /// Expire the curse if its duration has elapsed. Returns the expired layer.
    pub fn check_expiry(
        &self,
        state: &mut EntityCurseState,
        now: Timestamp,
        sink: &mut impl CurseEventSink,
    ) -> Option<u8> {
        match state.curse {
            Some(curse) if curse.is_expired(now) => self.expire(state, sink),
            _ => None,
        }
    }

    /// End the running curse and return to DORMANT. Layer 7 kills a living
    /// entity; layer 3 stops its ambient sound.
    pub fn expire(&self, state: &mut EntityCurseState, sink: &mut impl CurseEventSink) -> Option<u8> {
        let curse = state.curse.take()?;
        if curse.layer == TERMINAL_LAYER && state.alive {
            sink.emit(CurseEvent::ForceKill { entity: state.id });
        }
        if curse.layer == AMBIENT_SOUND_LAYER {
            sink.emit(CurseEvent::StopAmbientSound { entity: state.id });
        }
        sink.emit(CurseEvent::RemoveCurseEffects { entity: state.id });
        sink.emit(CurseEvent::CurseExpired { entity: state.id, layer: curse.layer });
        info!(entity = %state.id, layer = curse.layer, "curse expired");
        Some(curse.layer)
    }

    /// Death interrupt. Returns whether the entity died while a curse was
    /// still within its duration.
    pub fn on_death(
        &self,
        state: &mut EntityCurseState,
        death_y: f64,
        now: Timestamp,
        sink: &mut impl CurseEventSink,
    ) -> bool {
        let curse = state.curse.take();
        let from_curse = curse.is_some_and(|c| !c.is_expired(now));

        sink.emit(CurseEvent::DeathResolved { entity: state.id, from_curse });
        if curse.is_some_and(|c| c.layer == AMBIENT_SOUND_LAYER) {
            sink.emit(CurseEvent::StopAmbientSound { entity: state.id });
        }
        sink.emit(CurseEvent::RemoveCurseEffects { entity: state.id });

        state.reanchor(death_y);
        state.alive = false;

        if from_curse {
            info!(entity = %state.id, layer = curse.map_or(NO_LAYER, |c| c.layer), "entity died from curse");
        } else {
            debug!(entity = %state.id, "entity died");
        }
        from_curse
    }

    /// Respawn interrupt. Curse fields were already cleared by the death.
    pub fn on_respawn(&self, state: &mut EntityCurseState, respawn_y: f64) {
        state.reanchor(respawn_y);
        state.alive = true;
        debug!(entity = %state.id, respawn_y, "entity respawned");
    }

    /// Join or reconnect. A curse that ran out while the entity was away
    /// expires now; otherwise it resumes without re-triggering.
    pub fn on_join(
        &self,
        state: &mut EntityCurseState,
        pos: &Position,
        now: Timestamp,
        sink: &mut impl CurseEventSink,
    ) {
        state.alive = true;
        self.check_expiry(state, now, sink);

        if state.safe_height == 0.0 && pos.y != 0.0 {
            state.safe_height = pos.y;
        }
        state.last_sampled_y = pos.y;
        state.rise.clear();

        if let Some(variant) = state.narehate.variant() {
            sink.emit(CurseEvent::NarehateRestored { entity: state.id, variant });
        }
        sink.emit(CurseEvent::LayerDisplay {
            entity: state.id,
            layer: self.classifier.display_layer(pos),
        });
        debug!(entity = %state.id, y = pos.y, layer = state.current_layer(), "entity joined");
    }

    /// Quit. Clears the display so it does not keep a stale layer.
    pub fn on_quit(&self, state: &EntityCurseState, sink: &mut impl CurseEventSink) {
        sink.emit(CurseEvent::LayerDisplay { entity: state.id, layer: NO_LAYER });
    }

    /// Whether a running curse of layer 5 or deeper currently blocks
    /// item use. An expired curse is expired on the spot instead.
    pub fn restricts_interaction(
        &self,
        state: &mut EntityCurseState,
        now: Timestamp,
        sink: &mut impl CurseEventSink,
    ) -> bool {
        match state.curse {
            None => false,
            Some(curse) if curse.is_expired(now) => {
                self.expire(state, sink);
                false
            }
            Some(curse) => curse.layer >= INTERACTION_LOCK_LAYER,
        }
    }

    /// Whether chat is blocked: in the region at layer 6 or deeper by
    /// current height, curse or not.
    pub fn restricts_chat(&self, pos: &Position) -> bool {
        self.classifier.is_in_region(pos)
            && self.classifier.layer_by_height(pos.y) >= CHAT_LOCK_LAYER
    }
}
