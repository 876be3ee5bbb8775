//! Narehate conversion: a slow, independent exposure process.
//!
//! While an entity carries the deep-curse debuff inside the region, a
//! stopwatch runs. Each check after the first draws one Bernoulli trial with
//! `p = cap_p * (1 - e^(-6 * min(t, T) / T))`. Checks redraw independently
//! with the current `p`; there is no hazard-rate integration across checks.
//! Leaving the condition resets the stopwatch to zero.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info};

use abyss_core::constants::NAREHATE_STEEPNESS;
use abyss_core::events::CurseEvent;
use abyss_core::traits::CurseEventSink;
use abyss_core::types::{Narehate, NarehateVariant, Position, Timestamp};

use crate::classifier::RegionClassifier;
use crate::exemption::ExemptionRegistry;
use crate::state::EntityCurseState;

/// Conversion probability after `exposure` of continuous deep exposure.
///
/// Rises exponentially and clamps to exactly `cap_probability` once
/// `exposure >= cap`. A zero `cap` means the cap is reached immediately.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use abyss_curse::conversion_probability;
///
/// let cap = Duration::from_secs(600);
/// assert_eq!(conversion_probability(Duration::ZERO, cap, 0.5), 0.0);
/// assert_eq!(conversion_probability(Duration::from_secs(900), cap, 0.5), 0.5);
/// ```
pub fn conversion_probability(exposure: Duration, cap: Duration, cap_probability: f64) -> f64 {
    if exposure >= cap {
        return cap_probability;
    }
    let t = exposure.as_secs_f64() / cap.as_secs_f64();
    cap_probability * (1.0 - (-NAREHATE_STEEPNESS * t).exp())
}

/// Result of one narehate check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NarehateOutcome {
    /// Already converted; nothing to do.
    AlreadyConverted,
    /// Precondition false. `reset` is true if a running stopwatch was cleared.
    NotExposed { reset: bool },
    /// Stopwatch started this check; no draw.
    ExposureStarted,
    /// Drew and failed.
    Survived { probability: f64 },
    Converted(NarehateVariant),
}

/// Runs narehate checks and records conversions in the exemption registry.
#[derive(Debug, Clone)]
pub struct NarehateConverter {
    cap: Duration,
    cap_probability: f64,
    registry: Arc<ExemptionRegistry>,
}

impl NarehateConverter {
    pub fn new(cap: Duration, cap_probability: f64, registry: Arc<ExemptionRegistry>) -> Self {
        Self { cap, cap_probability, registry }
    }

    pub fn cap(&self) -> Duration {
        self.cap
    }

    pub fn cap_probability(&self) -> f64 {
        self.cap_probability
    }

    pub fn registry(&self) -> &Arc<ExemptionRegistry> {
        &self.registry
    }

    pub fn probability(&self, exposure: Duration) -> f64 {
        conversion_probability(exposure, self.cap, self.cap_probability)
    }

    /// One check. `has_deep_debuff` is the host-observed debuff flag, not the
    /// curse layer, so effect-removal races do not matter.
    #[allow(clippy::too_many_arguments)]
    pub fn check<R: Rng + ?Sized>(
        &self,
        state: &mut EntityCurseState,
        classifier: &RegionClassifier,
        pos: &Position,
        has_deep_debuff: bool,
        now: Timestamp,
        rng: &mut R,
        sink: &mut impl CurseEventSink,
    ) -> NarehateOutcome {
        if state.narehate.is_converted() {
            return NarehateOutcome::AlreadyConverted;
        }

        if !state.alive || !has_deep_debuff || !classifier.is_in_region(pos) {
            let reset = state.deep_exposure_start.take().is_some();
            if reset {
                debug!(entity = %state.id, "deep exposure interrupted");
            }
            return NarehateOutcome::NotExposed { reset };
        }

        let Some(start) = state.deep_exposure_start else {
            state.deep_exposure_start = Some(now);
            debug!(entity = %state.id, "deep exposure started");
            return NarehateOutcome::ExposureStarted;
        };

        let exposure = start.elapsed_until(now);
        let probability = self.probability(exposure);
        if rng.r#gen::<f64>() >= probability {
            debug!(
                entity = %state.id,
                exposure_secs = exposure.as_secs(),
                probability,
                "narehate draw failed"
            );
            return NarehateOutcome::Survived { probability };
        }

        let variant = if rng.gen_bool(0.5) { NarehateVariant::Lucky } else { NarehateVariant::Sad };
        self.convert(state, variant, sink);
        info!(
            entity = %state.id,
            %variant,
            exposure_secs = exposure.as_secs(),
            probability,
            "entity converted to narehate"
        );
        NarehateOutcome::Converted(variant)
    }

    /// Apply a conversion: clear every curse, mark the variant and grant
    /// exemption.
    pub fn convert(
        &self,
        state: &mut EntityCurseState,
        variant: NarehateVariant,
        sink: &mut impl CurseEventSink,
    ) {
        state.curse = None;
        sink.emit(CurseEvent::RemoveCurseEffects { entity: state.id });
        sink.emit(CurseEvent::StopAmbientSound { entity: state.id });

        state.narehate = Narehate::Converted(variant);
        state.deep_exposure_start = None;

        self.registry.grant(state.id);
        sink.emit(CurseEvent::ExemptionGranted { entity: state.id });
        sink.emit(CurseEvent::NarehateConverted { entity: state.id, variant });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use abyss_core::region::{RegionConfig, RegionMode};
    use abyss_core::types::{ActiveCurse, EntityId};
    use proptest::prelude::*;
    use rand::rngs::mock::StepRng;

    const CAP: Duration = Duration::from_secs(600);
    const T0: Timestamp = Timestamp(5_000_000);

    fn setup() -> (NarehateConverter, RegionClassifier, EntityCurseState) {
        let registry = Arc::new(ExemptionRegistry::new());
        let config = RegionConfig { mode: RegionMode::Bounded, radius: 10, ..RegionConfig::default() };
        let classifier = RegionClassifier::new(Arc::new(config), registry.clone());
        let converter = NarehateConverter::new(CAP, 0.5, registry);
        let state = EntityCurseState::new(EntityId::from_u128(1), -40.0, Duration::from_secs(1200));
        (converter, classifier, state)
    }

    fn deep() -> Position {
        Position::new(0.0, -40.0, 0.0)
    }

    fn always() -> StepRng {
        StepRng::new(0, 0)
    }

    fn never() -> StepRng {
        StepRng::new(u64::MAX, 0)
    }

    #[test]
    fn probability_bounds() {
        let p = conversion_probability(CAP - Duration::from_millis(1), CAP, 0.5);
        assert!((p - 0.5 * (1.0 - (-6.0f64).exp())).abs() < 1e-6);
        assert!((p - 0.4988).abs() < 1e-4);
        assert_eq!(conversion_probability(CAP, CAP, 0.5), 0.5);
        assert_eq!(conversion_probability(CAP * 3, CAP, 0.5), 0.5);
        assert_eq!(conversion_probability(Duration::from_secs(1), Duration::ZERO, 0.5), 0.5);
    }

    #[test]
    fn first_exposure_only_starts_the_stopwatch() {
        let (conv, cls, mut s) = setup();
        let mut events = Vec::new();
        let outcome = conv.check(&mut s, &cls, &deep(), true, T0, &mut always(), &mut events);
        assert_eq!(outcome, NarehateOutcome::ExposureStarted);
        assert_eq!(s.deep_exposure_start, Some(T0));
        assert!(events.is_empty());
    }

    #[test]
    fn losing_the_debuff_resets_the_stopwatch() {
        let (conv, cls, mut s) = setup();
        let mut events = Vec::new();
        conv.check(&mut s, &cls, &deep(), true, T0, &mut never(), &mut events);
        let outcome = conv.check(&mut s, &cls, &deep(), false, T0, &mut never(), &mut events);
        assert_eq!(outcome, NarehateOutcome::NotExposed { reset: true });
        assert_eq!(s.deep_exposure_start, None);
        let outcome = conv.check(&mut s, &cls, &deep(), false, T0, &mut never(), &mut events);
        assert_eq!(outcome, NarehateOutcome::NotExposed { reset: false });
    }

    #[test]
    fn leaving_the_region_resets_the_stopwatch() {
        let (conv, cls, mut s) = setup();
        let mut events = Vec::new();
        conv.check(&mut s, &cls, &deep(), true, T0, &mut never(), &mut events);
        let far = Position::new(5_000.0, -40.0, 0.0);
        let outcome = conv.check(&mut s, &cls, &far, true, T0, &mut never(), &mut events);
        assert_eq!(outcome, NarehateOutcome::NotExposed { reset: true });
    }

    #[test]
    fn failed_draw_keeps_exposure_running() {
        let (conv, cls, mut s) = setup();
        let mut events = Vec::new();
        conv.check(&mut s, &cls, &deep(), true, T0, &mut never(), &mut events);
        let later = T0.saturating_add(Duration::from_secs(60));
        let outcome = conv.check(&mut s, &cls, &deep(), true, later, &mut never(), &mut events);
        let NarehateOutcome::Survived { probability } = outcome else {
            panic!("expected survival, got {outcome:?}");
        };
        assert!((probability - 0.5 * (1.0 - (-0.6f64).exp())).abs() < 1e-12);
        assert_eq!(s.deep_exposure_start, Some(T0));
        assert!(!s.narehate.is_converted());
    }

    #[test]
    fn successful_draw_converts_and_exempts() {
        let (conv, cls, mut s) = setup();
        s.curse = Some(ActiveCurse { layer: 6, started_at: T0, duration_ticks: 12_000, arm: 0 });
        let mut events = Vec::new();
        conv.check(&mut s, &cls, &deep(), true, T0, &mut always(), &mut events);
        let later = T0.saturating_add(Duration::from_secs(60));
        let outcome = conv.check(&mut s, &cls, &deep(), true, later, &mut always(), &mut events);

        assert_eq!(outcome, NarehateOutcome::Converted(NarehateVariant::Lucky));
        assert_eq!(s.narehate, Narehate::Converted(NarehateVariant::Lucky));
        assert!(s.curse.is_none());
        assert_eq!(s.deep_exposure_start, None);
        assert!(conv.registry().contains(&s.id));
        assert!(!cls.is_affected_by_curse(&deep(), &s.id));
        assert_eq!(
            events,
            vec![
                CurseEvent::RemoveCurseEffects { entity: s.id },
                CurseEvent::StopAmbientSound { entity: s.id },
                CurseEvent::ExemptionGranted { entity: s.id },
                CurseEvent::NarehateConverted { entity: s.id, variant: NarehateVariant::Lucky },
            ]
        );

        events.clear();
        let outcome = conv.check(&mut s, &cls, &deep(), true, later, &mut always(), &mut events);
        assert_eq!(outcome, NarehateOutcome::AlreadyConverted);
        assert!(events.is_empty());
    }

    #[test]
    fn zero_exposure_never_converts() {
        let (conv, cls, mut s) = setup();
        let mut events = Vec::new();
        conv.check(&mut s, &cls, &deep(), true, T0, &mut always(), &mut events);
        // Same instant: p == 0, and a zero draw is not below zero.
        let outcome = conv.check(&mut s, &cls, &deep(), true, T0, &mut always(), &mut events);
        assert_eq!(outcome, NarehateOutcome::Survived { probability: 0.0 });
    }

    #[test]
    fn dead_entities_are_not_exposed() {
        let (conv, cls, mut s) = setup();
        s.alive = false;
        let mut events = Vec::new();
        let outcome = conv.check(&mut s, &cls, &deep(), true, T0, &mut always(), &mut events);
        assert_eq!(outcome, NarehateOutcome::NotExposed { reset: false });
    }

    proptest! {
        #[test]
        fn probability_is_bounded_and_monotone(a in 0u64..1_200_000, b in 0u64..1_200_000, cap_p in 0.0f64..=1.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let p_lo = conversion_probability(Duration::from_millis(lo), CAP, cap_p);
            let p_hi = conversion_probability(Duration::from_millis(hi), CAP, cap_p);
            prop_assert!(p_lo >= 0.0 && p_hi <= cap_p);
            prop_assert!(p_lo <= p_hi);
        }
    }
}
