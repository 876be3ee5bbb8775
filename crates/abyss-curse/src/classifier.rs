//! Region geometry: height to layer, Chebyshev chunk containment, curse arm
//! and exemption checks.
//!
//! Every function here is total. Out-of-range inputs resolve to layer 0 or
//! [`ARM_UNBOUNDED`] instead of failing.

use std::sync::Arc;

use abyss_core::constants::{ARM_UNBOUNDED, CHUNK_SHIFT, NO_LAYER};
use abyss_core::region::{RegionConfig, RegionMode};
use abyss_core::traits::ExemptionSet;
use abyss_core::types::{Dimension, EntityId, Position};

/// Classifier over one immutable [`RegionConfig`] snapshot plus the runtime
/// exemption set.
///
/// Cloning is cheap; a config reload builds a new classifier with the same
/// exemption set.
#[derive(Clone)]
pub struct RegionClassifier {
    config: Arc<RegionConfig>,
    exemptions: Arc<dyn ExemptionSet>,
}

impl std::fmt::Debug for RegionClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionClassifier")
            .field("mode", &self.config.mode)
            .field("radius", &self.config.radius)
            .finish_non_exhaustive()
    }
}

impl RegionClassifier {
    pub fn new(config: Arc<RegionConfig>, exemptions: Arc<dyn ExemptionSet>) -> Self {
        Self { config, exemptions }
    }

    pub fn config(&self) -> &Arc<RegionConfig> {
        &self.config
    }

    pub fn exemptions(&self) -> &Arc<dyn ExemptionSet> {
        &self.exemptions
    }

    /// Same exemption set, new config snapshot.
    pub fn with_config(&self, config: Arc<RegionConfig>) -> Self {
        Self { config, exemptions: Arc::clone(&self.exemptions) }
    }

    /// Layer of the first configured band, scanning layer 1 to 7, whose
    /// `[min, max)` contains `y`. 0 if none does.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::collections::BTreeSet;
    /// use std::sync::Arc;
    /// use abyss_core::region::{LayerBand, LayerBands, RegionConfig};
    /// use abyss_curse::RegionClassifier;
    ///
    /// let layers = LayerBands::try_from([
    ///     (1, LayerBand::new(85.0, 96.0)),
    ///     (4, LayerBand::new(0.0, 40.0)),
    /// ])?;
    /// let config = RegionConfig { layers, ..RegionConfig::default() };
    /// let classifier = RegionClassifier::new(Arc::new(config), Arc::new(BTreeSet::new()));
    /// assert_eq!(classifier.layer_by_height(90.0), 1);
    /// assert_eq!(classifier.layer_by_height(20.0), 4);
    /// assert_eq!(classifier.layer_by_height(200.0), 0);
    /// # Ok::<(), abyss_core::error::ConfigError>(())
    /// ```
    pub fn layer_by_height(&self, y: f64) -> u8 {
        self.config
            .layers
            .iter()
            .find(|(_, band)| band.contains(y))
            .map_or(NO_LAYER, |(layer, _)| layer)
    }

    /// Chebyshev distance in chunks between `pos` and the region center.
    pub fn chunk_distance(&self, pos: &Position) -> i64 {
        let (cx, cz) = pos.chunk();
        let center_cx = self.config.center.x >> CHUNK_SHIFT;
        let center_cz = self.config.center.z >> CHUNK_SHIFT;
        let dx = cx.saturating_sub(center_cx).saturating_abs();
        let dz = cz.saturating_sub(center_cz).saturating_abs();
        dx.max(dz)
    }

    pub fn is_in_region(&self, pos: &Position) -> bool {
        match self.config.mode {
            RegionMode::Off => false,
            RegionMode::World => pos.dimension == Dimension::Overworld,
            RegionMode::Bounded => self.chunk_distance(pos) <= self.config.radius,
        }
    }

    /// Arm recorded at trigger time. World mode is uniformly 0; outside a
    /// bounded region (or with the region off) the arm is unbounded.
    pub fn arm_of_curse(&self, pos: &Position) -> i64 {
        match self.config.mode {
            RegionMode::World => 0,
            RegionMode::Off => ARM_UNBOUNDED,
            RegionMode::Bounded => {
                let distance = self.chunk_distance(pos);
                if distance <= self.config.radius {
                    distance
                } else {
                    ARM_UNBOUNDED
                }
            }
        }
    }

    pub fn in_exemption_zone(&self, pos: &Position) -> bool {
        self.config.exemption_zones.iter().any(|zone| zone.contains(pos))
    }

    /// Statically configured or granted at runtime.
    pub fn is_exempt_entity(&self, id: &EntityId) -> bool {
        self.config.exempt_ids.contains(id) || self.exemptions.is_exempt(id)
    }

    pub fn is_affected_by_curse(&self, pos: &Position, id: &EntityId) -> bool {
        self.is_in_region(pos) && !self.in_exemption_zone(pos) && !self.is_exempt_entity(id)
    }

    /// Layer shown on displays: the height layer while in the region, else 0.
    pub fn display_layer(&self, pos: &Position) -> u8 {
        if self.is_in_region(pos) {
            self.layer_by_height(pos.y)
        } else {
            NO_LAYER
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use abyss_core::region::{ExemptionZone, LayerBand, LayerBands, RegionCenter};
    use std::collections::BTreeSet;

    fn classifier(config: RegionConfig) -> RegionClassifier {
        RegionClassifier::new(Arc::new(config), Arc::new(BTreeSet::<EntityId>::new()))
    }

    fn bounded(radius: i64) -> RegionConfig {
        RegionConfig { mode: RegionMode::Bounded, radius, ..RegionConfig::default() }
    }

    #[test]
    fn layer_uses_configured_layer_numbers() {
        let c = classifier(RegionConfig {
            layers: LayerBands::try_from([
                (1, LayerBand::new(85.0, 96.0)),
                (4, LayerBand::new(0.0, 40.0)),
            ])
            .unwrap(),
            ..RegionConfig::default()
        });
        assert_eq!(c.layer_by_height(90.0), 1);
        assert_eq!(c.layer_by_height(20.0), 4);
        assert_eq!(c.layer_by_height(200.0), 0);
        assert_eq!(c.layer_by_height(50.0), 0);
    }

    #[test]
    fn layer_first_match_wins() {
        let c = classifier(RegionConfig {
            layers: LayerBands::try_from([
                (1, LayerBand::new(85.0, 96.0)),
                (4, LayerBand::new(0.0, 40.0)),
                (5, LayerBand::new(0.0, 100.0)),
            ])
            .unwrap(),
            ..RegionConfig::default()
        });
        assert_eq!(c.layer_by_height(90.0), 1);
        assert_eq!(c.layer_by_height(20.0), 4);
        assert_eq!(c.layer_by_height(50.0), 5);
        assert_eq!(c.layer_by_height(300.0), 0);
        assert_eq!(c.layer_by_height(-1.0), 0);
    }

    #[test]
    fn default_layers_cover_the_column() {
        let c = classifier(RegionConfig::default());
        assert_eq!(c.layer_by_height(100.0), 1);
        assert_eq!(c.layer_by_height(70.0), 2);
        assert_eq!(c.layer_by_height(64.0), 3);
        assert_eq!(c.layer_by_height(0.0), 4);
        assert_eq!(c.layer_by_height(-0.5), 5);
        assert_eq!(c.layer_by_height(-30.0), 6);
        assert_eq!(c.layer_by_height(-64.0), 7);
        assert_eq!(c.layer_by_height(-65.0), 0);
    }

    #[test]
    fn off_mode_contains_nothing() {
        let c = classifier(RegionConfig::default());
        let pos = Position::new(0.0, 64.0, 0.0);
        assert!(!c.is_in_region(&pos));
        assert_eq!(c.arm_of_curse(&pos), ARM_UNBOUNDED);
        assert_eq!(c.display_layer(&pos), 0);
    }

    #[test]
    fn world_mode_requires_overworld() {
        let c = classifier(RegionConfig { mode: RegionMode::World, ..RegionConfig::default() });
        let pos = Position::new(1e6, 64.0, -1e6);
        assert!(c.is_in_region(&pos));
        assert_eq!(c.arm_of_curse(&pos), 0);
        assert!(!c.is_in_region(&pos.in_dimension(Dimension::Nether)));
        assert_eq!(c.arm_of_curse(&pos.in_dimension(Dimension::End)), 0);
    }

    #[test]
    fn bounded_uses_chebyshev_chunk_distance() {
        let c = classifier(RegionConfig {
            center: RegionCenter { x: 8, y: 64, z: 8 },
            ..bounded(10)
        });
        // Chunk (4, 0): distance 4.
        assert_eq!(c.arm_of_curse(&Position::new(64.0, 64.0, 15.0)), 4);
        // Chunk (-10, 10): distance 10, on the boundary.
        let edge = Position::new(-160.0, 64.0, 175.0);
        assert!(c.is_in_region(&edge));
        assert_eq!(c.arm_of_curse(&edge), 10);
        // Chunk (11, 3): outside.
        let outside = Position::new(176.0, 64.0, 48.0);
        assert!(!c.is_in_region(&outside));
        assert_eq!(c.arm_of_curse(&outside), ARM_UNBOUNDED);
    }

    #[test]
    fn bounded_ignores_dimension() {
        let c = classifier(bounded(2));
        let pos = Position::new(0.0, 64.0, 0.0).in_dimension(Dimension::Nether);
        assert!(c.is_in_region(&pos));
    }

    #[test]
    fn negative_radius_contains_nothing() {
        let c = classifier(bounded(-1));
        assert!(!c.is_in_region(&Position::new(0.0, 64.0, 0.0)));
    }

    #[test]
    fn exemptions_shield_entities() {
        let static_id = EntityId::from_u128(1);
        let runtime_id = EntityId::from_u128(2);
        let other = EntityId::from_u128(3);
        let runtime: BTreeSet<EntityId> = [runtime_id].into_iter().collect();
        let config = RegionConfig {
            exempt_ids: [static_id].into_iter().collect(),
            exemption_zones: vec![ExemptionZone::new([0, 0, 0], [15, 100, 15])],
            ..bounded(5)
        };
        let c = RegionClassifier::new(Arc::new(config), Arc::new(runtime));

        let open = Position::new(40.0, 64.0, 40.0);
        let zoned = Position::new(5.0, 64.0, 5.0);
        assert!(c.is_affected_by_curse(&open, &other));
        assert!(!c.is_affected_by_curse(&zoned, &other));
        assert!(!c.is_affected_by_curse(&open, &static_id));
        assert!(!c.is_affected_by_curse(&open, &runtime_id));
    }

    #[test]
    fn with_config_keeps_exemptions() {
        let id = EntityId::from_u128(7);
        let runtime: BTreeSet<EntityId> = [id].into_iter().collect();
        let c = RegionClassifier::new(Arc::new(RegionConfig::default()), Arc::new(runtime));
        let reloaded = c.with_config(Arc::new(bounded(3)));
        assert_eq!(reloaded.config().radius, 3);
        assert!(reloaded.is_exempt_entity(&id));
    }
}
