//! Region configuration: mode, center, radius, layer bands, thresholds,
//! exemption zones and statically exempt ids.
//!
//! A [`RegionConfig`] is an immutable snapshot. Reloading replaces the whole
//! snapshot; nothing mutates one in place.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{
    DEFAULT_NAREHATE_CAP, DEFAULT_NAREHATE_CAP_PROBABILITY, DEFAULT_NAREHATE_INTERVAL,
    DEFAULT_RISE_THRESHOLD, DEFAULT_RISE_WINDOW, LAYER_COUNT,
};
use crate::error::ConfigError;
use crate::types::{EntityId, Position};

/// How the cursed region is delimited.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum RegionMode {
    /// Nothing is cursed.
    #[default]
    Off,
    /// Only chunks within `radius` (Chebyshev) of the center are cursed.
    Bounded,
    /// The whole overworld is cursed.
    World,
}

impl fmt::Display for RegionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => f.write_str("off"),
            Self::Bounded => f.write_str("bounded"),
            Self::World => f.write_str("world"),
        }
    }
}

impl FromStr for RegionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "bounded" | "abyss" => Ok(Self::Bounded),
            "world" => Ok(Self::World),
            other => Err(ConfigError::InvalidValue {
                field: "mode",
                reason: format!("unknown mode {other:?}"),
            }),
        }
    }
}

/// Region center in block coordinates.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegionCenter {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl Default for RegionCenter {
    fn default() -> Self {
        Self { x: 0, y: 64, z: 0 }
    }
}

/// A half-open height band `[min, max)`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct LayerBand {
    pub min: f64,
    pub max: f64,
}

impl LayerBand {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, y: f64) -> bool {
        y >= self.min && y < self.max
    }
}

/// Axis-aligned box of blocks, inclusive on every bound. Corners may be
/// given in any order.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExemptionZone {
    pub min: [i64; 3],
    pub max: [i64; 3],
}

impl ExemptionZone {
    /// Build a zone from two opposite corners, normalizing the bounds.
    pub fn new(a: [i64; 3], b: [i64; 3]) -> Self {
        Self {
            min: [a[0].min(b[0]), a[1].min(b[1]), a[2].min(b[2])],
            max: [a[0].max(b[0]), a[1].max(b[1]), a[2].max(b[2])],
        }
    }

    pub fn contains(&self, pos: &Position) -> bool {
        let (x, y, z) = pos.block();
        [x, y, z].iter().enumerate().all(|(axis, v)| {
            let lo = self.min[axis].min(self.max[axis]);
            let hi = self.min[axis].max(self.max[axis]);
            *v >= lo && *v <= hi
        })
    }
}

impl fmt::Display for ExemptionZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {})..=({}, {}, {})",
            self.min[0], self.min[1], self.min[2], self.max[0], self.max[1], self.max[2]
        )
    }
}

/// Height bands keyed by layer number, written as `layer1` .. `layer7`.
/// An absent layer never classifies. Unknown keys are rejected.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct LayerBands {
    pub layer1: Option<LayerBand>,
    pub layer2: Option<LayerBand>,
    pub layer3: Option<LayerBand>,
    pub layer4: Option<LayerBand>,
    pub layer5: Option<LayerBand>,
    pub layer6: Option<LayerBand>,
    pub layer7: Option<LayerBand>,
}

impl LayerBands {
    fn slot_mut(&mut self, layer: u8) -> Option<&mut Option<LayerBand>> {
        match layer {
            1 => Some(&mut self.layer1),
            2 => Some(&mut self.layer2),
            3 => Some(&mut self.layer3),
            4 => Some(&mut self.layer4),
            5 => Some(&mut self.layer5),
            6 => Some(&mut self.layer6),
            7 => Some(&mut self.layer7),
            _ => None,
        }
    }

    /// Band configured for `layer`, if any.
    pub fn get(&self, layer: u8) -> Option<&LayerBand> {
        match layer {
            1 => self.layer1.as_ref(),
            2 => self.layer2.as_ref(),
            3 => self.layer3.as_ref(),
            4 => self.layer4.as_ref(),
            5 => self.layer5.as_ref(),
            6 => self.layer6.as_ref(),
            7 => self.layer7.as_ref(),
            _ => None,
        }
    }

    /// Set the band for `layer`. Fails outside `1..=LAYER_COUNT`.
    pub fn set(&mut self, layer: u8, band: LayerBand) -> Result<(), ConfigError> {
        let slot = self.slot_mut(layer).ok_or_else(|| ConfigError::InvalidValue {
            field: "layers",
            reason: format!("layer {layer} outside 1..={LAYER_COUNT}"),
        })?;
        *slot = Some(band);
        Ok(())
    }

    /// Configured bands in layer order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, &LayerBand)> + '_ {
        (1..=LAYER_COUNT).filter_map(move |layer| self.get(layer).map(|band| (layer, band)))
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

impl<const N: usize> TryFrom<[(u8, LayerBand); N]> for LayerBands {
    type Error = ConfigError;

    fn try_from(bands: [(u8, LayerBand); N]) -> Result<Self, Self::Error> {
        let mut layers = Self::default();
        for (layer, band) in bands {
            layers.set(layer, band)?;
        }
        Ok(layers)
    }
}

/// Default layer bands, deepest last.
pub fn default_layers() -> LayerBands {
    LayerBands {
        layer1: Some(LayerBand::new(85.0, 320.0)),
        layer2: Some(LayerBand::new(65.0, 85.0)),
        layer3: Some(LayerBand::new(40.0, 65.0)),
        layer4: Some(LayerBand::new(0.0, 40.0)),
        layer5: Some(LayerBand::new(-25.0, 0.0)),
        layer6: Some(LayerBand::new(-50.0, -25.0)),
        layer7: Some(LayerBand::new(-64.0, -50.0)),
    }
}

/// Process-wide region configuration snapshot.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct RegionConfig {
    pub mode: RegionMode,
    pub center: RegionCenter,
    /// Radius in chunks.
    pub radius: i64,
    /// Bands scanned from layer 1 to 7; first match wins. Gaps and overlaps
    /// are the configuration's responsibility.
    pub layers: LayerBands,
    pub rise_threshold: f64,
    pub rise_window_secs: u64,
    pub narehate_cap_secs: u64,
    pub narehate_cap_probability: f64,
    pub narehate_interval_secs: u64,
    pub exemption_zones: Vec<ExemptionZone>,
    pub exempt_ids: BTreeSet<EntityId>,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            mode: RegionMode::Off,
            center: RegionCenter::default(),
            radius: 5,
            layers: default_layers(),
            rise_threshold: DEFAULT_RISE_THRESHOLD,
            rise_window_secs: DEFAULT_RISE_WINDOW.as_secs(),
            narehate_cap_secs: DEFAULT_NAREHATE_CAP.as_secs(),
            narehate_cap_probability: DEFAULT_NAREHATE_CAP_PROBABILITY,
            narehate_interval_secs: DEFAULT_NAREHATE_INTERVAL.as_secs(),
            exemption_zones: Vec::new(),
            exempt_ids: BTreeSet::new(),
        }
    }
}

impl RegionConfig {
    pub fn rise_window(&self) -> Duration {
        Duration::from_secs(self.rise_window_secs)
    }

    pub fn narehate_cap(&self) -> Duration {
        Duration::from_secs(self.narehate_cap_secs)
    }

    pub fn narehate_interval(&self) -> Duration {
        Duration::from_secs(self.narehate_interval_secs)
    }

    /// Structural checks only. Band gaps and overlaps are accepted.
    /// Negated comparisons also reject NaN.
    #[allow(clippy::neg_cmp_op_on_partial_ord)]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some((layer, band)) = self.layers.iter().find(|(_, b)| !(b.min <= b.max)) {
            return Err(ConfigError::InvalidValue {
                field: "layers",
                reason: format!("layer {layer} has min {} above max {}", band.min, band.max),
            });
        }
        if !(self.rise_threshold > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "rise_threshold",
                reason: format!("must be positive, got {}", self.rise_threshold),
            });
        }
        if !(0.0..=1.0).contains(&self.narehate_cap_probability) {
            return Err(ConfigError::InvalidValue {
                field: "narehate_cap_probability",
                reason: format!("must be within [0, 1], got {}", self.narehate_cap_probability),
            });
        }
        if self.narehate_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "narehate_interval_secs",
                reason: "must be non-zero".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = RegionConfig::default();
        assert_eq!(cfg.mode, RegionMode::Off);
        assert_eq!(cfg.radius, 5);
        assert_eq!(cfg.layers.len(), LAYER_COUNT as usize);
        assert_eq!(cfg.rise_window(), Duration::from_secs(1200));
        assert_eq!(cfg.narehate_cap(), Duration::from_secs(600));
        assert_eq!(cfg.narehate_interval(), Duration::from_secs(60));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn band_is_half_open() {
        let band = LayerBand::new(85.0, 96.0);
        assert!(band.contains(85.0));
        assert!(band.contains(95.999));
        assert!(!band.contains(96.0));
    }

    #[test]
    fn zone_bounds_are_inclusive_and_normalized() {
        let zone = ExemptionZone::new([10, 70, 10], [0, 60, 0]);
        assert_eq!(zone.min, [0, 60, 0]);
        assert_eq!(zone.max, [10, 70, 10]);
        assert!(zone.contains(&Position::new(0.0, 60.0, 0.0)));
        assert!(zone.contains(&Position::new(10.9, 70.5, 10.2)));
        assert!(!zone.contains(&Position::new(11.0, 65.0, 5.0)));
        assert!(!zone.contains(&Position::new(-0.1, 65.0, 5.0)));
    }

    #[test]
    fn mode_parses_legacy_name() {
        assert_eq!("ABYSS".parse::<RegionMode>().unwrap(), RegionMode::Bounded);
        assert_eq!("world".parse::<RegionMode>().unwrap(), RegionMode::World);
        assert!("sideways".parse::<RegionMode>().is_err());
    }

    #[test]
    fn validate_rejects_structural_errors() {
        let inverted = RegionConfig {
            layers: LayerBands::try_from([(3, LayerBand::new(5.0, 1.0))]).unwrap(),
            ..RegionConfig::default()
        };
        assert!(inverted.validate().is_err());

        let bad_p = RegionConfig { narehate_cap_probability: 1.5, ..RegionConfig::default() };
        assert!(bad_p.validate().is_err());
    }

    #[test]
    fn validate_accepts_gaps_and_overlaps() {
        let cfg = RegionConfig {
            layers: LayerBands::try_from([
                (1, LayerBand::new(85.0, 96.0)),
                (2, LayerBand::new(0.0, 100.0)),
            ])
            .unwrap(),
            ..RegionConfig::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn bands_keep_their_layer_number() {
        let bands = LayerBands::try_from([
            (4, LayerBand::new(0.0, 40.0)),
            (1, LayerBand::new(85.0, 96.0)),
        ])
        .unwrap();
        assert_eq!(bands.len(), 2);
        assert_eq!(bands.get(4), Some(&LayerBand::new(0.0, 40.0)));
        assert_eq!(bands.get(2), None);
        let layers: Vec<u8> = bands.iter().map(|(layer, _)| layer).collect();
        assert_eq!(layers, vec![1, 4]);
    }

    #[test]
    fn band_layer_out_of_range_is_rejected() {
        assert!(LayerBands::try_from([(0, LayerBand::new(0.0, 1.0))]).is_err());
        assert!(LayerBands::try_from([(8, LayerBand::new(0.0, 1.0))]).is_err());
        assert!(LayerBands::default().is_empty());
    }

    #[test]
    fn deserializes_sparse_layers_by_key() {
        let cfg: RegionConfig = serde_json::from_str(
            r#"{"layers":{"layer1":{"min":85.0,"max":96.0},"layer4":{"min":0.0,"max":40.0}}}"#,
        )
        .unwrap();
        assert_eq!(cfg.layers.len(), 2);
        assert_eq!(cfg.layers.get(4), Some(&LayerBand::new(0.0, 40.0)));
        assert_eq!(cfg.layers.get(2), None);

        let unknown = serde_json::from_str::<RegionConfig>(
            r#"{"layers":{"layer8":{"min":0.0,"max":1.0}}}"#,
        );
        assert!(unknown.is_err());
    }

    #[test]
    fn deserializes_partial_toml_like_json() {
        let cfg: RegionConfig =
            serde_json::from_str(r#"{"mode":"bounded","radius":10}"#).unwrap();
        assert_eq!(cfg.mode, RegionMode::Bounded);
        assert_eq!(cfg.radius, 10);
        assert_eq!(cfg.rise_threshold, DEFAULT_RISE_THRESHOLD);
    }
}
