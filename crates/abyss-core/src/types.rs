//! Core engine types: entity identity, positions, time, curse records.
//!
//! Heights are `f64` block units. Times are wall-clock milliseconds; curse
//! durations are game ticks (see [`crate::constants::MILLIS_PER_TICK`]).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{duration_to_ticks, CHUNK_SHIFT, LAYER_COUNT, NO_LAYER};
use crate::error::ParseEntityIdError;

/// A 128-bit entity identifier, rendered in the hyphenated UUID layout.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct EntityId(pub [u8; 16]);

impl EntityId {
    /// Create an id from raw bytes.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Build an id from a `u128`, big-endian. Handy for tests and fixtures.
    pub fn from_u128(value: u128) -> Self {
        Self(value.to_be_bytes())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = hex::encode(self.0);
        write!(
            f,
            "{}-{}-{}-{}-{}",
            &h[0..8],
            &h[8..12],
            &h[12..16],
            &h[16..20],
            &h[20..32]
        )
    }
}

impl FromStr for EntityId {
    type Err = ParseEntityIdError;

    /// Accepts 32 hex digits, with or without hyphens.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s.chars().filter(|c| *c != '-').collect();
        if digits.len() != 32 {
            return Err(ParseEntityIdError::InvalidLength(digits.len()));
        }
        let mut bytes = [0u8; 16];
        hex::decode_to_slice(&digits, &mut bytes)
            .map_err(|_| ParseEntityIdError::InvalidHex(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// World / dimension class a position belongs to.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default,
    bincode::Encode, bincode::Decode,
)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    /// The designated overworld. `World` mode curses every position here.
    #[default]
    Overworld,
    Nether,
    End,
}

/// A sampled 3-D position.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Default)]
pub struct Position {
    #[serde(default)]
    pub dimension: Dimension,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    /// Overworld position.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { dimension: Dimension::Overworld, x, y, z }
    }

    /// Same coordinates in another dimension.
    pub fn in_dimension(self, dimension: Dimension) -> Self {
        Self { dimension, ..self }
    }

    /// Integer block coordinates (floor of each axis).
    pub fn block(&self) -> (i64, i64, i64) {
        (self.x.floor() as i64, self.y.floor() as i64, self.z.floor() as i64)
    }

    /// Chunk column `(x, z)` containing this position.
    ///
    /// # Examples
    ///
    /// ```
    /// use abyss_core::types::Position;
    /// assert_eq!(Position::new(15.9, 64.0, -0.5).chunk(), (0, -1));
    /// assert_eq!(Position::new(16.0, 64.0, -16.0).chunk(), (1, -1));
    /// ```
    pub fn chunk(&self) -> (i64, i64) {
        let (bx, _, bz) = self.block();
        (bx >> CHUNK_SHIFT, bz >> CHUNK_SHIFT)
    }
}

/// Wall-clock instant in milliseconds since the Unix epoch.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Time elapsed from `self` to `later`, zero if `later` is earlier.
    pub fn elapsed_until(&self, later: Timestamp) -> Duration {
        Duration::from_millis(later.0.saturating_sub(self.0))
    }

    /// Whole ticks elapsed from `self` to `later`.
    pub fn ticks_until(&self, later: Timestamp) -> u64 {
        duration_to_ticks(self.elapsed_until(later))
    }

    pub fn saturating_add(&self, d: Duration) -> Timestamp {
        Timestamp(self.0.saturating_add(d.as_millis() as u64))
    }

    pub fn saturating_sub(&self, d: Duration) -> Timestamp {
        Timestamp(self.0.saturating_sub(d.as_millis() as u64))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// The two permanent narehate variants.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash,
    bincode::Encode, bincode::Decode,
)]
#[serde(rename_all = "lowercase")]
pub enum NarehateVariant {
    Lucky,
    Sad,
}

impl fmt::Display for NarehateVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lucky => f.write_str("lucky"),
            Self::Sad => f.write_str("sad"),
        }
    }
}

/// Whether an entity has been converted, and into which variant.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default,
    bincode::Encode, bincode::Decode,
)]
#[serde(rename_all = "lowercase")]
pub enum Narehate {
    #[default]
    None,
    Converted(NarehateVariant),
}

impl Narehate {
    pub fn is_converted(&self) -> bool {
        matches!(self, Self::Converted(_))
    }

    pub fn variant(&self) -> Option<NarehateVariant> {
        match self {
            Self::None => None,
            Self::Converted(v) => Some(*v),
        }
    }
}

/// A running curse. Existence of this record is the ACTIVE state.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct ActiveCurse {
    /// Severity band, `1..=LAYER_COUNT`.
    pub layer: u8,
    pub started_at: Timestamp,
    pub duration_ticks: u64,
    /// Chunk distance from the region center recorded at trigger time.
    pub arm: i64,
}

impl ActiveCurse {
    pub fn elapsed_ticks(&self, now: Timestamp) -> u64 {
        self.started_at.ticks_until(now)
    }

    /// True once the full duration has elapsed.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.elapsed_ticks(now) >= self.duration_ticks
    }

    pub fn remaining_ticks(&self, now: Timestamp) -> u64 {
        self.duration_ticks.saturating_sub(self.elapsed_ticks(now))
    }
}

/// Persisted form of one entity's curse state.
///
/// Absent curse fields are stored as zero, as in the flat on-disk tuple
/// `(safe_height, last_y, layer, start, duration, arm, narehate)`. The rise
/// window is not persisted.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct CurseSnapshot {
    pub safe_height: f64,
    pub last_y: f64,
    pub current_layer: u8,
    pub curse_start_ms: u64,
    pub curse_duration_ticks: u64,
    pub curse_arm: i64,
    pub narehate: Narehate,
}

impl CurseSnapshot {
    /// Decode the flat curse fields into an [`ActiveCurse`].
    ///
    /// Returns `Ok(None)` for a dormant record and `Err(())` for incomplete
    /// data: a layer without start time or duration, or a layer out of range.
    #[allow(clippy::result_unit_err)]
    pub fn active_curse(&self) -> Result<Option<ActiveCurse>, ()> {
        if self.current_layer == NO_LAYER {
            return Ok(None);
        }
        if self.current_layer > LAYER_COUNT
            || self.curse_start_ms == 0
            || self.curse_duration_ticks == 0
        {
            return Err(());
        }
        Ok(Some(ActiveCurse {
            layer: self.current_layer,
            started_at: Timestamp(self.curse_start_ms),
            duration_ticks: self.curse_duration_ticks,
            arm: self.curse_arm,
        }))
    }

    /// Encode with bincode standard config.
    pub fn encode(&self) -> Result<Vec<u8>, bincode::error::EncodeError> {
        bincode::encode_to_vec(self, bincode::config::standard())
    }

    /// Decode a value produced by [`encode`](Self::encode).
    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::error::DecodeError> {
        bincode::decode_from_slice(bytes, bincode::config::standard()).map(|(s, _)| s)
    }
}
