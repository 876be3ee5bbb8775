//! Engine constants. Durations are game ticks unless the name says otherwise
//! (1 tick = 50 ms, 20 ticks per second).

use std::time::Duration;

/// Game ticks per wall-clock second.
pub const TICKS_PER_SECOND: u64 = 20;

/// Wall-clock milliseconds per game tick.
pub const MILLIS_PER_TICK: u64 = 1_000 / TICKS_PER_SECOND;

/// Full curse duration at the region center: 10 minutes.
///
/// # Examples
///
/// ```
/// use abyss_core::constants::BASE_CURSE_DURATION_TICKS;
/// assert_eq!(BASE_CURSE_DURATION_TICKS, 12_000);
/// ```
pub const BASE_CURSE_DURATION_TICKS: u64 = 600 * TICKS_PER_SECOND;

/// Number of configurable layer bands. Layer indices run `1..=LAYER_COUNT`.
pub const LAYER_COUNT: u8 = 7;

/// Layer value meaning "no curse" / "no band matched".
pub const NO_LAYER: u8 = 0;

/// Layer whose curse plays a periodic ambient sound while active.
pub const AMBIENT_SOUND_LAYER: u8 = 3;

/// Lowest layer whose active curse blocks item interaction.
pub const INTERACTION_LOCK_LAYER: u8 = 5;

/// Lowest layer (by current height) in which chat is blocked.
pub const CHAT_LOCK_LAYER: u8 = 6;

/// Layer whose curse is lethal if it runs its full course.
pub const TERMINAL_LAYER: u8 = 7;

/// Sentinel arm for positions outside any bounded region.
pub const ARM_UNBOUNDED: i64 = i64::MAX;

/// Block coordinates are shifted by this many bits to get chunk coordinates.
pub const CHUNK_SHIFT: u32 = 4;

/// Height changes smaller than this are treated as jitter.
pub const RISE_EPSILON: f64 = 0.01;

/// A rise total at or below this counts as "paid off".
pub const RISE_PAID_OFF_EPSILON: f64 = 1e-6;

/// Default accumulated ascent (blocks) that fires a curse.
pub const DEFAULT_RISE_THRESHOLD: f64 = 2.0;

/// Default sliding window after which recorded ascent is forgotten.
pub const DEFAULT_RISE_WINDOW: Duration = Duration::from_secs(20 * 60);

/// Default exposure after which the conversion probability reaches its cap.
pub const DEFAULT_NAREHATE_CAP: Duration = Duration::from_secs(10 * 60);

/// Default ceiling of the per-check conversion probability.
pub const DEFAULT_NAREHATE_CAP_PROBABILITY: f64 = 0.5;

/// Steepness `k` of `p(t) = cap * (1 - e^(-k * t / T))`.
pub const NAREHATE_STEEPNESS: f64 = 6.0;

/// Default interval between narehate checks for one entity.
pub const DEFAULT_NAREHATE_INTERVAL: Duration = Duration::from_secs(60);

/// Default position sampling cadence.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

/// Default curse expiry check cadence.
pub const DEFAULT_EXPIRY_INTERVAL: Duration = Duration::from_secs(1);

/// Default interval between autosaves of all tracked entities.
pub const DEFAULT_AUTOSAVE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Capacity of the outbound event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 4_096;

/// Convert a wall-clock duration to whole game ticks (truncating).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use abyss_core::constants::duration_to_ticks;
/// assert_eq!(duration_to_ticks(Duration::from_secs(6 * 60)), 7_200);
/// assert_eq!(duration_to_ticks(Duration::from_millis(49)), 0);
/// ```
pub fn duration_to_ticks(duration: Duration) -> u64 {
    (duration.as_millis() / MILLIS_PER_TICK as u128) as u64
}
