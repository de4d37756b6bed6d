//! Pacing control for replay delivery

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How long the scheduler waits between packets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PacingMode {
    /// Constant delay between packets
    Fixed { interval_ms: u64 },

    /// Delay derived from consecutive `timestamp_count` deltas
    ///
    /// Each tick counts `tick_us` microseconds. Delays are capped at
    /// `max_delay_ms`; the first packet and non-increasing timestamps use
    /// `fallback_ms`.
    Timestamp { tick_us: u64, max_delay_ms: u64, fallback_ms: u64 },
}

impl Default for PacingMode {
    fn default() -> Self {
        PacingMode::Fixed { interval_ms: 50 }
    }
}

impl PacingMode {
    /// Fixed pacing with the given interval
    pub fn fixed(interval: Duration) -> Self {
        PacingMode::Fixed { interval_ms: interval.as_millis() as u64 }
    }

    /// Timestamp pacing with millisecond ticks
    pub fn realistic(fallback: Duration) -> Self {
        PacingMode::Timestamp {
            tick_us: 1_000,
            max_delay_ms: 5_000,
            fallback_ms: fallback.as_millis() as u64,
        }
    }

    /// Whether delays follow the recorded timestamps
    pub fn is_realistic(self) -> bool {
        matches!(self, PacingMode::Timestamp { .. })
    }

    /// Interval used when no timestamp delta is available
    pub fn base_interval(self) -> Duration {
        match self {
            PacingMode::Fixed { interval_ms } => Duration::from_millis(interval_ms),
            PacingMode::Timestamp { fallback_ms, .. } => Duration::from_millis(fallback_ms),
        }
    }

    /// Delay to apply after a packet whose last reading carried `current`,
    /// given the last timestamp of the packet before it.
    pub fn delay_between(self, previous: Option<u64>, current: u64) -> Duration {
        match self {
            PacingMode::Fixed { interval_ms } => Duration::from_millis(interval_ms),
            PacingMode::Timestamp { tick_us, max_delay_ms, fallback_ms } => {
                match previous {
                    Some(prev) if current > prev => {
                        let micros = (current - prev).saturating_mul(tick_us);
                        Duration::from_micros(micros).min(Duration::from_millis(max_delay_ms))
                    }
                    _ => Duration::from_millis(fallback_ms),
                }
            }
        }
    }
}
