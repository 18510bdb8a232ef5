//! Decision Window Library
//!
//! Straight-line propagation-delay model for a signal race between an
//! Attacker, a Victim and a Defender. The Defender hears the tail of the
//! attack transmission, decides, and has to land a counter-signal at the
//! Victim before the Victim finishes receiving that tail.
//!
//! # Timing Model
//!
//! ```text
//! t(d)            = d / c
//! defender_offset = t(AtoV) - t(AtoD)
//! delay           = t(DtoV) - defender_offset
//! decision_delay  = tail_duration - delay
//! ```
//!
//! | Sign of `defender_offset` | Meaning |
//! |---------------------------|---------|
//! | `> 0` | Defender hears the tail start before the Victim (advantage) |
//! | `< 0` | Defender hears the tail start after the Victim (disadvantage) |
//!
//! A positive `decision_delay` is the slack the Defender has left to react.
//! Zero or negative means the attack completes at the Victim first.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod timeline;

pub use timeline::{DecisionTimeline, Window};

/// Speed of light in vacuum (m/s)
pub const SPEED_OF_LIGHT_M_S: f64 = 299_792_458.0;

/// Meters per kilometer
pub const METERS_PER_KM: f64 = 1000.0;

#[derive(Error, Debug, PartialEq)]
pub enum WindowError {
    #[error("Invalid distance: {0} m (must be finite and non-negative)")]
    InvalidDistance(f64),
    #[error("Invalid bit rate: {0} bit/s (must be finite and positive)")]
    InvalidBitRate(f64),
    #[error("Invalid tail duration: {0} s (must be finite and non-negative)")]
    InvalidTailDuration(f64),
}

pub type Result<T> = std::result::Result<T, WindowError>;

/// Straight-line range between two bodies, always held in meters.
///
/// Providers that report kilometers go through [`Distance::from_kilometers`]
/// once; everything downstream works in meters.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Distance(f64);

impl Distance {
    pub const ZERO: Distance = Distance(0.0);

    pub fn from_meters(meters: f64) -> Result<Self> {
        if meters.is_finite() && meters >= 0.0 {
            Ok(Distance(meters))
        } else {
            Err(WindowError::InvalidDistance(meters))
        }
    }

    pub fn from_kilometers(kilometers: f64) -> Result<Self> {
        Self::from_meters(kilometers * METERS_PER_KM)
    }

    pub fn meters(self) -> f64 {
        self.0
    }

    pub fn kilometers(self) -> f64 {
        self.0 / METERS_PER_KM
    }

    /// One-way light time over this distance (seconds)
    pub fn propagation_time(self) -> f64 {
        propagation_time(self.0)
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3} km", self.kilometers())
    }
}

/// Time for a signal to cover `meters` in a straight line (seconds)
pub fn propagation_time(meters: f64) -> f64 {
    meters / SPEED_OF_LIGHT_M_S
}

/// How much earlier (positive) or later (negative) the Defender hears the
/// start of the tail compared to the Victim (seconds).
pub fn defender_offset(atod: Distance, atov: Distance) -> f64 {
    atov.propagation_time() - atod.propagation_time()
}

/// Signed decision delay in seconds.
///
/// `tail_duration` is the time the Victim needs to fully receive the tail.
/// The result is not clamped: negative values mean the Defender cannot react
/// in time.
pub fn decision_delay(atod: Distance, dtov: Distance, atov: Distance, tail_duration: f64) -> f64 {
    let delay = dtov.propagation_time() - defender_offset(atod, atov);
    tail_duration - delay
}

/// Whether a decision delay leaves the Defender time to react
pub fn is_feasible(decision_delay: f64) -> bool {
    decision_delay > 0.0
}

/// How the length of the attack tail is specified
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TailSpec {
    /// Tail reception time given directly
    Duration { duration_ms: f64 },
    /// Tail derived from link bit rate and tail length
    Bits { bit_rate: f64, tail_bytes: u32 },
}

impl TailSpec {
    pub fn from_seconds(seconds: f64) -> Self {
        TailSpec::Duration {
            duration_ms: seconds * 1000.0,
        }
    }

    /// Tail reception time in seconds
    pub fn duration(&self) -> Result<f64> {
        match *self {
            TailSpec::Duration { duration_ms } => {
                let seconds = duration_ms / 1000.0;
                if seconds.is_finite() && seconds >= 0.0 {
                    Ok(seconds)
                } else {
                    Err(WindowError::InvalidTailDuration(seconds))
                }
            }
            TailSpec::Bits {
                bit_rate,
                tail_bytes,
            } => {
                if !(bit_rate.is_finite() && bit_rate > 0.0) {
                    return Err(WindowError::InvalidBitRate(bit_rate));
                }
                Ok(f64::from(tail_bytes) * 8.0 / bit_rate)
            }
        }
    }

    pub fn bit_rate(&self) -> Option<f64> {
        match *self {
            TailSpec::Bits { bit_rate, .. } => Some(bit_rate),
            TailSpec::Duration { .. } => None,
        }
    }
}

impl Default for TailSpec {
    /// 6-byte tail on a 9600 bit/s link
    fn default() -> Self {
        TailSpec::Bits {
            bit_rate: 9600.0,
            tail_bytes: 6,
        }
    }
}
