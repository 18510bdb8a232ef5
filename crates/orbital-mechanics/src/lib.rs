//! Orbital Mechanics Library
//!
//! SGP4 propagation of catalog bodies plus the straight-line geometry
//! (range and Earth-limb line of sight) used to decide whether two bodies
//! can hear each other.

use chrono::{DateTime, Utc};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrbitalError {
    #[error("Invalid TLE format: {0}")]
    InvalidTle(String),
    #[error("Invalid orbital elements for {0}: {1}")]
    InvalidElements(String, String),
    #[error("Propagation failed for {0}: {1}")]
    PropagationFailed(String, String),
}

pub type Result<T> = std::result::Result<T, OrbitalError>;

/// Equatorial Earth radius (km)
pub const EARTH_RADIUS_KM: f64 = 6378.137;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StateVector {
    pub position_x: f64,
    pub position_y: f64,
    pub position_z: f64,
    pub velocity_x: f64,
    pub velocity_y: f64,
    pub velocity_z: f64,
    pub epoch: DateTime<Utc>,
}

impl StateVector {
    /// TEME position (km)
    pub fn position(&self) -> Vector3<f64> {
        Vector3::new(self.position_x, self.position_y, self.position_z)
    }

    /// TEME velocity (km/s)
    pub fn velocity(&self) -> Vector3<f64> {
        Vector3::new(self.velocity_x, self.velocity_y, self.velocity_z)
    }
}

/// A body that can be propagated with SGP4
pub struct OrbitalBody {
    pub name: String,
    pub norad_id: u64,
    pub epoch: DateTime<Utc>,
    constants: sgp4::Constants,
}

impl std::fmt::Debug for OrbitalBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrbitalBody")
            .field("name", &self.name)
            .field("norad_id", &self.norad_id)
            .field("epoch", &self.epoch)
            .finish()
    }
}

impl OrbitalBody {
    /// Build from already parsed elements (e.g. a CelesTrak OMM record)
    pub fn from_elements(name: &str, elements: &sgp4::Elements) -> Result<Self> {
        let constants = sgp4::Constants::from_elements(elements)
            .map_err(|e| OrbitalError::InvalidElements(name.to_string(), format!("{:?}", e)))?;

        Ok(Self {
            name: name.to_string(),
            norad_id: elements.norad_id,
            epoch: DateTime::<Utc>::from_naive_utc_and_offset(elements.datetime, Utc),
            constants,
        })
    }

    /// Build from the two lines of a TLE
    pub fn from_tle(name: &str, tle_line1: &str, tle_line2: &str) -> Result<Self> {
        let elements = sgp4::Elements::from_tle(
            Some(name.to_string()),
            tle_line1.as_bytes(),
            tle_line2.as_bytes(),
        )
        .map_err(|e| OrbitalError::InvalidTle(format!("{}: {:?}", name, e)))?;

        Self::from_elements(name, &elements)
    }

    pub fn propagate(&self, time: DateTime<Utc>) -> Result<StateVector> {
        propagation::sgp4_propagate(&self.name, &self.constants, self.epoch, time)
    }
}

pub mod propagation {
    use super::*;

    pub fn sgp4_propagate(
        name: &str,
        constants: &sgp4::Constants,
        epoch: DateTime<Utc>,
        time: DateTime<Utc>,
    ) -> Result<StateVector> {
        let duration = time.signed_duration_since(epoch);
        let minutes_since_epoch = duration.num_milliseconds() as f64 / 60_000.0;

        let prediction = constants
            .propagate(minutes_since_epoch)
            .map_err(|e| OrbitalError::PropagationFailed(name.to_string(), format!("{:?}", e)))?;

        Ok(StateVector {
            position_x: prediction.position[0],
            position_y: prediction.position[1],
            position_z: prediction.position[2],
            velocity_x: prediction.velocity[0],
            velocity_y: prediction.velocity[1],
            velocity_z: prediction.velocity[2],
            epoch: time,
        })
    }
}

pub mod geometry {
    //! Straight-line geometry between two positions in the same inertial frame (km)

    use super::*;

    pub fn range_km(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
        (b - a).norm()
    }

    /// Smallest distance from the Earth's center to the segment `a`-`b` (km)
    pub fn closest_approach_km(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
        let d = b - a;
        let len_sq = d.norm_squared();
        if len_sq == 0.0 {
            return a.norm();
        }
        let t = (-a.dot(&d) / len_sq).clamp(0.0, 1.0);
        (a + d * t).norm()
    }

    /// True when the segment between the bodies clears the Earth plus
    /// `grazing_altitude_km` of atmosphere.
    pub fn has_line_of_sight(a: &Vector3<f64>, b: &Vector3<f64>, grazing_altitude_km: f64) -> bool {
        closest_approach_km(a, b) >= EARTH_RADIUS_KM + grazing_altitude_km
    }
}
