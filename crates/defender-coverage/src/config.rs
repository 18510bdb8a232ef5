//! Scenario configuration (TOML)
//!
//! ```toml
//! catalog = "data/celestrak_active.json"
//! output = "results/report_coverage.json"
//! start = "2024-03-01T12:00:00Z"
//! end = "2024-03-01T13:00:00Z"
//! step_seconds = 60
//! constellations = ["starlink", "iridium"]
//!
//! [attacker]
//! name = "ISS (ZARYA)"
//!
//! [victim]
//! name = "VICTIM"
//! tle = ["1 ...", "2 ..."]
//!
//! [tail]
//! bit_rate = 9600
//! tail_bytes = 6
//! ```
//!
//! Times must be quoted RFC 3339 strings.

use crate::slots::{TimeSlot, TimeWindow};
use crate::{BodyId, CoverageError, Result};
use chrono::{DateTime, Duration, Utc};
use decision_window::TailSpec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Attacker or Victim: a catalog object, or an explicit TLE
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodySpec {
    pub name: String,
    #[serde(default)]
    pub tle: Option<[String; 2]>,
}

impl BodySpec {
    pub fn body_id(&self) -> BodyId {
        BodyId::new(&self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    #[serde(default = "default_catalog")]
    pub catalog: PathBuf,

    #[serde(default = "default_output")]
    pub output: PathBuf,

    pub attacker: BodySpec,
    pub victim: BodySpec,

    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,

    #[serde(default = "default_step_seconds")]
    pub step_seconds: i64,

    #[serde(default = "default_constellations")]
    pub constellations: Vec<String>,

    #[serde(default)]
    pub tail: TailSpec,

    #[serde(default)]
    pub candidate_limit: Option<usize>,

    /// Atmosphere thickness a link must clear above the Earth's surface
    #[serde(default = "default_grazing_altitude_km")]
    pub grazing_altitude_km: f64,

    /// Instant for the survey subcommand
    #[serde(default)]
    pub target_time: Option<DateTime<Utc>>,
}

fn default_catalog() -> PathBuf {
    PathBuf::from("data/celestrak_active.json")
}

fn default_output() -> PathBuf {
    PathBuf::from("results/report_coverage.json")
}

fn default_step_seconds() -> i64 {
    60
}

fn default_constellations() -> Vec<String> {
    vec!["starlink".to_string()]
}

fn default_grazing_altitude_km() -> f64 {
    100.0
}

impl ScenarioConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Validated scenario window at the configured step
    pub fn window(&self) -> Result<TimeWindow> {
        let step = Duration::try_seconds(self.step_seconds).ok_or_else(|| {
            CoverageError::InvalidWindow(format!(
                "step_seconds {} is out of range",
                self.step_seconds
            ))
        })?;
        TimeWindow::new(self.start, self.end, step)
    }

    /// Tail reception time in seconds
    pub fn tail_duration(&self) -> Result<f64> {
        Ok(self.tail.duration()?)
    }

    /// Survey instant, defaulting to the window start
    pub fn target_slot(&self) -> TimeSlot {
        TimeSlot::new(self.target_time.unwrap_or(self.start))
    }
}
