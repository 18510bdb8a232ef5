//! Run reports and their JSON export
//!
//! Both runs persist the same envelope: `setup` (what was asked), `runtime`
//! (wall-clock start, end and elapsed) and `report` (the results).

use crate::search::{ConstellationReport, DecisionResult, SearchParams};
use crate::slots::{TimeSlot, TimeWindow};
use crate::survey::InstantSurvey;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;
use tracing::info;

// ============================================================================
// Run Timing
// ============================================================================

/// Wall clock started at the beginning of a run
#[derive(Debug, Clone, Copy)]
pub struct RunClock {
    started: DateTime<Utc>,
}

impl RunClock {
    pub fn start() -> Self {
        Self {
            started: Utc::now(),
        }
    }

    pub fn finish(&self) -> RunTiming {
        RunTiming::between(self.started, Utc::now())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunTiming {
    pub start: String,
    pub end: String,
    pub runtime: String,
}

impl RunTiming {
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: start.to_rfc3339(),
            end: end.to_rfc3339(),
            runtime: format_elapsed(end - start),
        }
    }
}

/// `H:MM:SS.ffffff`
pub fn format_elapsed(elapsed: chrono::Duration) -> String {
    let micros = elapsed.num_microseconds().unwrap_or(i64::MAX).max(0);
    let secs = micros / 1_000_000;
    format!(
        "{}:{:02}:{:02}.{:06}",
        secs / 3600,
        secs / 60 % 60,
        secs % 60,
        micros % 1_000_000
    )
}

// ============================================================================
// Coverage Run
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageSetup {
    #[serde(rename = "Attacker")]
    pub attacker: String,
    #[serde(rename = "Victim")]
    pub victim: String,
    #[serde(rename = "Start time")]
    pub start: String,
    #[serde(rename = "End time")]
    pub end: String,
    /// Seconds
    #[serde(rename = "Tail time")]
    pub tail_time: f64,
    #[serde(rename = "Bit rate", skip_serializing_if = "Option::is_none")]
    pub bit_rate: Option<f64>,
    /// Seconds
    #[serde(rename = "Time step size")]
    pub step_seconds: i64,
    #[serde(rename = "Number of observations")]
    pub observations: usize,
    #[serde(rename = "Candidate limit", skip_serializing_if = "Option::is_none")]
    pub candidate_limit: Option<usize>,
}

impl CoverageSetup {
    pub fn new(
        params: &SearchParams,
        window: &TimeWindow,
        bit_rate: Option<f64>,
        observations: usize,
    ) -> Self {
        Self {
            attacker: params.attacker.to_string(),
            victim: params.victim.to_string(),
            start: TimeSlot::new(window.start).to_string(),
            end: TimeSlot::new(window.end).to_string(),
            tail_time: params.tail_duration,
            bit_rate,
            step_seconds: params.step.num_seconds(),
            observations,
            candidate_limit: params.candidate_limit,
        }
    }
}

/// Persisted result of a coverage search
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageRun {
    pub setup: CoverageSetup,
    pub runtime: RunTiming,
    #[serde(serialize_with = "serialize_constellations")]
    pub report: Vec<ConstellationReport>,
}

/// Constellation reports keyed by name, in run order
fn serialize_constellations<S: Serializer>(
    reports: &[ConstellationReport],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(reports.len()))?;
    for report in reports {
        map.serialize_entry(&report.name, report)?;
    }
    map.end()
}

impl CoverageRun {
    pub fn new(setup: CoverageSetup, runtime: RunTiming, report: Vec<ConstellationReport>) -> Self {
        Self {
            setup,
            runtime,
            report,
        }
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        write_pretty(self, path.as_ref())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// ============================================================================
// Survey Run
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurveySetup {
    #[serde(rename = "Attacker")]
    pub attacker: String,
    #[serde(rename = "Victim")]
    pub victim: String,
    #[serde(rename = "Target Time")]
    pub target_time: TimeSlot,
    #[serde(rename = "Tail time")]
    pub tail_time: f64,
    #[serde(rename = "Bit rate", skip_serializing_if = "Option::is_none")]
    pub bit_rate: Option<f64>,
    #[serde(rename = "Candidates")]
    pub candidates_total: usize,
    #[serde(rename = "Candidates evaluated")]
    pub candidates_evaluated: usize,
}

/// Persisted result of an instant survey
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurveyRun {
    pub setup: SurveySetup,
    pub runtime: RunTiming,
    #[serde(serialize_with = "serialize_defenders")]
    pub report: Vec<DecisionResult>,
}

fn serialize_defenders<S: Serializer>(
    defenders: &[DecisionResult],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(defenders.len()))?;
    for result in defenders {
        map.serialize_entry(&result.candidate, result)?;
    }
    map.end()
}

impl SurveyRun {
    pub fn new(
        params: &SearchParams,
        survey: InstantSurvey,
        bit_rate: Option<f64>,
        runtime: RunTiming,
    ) -> Self {
        Self {
            setup: SurveySetup {
                attacker: params.attacker.to_string(),
                victim: params.victim.to_string(),
                target_time: survey.at,
                tail_time: params.tail_duration,
                bit_rate,
                candidates_total: survey.candidates_total,
                candidates_evaluated: survey.candidates_evaluated,
            },
            runtime,
            report: survey.defenders,
        }
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        write_pretty(self, path.as_ref())
    }
}

fn write_pretty<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    info!("Writing report to {:?}", path);
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, value)?;
    Ok(())
}
