//! Defender Coverage Search
//!
//! Sweeps a scenario time window against a catalog of candidate Defenders
//! and decides, slot by slot, whether any candidate can hear the tail of an
//! attack transmission and jam the Victim before that tail has fully
//! arrived.
//!
//! # Pipeline
//!
//! ```text
//! catalog ──► constellation filter ──► candidates (catalog order)
//!                                          │
//! AtoV baseline (visible slots) ──► coverage search ──► ConstellationReport
//!                                          │                     │
//!                          session: add body, range series,      ▼
//!                          remove body                      CoverageRun JSON
//! ```
//!
//! The search is greedy: the first candidate in catalog order that reaches a
//! positive decision delay at a slot owns that slot, and once every slot is
//! owned no further geometry queries are issued.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

pub mod config;
pub mod loader;
pub mod report;
pub mod search;
pub mod session;
pub mod sgp4_session;
pub mod slots;
pub mod survey;

pub use config::{BodySpec, ScenarioConfig};
pub use loader::{load_catalog, Catalog};
pub use report::{CoverageRun, CoverageSetup, RunClock, RunTiming, SurveyRun, SurveySetup};
pub use search::{
    attack_baseline, ConstellationReport, CoverageSearch, DecisionResult, SearchParams,
    SlotCoverage,
};
pub use session::{with_active_body, GeometryProvider, SimulatorSession};
pub use sgp4_session::Sgp4Session;
pub use slots::{RangeSeries, TimeSlot, TimeWindow};
pub use survey::{survey_instant, InstantSurvey};

pub use decision_window::{Distance, TailSpec};

/// Width of a zero-padded catalog number
pub const CATALOG_ID_WIDTH: usize = 5;

#[derive(Error, Debug)]
pub enum CoverageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Scenario config error: {0}")]
    Config(#[from] toml::de::Error),
    #[error("Catalog file not found: {0:?}")]
    CatalogNotFound(PathBuf),
    #[error("Catalog {0:?} contains no usable entries")]
    EmptyCatalog(PathBuf),
    #[error("Body {0} not found in catalog and no TLE given")]
    UnknownCatalogBody(String),
    #[error("Attacker {attacker} and Victim {victim} are never in range of each other in the scenario window")]
    NeverVisible { attacker: BodyId, victim: BodyId },
    #[error("Attacker {attacker} and Victim {victim} are not in range of each other at {at}")]
    NotVisibleAt {
        attacker: BodyId,
        victim: BodyId,
        at: slots::TimeSlot,
    },
    #[error("Body {0} is not active in the session")]
    UnknownBody(BodyId),
    #[error("Failed to add body {0}: {1}")]
    AddBody(BodyId, String),
    #[error("Failed to remove body {0}: {1}")]
    RemoveBody(BodyId, String),
    #[error("Geometry query {0} -> {1} failed: {2}")]
    Geometry(BodyId, BodyId, String),
    #[error("Invalid time window: {0}")]
    InvalidWindow(String),
    #[error(transparent)]
    Window(#[from] decision_window::WindowError),
    #[error(transparent)]
    Orbital(#[from] orbital_mechanics::OrbitalError),
}

pub type Result<T> = std::result::Result<T, CoverageError>;

/// Name of a body as the simulator session knows it
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BodyId(String);

impl BodyId {
    /// Canonicalizes `name` with [`canonical_body_name`]
    pub fn new(name: &str) -> Self {
        BodyId(canonical_body_name(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Zero-padded satellite catalog number, e.g. `"00005"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogId(String);

impl CatalogId {
    pub fn from_norad(norad_id: u64) -> Self {
        CatalogId(format!("{:0width$}", norad_id, width = CATALOG_ID_WIDTH))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CatalogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Map an arbitrary object name onto a simulator-safe identifier.
///
/// Spaces become underscores, then everything outside ASCII letters, digits
/// and underscore is dropped. Distinct names can collide after this step
/// (`"OBJ-1"` and `"OBJ1"`); see [`Catalog::body_name_collisions`].
pub fn canonical_body_name(name: &str) -> String {
    name.chars()
        .map(|c| if c == ' ' { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

/// One Defender under test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    pub catalog_id: CatalogId,
}

impl Candidate {
    pub fn new(name: impl Into<String>, catalog_id: CatalogId) -> Self {
        Self {
            name: name.into(),
            catalog_id,
        }
    }

    pub fn body_id(&self) -> BodyId {
        BodyId::new(&self.name)
    }

    /// Case-insensitive substring match of the constellation name
    pub fn is_member_of(&self, constellation: &str) -> bool {
        self.name
            .to_lowercase()
            .contains(&constellation.to_lowercase())
    }
}

/// Candidates of `pool` belonging to `constellation`, in pool order
pub fn constellation_members<'a>(pool: &'a [Candidate], constellation: &str) -> Vec<&'a Candidate> {
    pool.iter().filter(|c| c.is_member_of(constellation)).collect()
}

/// Cooperative cancellation shared between a running search and its owner
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
