//! Temporal coverage search
//!
//! For every constellation the candidates are walked in catalog order and
//! each still-uncovered slot is offered to the current candidate. The first
//! candidate reaching a positive decision delay at a slot owns it for the
//! rest of the pass.

use crate::session::{with_active_body, SimulatorSession};
use crate::slots::{RangeSeries, TimeSlot};
use crate::{constellation_members, BodyId, CancelFlag, Candidate, CoverageError, Distance, Result};
use chrono::Duration;
use decision_window::{decision_delay, is_feasible};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info, trace};

/// Fixed inputs of one run
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub attacker: BodyId,
    pub victim: BodyId,
    /// Sampling step of every range query
    pub step: Duration,
    /// Time for the Victim to receive the whole tail (seconds)
    pub tail_duration: f64,
    /// Stop after this many candidates per constellation
    pub candidate_limit: Option<usize>,
}

/// A Defender that can react in time at one slot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionResult {
    #[serde(skip)]
    pub candidate: String,
    #[serde(rename = "AtoV")]
    pub atov: Distance,
    #[serde(rename = "AtoD")]
    pub atod: Distance,
    #[serde(rename = "DtoV")]
    pub dtov: Distance,
    /// Seconds of slack, always positive for a recorded result
    pub decision_delay: f64,
}

impl DecisionResult {
    /// Evaluate one (candidate, slot) pair whose legs are both visible.
    /// Returns `None` when the Defender cannot react in time.
    pub fn evaluate(
        candidate: &str,
        atod: Distance,
        dtov: Distance,
        atov: Distance,
        tail_duration: f64,
    ) -> Option<Self> {
        let delay = decision_delay(atod, dtov, atov, tail_duration);
        is_feasible(delay).then(|| DecisionResult {
            candidate: candidate.to_string(),
            atov,
            atod,
            dtov,
            decision_delay: delay,
        })
    }
}

/// Slot -> owning Defender, for every slot that needs defending
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotCoverage(BTreeMap<TimeSlot, Option<DecisionResult>>);

impl SlotCoverage {
    pub fn new(slots: impl IntoIterator<Item = TimeSlot>) -> Self {
        SlotCoverage(slots.into_iter().map(|s| (s, None)).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_covered(&self, slot: TimeSlot) -> bool {
        matches!(self.0.get(&slot), Some(Some(_)))
    }

    pub fn all_covered(&self) -> bool {
        self.0.values().all(Option::is_some)
    }

    pub fn defended_count(&self) -> usize {
        self.0.values().filter(|d| d.is_some()).count()
    }

    /// Record `result` for `slot` unless the slot is unknown or already owned
    pub fn claim(&mut self, slot: TimeSlot, result: DecisionResult) -> bool {
        match self.0.get_mut(&slot) {
            Some(entry @ None) => {
                *entry = Some(result);
                true
            }
            _ => false,
        }
    }

    pub fn defender(&self, slot: TimeSlot) -> Option<&DecisionResult> {
        self.0.get(&slot).and_then(Option::as_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TimeSlot, Option<&DecisionResult>)> + '_ {
        self.0.iter().map(|(slot, d)| (*slot, d.as_ref()))
    }
}

/// `{ candidate: result }`, empty when nobody defends the slot
struct SlotDefenders<'a>(Option<&'a DecisionResult>);

impl Serialize for SlotDefenders<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(usize::from(self.0.is_some())))?;
        if let Some(result) = self.0 {
            map.serialize_entry(&result.candidate, result)?;
        }
        map.end()
    }
}

impl Serialize for SlotCoverage {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (slot, defender) in self.iter() {
            map.serialize_entry(&slot, &SlotDefenders(defender))?;
        }
        map.end()
    }
}

/// Coverage outcome of one constellation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConstellationReport {
    #[serde(skip)]
    pub name: String,
    #[serde(rename = "defended times")]
    pub defended_count: usize,
    #[serde(rename = "not defended times")]
    pub undefended_count: usize,
    #[serde(rename = "defend percentage")]
    pub defended_percentage: f64,
    #[serde(rename = "candidates")]
    pub candidates_total: usize,
    #[serde(rename = "candidates evaluated")]
    pub candidates_evaluated: usize,
    pub cancelled: bool,
    #[serde(rename = "defenders")]
    pub coverage: SlotCoverage,
}

impl ConstellationReport {
    pub fn new(
        name: &str,
        coverage: SlotCoverage,
        candidates_total: usize,
        candidates_evaluated: usize,
        cancelled: bool,
    ) -> Self {
        let total = coverage.len();
        let defended_count = coverage.defended_count();
        let defended_percentage = if total == 0 {
            0.0
        } else {
            defended_count as f64 / total as f64 * 100.0
        };

        Self {
            name: name.to_string(),
            defended_count,
            undefended_count: total - defended_count,
            defended_percentage,
            candidates_total,
            candidates_evaluated,
            cancelled,
            coverage,
        }
    }

    pub fn total_slots(&self) -> usize {
        self.coverage.len()
    }
}

/// Attacker -> Victim ranges at every slot where they see each other.
///
/// These are the slots that need defending. Never being in range is fatal.
pub fn attack_baseline<S>(session: &mut S, params: &SearchParams) -> Result<RangeSeries>
where
    S: SimulatorSession + ?Sized,
{
    let baseline = session.range_series(&params.attacker, &params.victim, params.step)?;
    if baseline.is_empty() {
        return Err(CoverageError::NeverVisible {
            attacker: params.attacker.clone(),
            victim: params.victim.clone(),
        });
    }
    info!(
        "{} and {} in range at {} slots",
        params.attacker,
        params.victim,
        baseline.len()
    );
    Ok(baseline)
}

/// Coverage search bound to one session
pub struct CoverageSearch<'a, S: SimulatorSession + ?Sized> {
    session: &'a mut S,
    params: &'a SearchParams,
    cancel: Option<CancelFlag>,
}

impl<'a, S: SimulatorSession + ?Sized> CoverageSearch<'a, S> {
    pub fn new(session: &'a mut S, params: &'a SearchParams) -> Self {
        Self {
            session,
            params,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled)
    }

    /// One report per constellation, in the given order. A cancelled
    /// constellation ends the run; its partial report is the last entry.
    pub fn run(
        &mut self,
        constellations: &[String],
        pool: &[Candidate],
        baseline: &RangeSeries,
    ) -> Result<Vec<ConstellationReport>> {
        let mut reports = Vec::with_capacity(constellations.len());

        for (i, name) in constellations.iter().enumerate() {
            info!(
                "Testing constellation {} ({}/{})",
                name,
                i + 1,
                constellations.len()
            );
            let report = self.search_constellation(name, pool, baseline)?;
            info!(
                "{}: {} of {} slots defended ({:.2}%)",
                name,
                report.defended_count,
                report.total_slots(),
                report.defended_percentage
            );

            let cancelled = report.cancelled;
            reports.push(report);
            if cancelled {
                info!("Run cancelled after constellation {}", name);
                break;
            }
        }

        Ok(reports)
    }

    pub fn search_constellation(
        &mut self,
        name: &str,
        pool: &[Candidate],
        baseline: &RangeSeries,
    ) -> Result<ConstellationReport> {
        let mut members = constellation_members(pool, name);
        if let Some(limit) = self.params.candidate_limit {
            members.truncate(limit);
        }
        let total = members.len();
        info!("{} candidates in constellation {}", total, name);

        let mut coverage = SlotCoverage::new(baseline.slots());
        let mut evaluated = 0;
        let mut cancelled = false;
        let mut last_check: Option<std::time::Duration> = None;

        for (index, candidate) in members.into_iter().enumerate() {
            if coverage.all_covered() {
                info!("All slots of {} already defended, skipping remaining candidates", name);
                break;
            }
            if self.is_cancelled() {
                cancelled = true;
                break;
            }

            match last_check {
                Some(per_candidate) => info!(
                    "[{}/{}] {:.1}% checking {} (about {:.0}s left for {} after this one)",
                    index + 1,
                    total,
                    (index + 1) as f64 / total as f64 * 100.0,
                    candidate.name,
                    time_left(per_candidate, total, index).as_secs_f64(),
                    name
                ),
                None => info!(
                    "[{}/{}] {:.1}% checking {}",
                    index + 1,
                    total,
                    (index + 1) as f64 / total as f64 * 100.0,
                    candidate.name
                ),
            }

            let started = Instant::now();
            let params = self.params;
            let claimed = with_active_body(&mut *self.session, candidate, |session, body| {
                claim_slots(session, params, candidate, body, baseline, &mut coverage)
            })?;
            last_check = Some(started.elapsed());

            // None: the candidate could not be added and was skipped
            if let Some(claimed) = claimed {
                evaluated += 1;
                if claimed > 0 {
                    debug!("{} defends {} new slots", candidate.name, claimed);
                }
            }
        }

        Ok(ConstellationReport::new(
            name, coverage, total, evaluated, cancelled,
        ))
    }
}

/// Estimated time for the candidates after the one at `index`
fn time_left(
    per_candidate: std::time::Duration,
    total: usize,
    index: usize,
) -> std::time::Duration {
    let after = total.saturating_sub(index + 1);
    per_candidate.mul_f64(after as f64)
}

/// Offer every uncovered slot to one active candidate; returns how many it took.
///
/// Each leg is fetched at most once per candidate, and only while there is
/// still an uncovered slot to look it up for.
fn claim_slots<S>(
    session: &mut S,
    params: &SearchParams,
    candidate: &Candidate,
    body: &BodyId,
    baseline: &RangeSeries,
    coverage: &mut SlotCoverage,
) -> Result<usize>
where
    S: SimulatorSession + ?Sized,
{
    let mut atod_series: Option<RangeSeries> = None;
    let mut dtov_series: Option<RangeSeries> = None;
    let mut claimed = 0;

    for (slot, atov) in baseline.iter() {
        if coverage.is_covered(slot) {
            trace!("Skipping {}, defender already found", slot);
            continue;
        }

        if atod_series.is_none() {
            let series = session.range_series(&params.attacker, body, params.step)?;
            if series.is_empty() {
                debug!("{} never in range of {}", candidate.name, params.attacker);
                return Ok(claimed);
            }
            atod_series = Some(series);
        }
        let Some(atod) = atod_series.as_ref().and_then(|s| s.get(slot)) else {
            continue;
        };

        if dtov_series.is_none() {
            let series = session.range_series(body, &params.victim, params.step)?;
            if series.is_empty() {
                debug!("{} never in range of {}", candidate.name, params.victim);
                return Ok(claimed);
            }
            dtov_series = Some(series);
        }
        let Some(dtov) = dtov_series.as_ref().and_then(|s| s.get(slot)) else {
            continue;
        };

        if let Some(result) =
            DecisionResult::evaluate(&candidate.name, atod, dtov, atov, params.tail_duration)
        {
            trace!(
                "{} defends {} with {:.6} ms to spare",
                candidate.name,
                slot,
                result.decision_delay * 1000.0
            );
            if coverage.claim(slot, result) {
                claimed += 1;
            }
        }
    }

    Ok(claimed)
}
