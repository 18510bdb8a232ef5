//! Single-instant defender survey
//!
//! Unlike the coverage search this evaluates every candidate at one instant
//! and keeps every Defender that can react, not only the first.

use crate::search::{DecisionResult, SearchParams};
use crate::session::{with_active_body, SimulatorSession};
use crate::slots::TimeSlot;
use crate::{CancelFlag, Candidate, CoverageError, Distance, Result};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct InstantSurvey {
    pub at: TimeSlot,
    pub atov: Distance,
    pub candidates_total: usize,
    pub candidates_evaluated: usize,
    pub cancelled: bool,
    /// Feasible Defenders in catalog order
    pub defenders: Vec<DecisionResult>,
}

/// Evaluate every candidate of `pool` at `at`.
///
/// `at` must fall on the session's sampling grid for `params.step`.
pub fn survey_instant<S>(
    session: &mut S,
    params: &SearchParams,
    at: TimeSlot,
    pool: &[Candidate],
    cancel: Option<&CancelFlag>,
) -> Result<InstantSurvey>
where
    S: SimulatorSession + ?Sized,
{
    let atov = session
        .range_series(&params.attacker, &params.victim, params.step)?
        .get(at)
        .ok_or_else(|| CoverageError::NotVisibleAt {
            attacker: params.attacker.clone(),
            victim: params.victim.clone(),
            at,
        })?;

    let candidates = match params.candidate_limit {
        Some(limit) => &pool[..limit.min(pool.len())],
        None => pool,
    };
    let total = candidates.len();

    let mut defenders = Vec::new();
    let mut evaluated = 0;
    let mut cancelled = false;

    for (index, candidate) in candidates.iter().enumerate() {
        if cancel.is_some_and(CancelFlag::is_cancelled) {
            cancelled = true;
            break;
        }
        info!(
            "Run {} of {} | {:.1}% done",
            index + 1,
            total,
            (index + 1) as f64 / total as f64 * 100.0
        );

        let found = with_active_body(&mut *session, candidate, |session, body| {
            let Some(atod) = session
                .range_series(&params.attacker, body, params.step)?
                .get(at)
            else {
                debug!("{} not in range of {} at {}", candidate.name, params.attacker, at);
                return Ok(None);
            };
            let Some(dtov) = session
                .range_series(body, &params.victim, params.step)?
                .get(at)
            else {
                debug!("{} not in range of {} at {}", candidate.name, params.victim, at);
                return Ok(None);
            };
            Ok(DecisionResult::evaluate(
                &candidate.name,
                atod,
                dtov,
                atov,
                params.tail_duration,
            ))
        })?;
        // None: the candidate could not be added and was skipped
        let Some(found) = found else {
            continue;
        };
        evaluated += 1;

        if let Some(result) = found {
            info!(
                "{} can defend with {:.4} ms to spare",
                result.candidate,
                result.decision_delay * 1000.0
            );
            defenders.push(result);
        }
    }

    info!(
        "Found {} potential defenders among {} candidates",
        defenders.len(),
        evaluated
    );

    Ok(InstantSurvey {
        at,
        atov,
        candidates_total: total,
        candidates_evaluated: evaluated,
        cancelled,
        defenders,
    })
}
