//! Simulator session seams and scoped body acquisition
//!
//! The session is an explicit handle owned by the caller. It is not safe for
//! concurrent use, so every method takes `&mut self`.

use crate::slots::RangeSeries;
use crate::{BodyId, Candidate, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

/// Line-of-sight range queries between two active bodies
pub trait GeometryProvider {
    /// Raw samples over the session's scenario window at `step`: one
    /// `(instant, range_km)` pair per instant where `a` and `b` can see each
    /// other. Instants may carry sub-second jitter.
    fn range_series_km(
        &mut self,
        a: &BodyId,
        b: &BodyId,
        step: Duration,
    ) -> Result<Vec<(DateTime<Utc>, f64)>>;

    /// Range series keyed by whole-second slot, in meters
    fn range_series(&mut self, a: &BodyId, b: &BodyId, step: Duration) -> Result<RangeSeries> {
        RangeSeries::from_kilometers(self.range_series_km(a, b, step)?)
    }
}

/// A simulator holding a set of active bodies
pub trait SimulatorSession: GeometryProvider {
    /// Make `candidate` an active body. A body with the same canonical name
    /// is replaced.
    fn add_body(&mut self, candidate: &Candidate) -> Result<BodyId>;

    /// Remove a body from the active set. Removing a body that is not active
    /// is not an error.
    fn remove_body(&mut self, body: &BodyId) -> Result<()>;
}

/// Run `f` with `candidate` active in the session.
///
/// The body is released exactly once on every path out of this function,
/// including when `f` fails and when the add itself fails part-way. A
/// candidate that cannot be added is skipped (`Ok(None)`); a release failure
/// is returned as an error because the session can no longer be trusted.
pub fn with_active_body<S, T, F>(session: &mut S, candidate: &Candidate, f: F) -> Result<Option<T>>
where
    S: SimulatorSession + ?Sized,
    F: FnOnce(&mut S, &BodyId) -> Result<T>,
{
    let body = match session.add_body(candidate) {
        Ok(body) => body,
        Err(err) => {
            warn!("Skipping {}: could not add body: {}", candidate.name, err);
            if let Err(release_err) = session.remove_body(&candidate.body_id()) {
                debug!("Release after failed add of {}: {}", candidate.name, release_err);
            }
            return Ok(None);
        }
    };

    let outcome = f(session, &body);
    let released = session.remove_body(&body);

    match (outcome, released) {
        (Ok(value), Ok(())) => Ok(Some(value)),
        (Ok(_), Err(release_err)) => Err(release_err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(release_err)) => {
            warn!("Failed to release {} after error: {}", body, release_err);
            Err(err)
        }
    }
}
