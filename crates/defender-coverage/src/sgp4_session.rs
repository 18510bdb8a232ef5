//! In-process simulator session backed by SGP4
//!
//! Bodies are propagated from catalog elements (or explicit TLEs). Two
//! bodies can hear each other when the straight segment between them clears
//! the Earth plus a grazing altitude; the range is the TEME distance.

use crate::config::BodySpec;
use crate::loader::Catalog;
use crate::session::{GeometryProvider, SimulatorSession};
use crate::slots::TimeWindow;
use crate::{BodyId, Candidate, CoverageError, Result};
use chrono::{DateTime, Duration, Utc};
use orbital_mechanics::geometry::{has_line_of_sight, range_km};
use orbital_mechanics::OrbitalBody;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, trace};

pub struct Sgp4Session<'c> {
    catalog: &'c Catalog,
    window: TimeWindow,
    grazing_altitude_km: f64,
    bodies: HashMap<BodyId, OrbitalBody>,
    /// Attacker and Victim; they stay active for the whole session
    fixed: HashSet<BodyId>,
}

impl<'c> Sgp4Session<'c> {
    pub fn new(catalog: &'c Catalog, window: TimeWindow) -> Self {
        Self {
            catalog,
            window,
            grazing_altitude_km: 0.0,
            bodies: HashMap::new(),
            fixed: HashSet::new(),
        }
    }

    pub fn with_grazing_altitude(mut self, grazing_altitude_km: f64) -> Self {
        self.grazing_altitude_km = grazing_altitude_km;
        self
    }

    pub fn window(&self) -> &TimeWindow {
        &self.window
    }

    /// Add a body that is never removed (Attacker or Victim)
    pub fn add_fixed_body(&mut self, spec: &BodySpec) -> Result<BodyId> {
        let body = match &spec.tle {
            Some([line1, line2]) => OrbitalBody::from_tle(&spec.name, line1, line2)?,
            None => {
                let elements = self
                    .catalog
                    .elements_by_name(&spec.name)
                    .ok_or_else(|| CoverageError::UnknownCatalogBody(spec.name.clone()))?;
                OrbitalBody::from_elements(&spec.name, elements)?
            }
        };

        let id = spec.body_id();
        info!("Fixed body {} (NORAD {}, epoch {})", id, body.norad_id, body.epoch);
        self.bodies.insert(id.clone(), body);
        self.fixed.insert(id.clone());
        Ok(id)
    }

    pub fn active_bodies(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_active(&self, body: &BodyId) -> bool {
        self.bodies.contains_key(body)
    }

    fn body(&self, id: &BodyId) -> Result<&OrbitalBody> {
        self.bodies
            .get(id)
            .ok_or_else(|| CoverageError::UnknownBody(id.clone()))
    }
}

impl GeometryProvider for Sgp4Session<'_> {
    fn range_series_km(
        &mut self,
        a: &BodyId,
        b: &BodyId,
        step: Duration,
    ) -> Result<Vec<(DateTime<Utc>, f64)>> {
        let body_a = self.body(a)?;
        let body_b = self.body(b)?;
        let window = self.window.with_step(step)?;

        let mut samples = Vec::new();
        for at in window.instants() {
            let (state_a, state_b) = match (body_a.propagate(at), body_b.propagate(at)) {
                (Ok(state_a), Ok(state_b)) => (state_a, state_b),
                (Err(e), _) | (_, Err(e)) => {
                    trace!("{} -> {} not available at {}: {}", a, b, at, e);
                    continue;
                }
            };

            let (pos_a, pos_b) = (state_a.position(), state_b.position());
            if has_line_of_sight(&pos_a, &pos_b, self.grazing_altitude_km) {
                samples.push((at, range_km(&pos_a, &pos_b)));
            }
        }

        trace!("{} -> {}: {} visible samples", a, b, samples.len());
        Ok(samples)
    }
}

impl SimulatorSession for Sgp4Session<'_> {
    fn add_body(&mut self, candidate: &Candidate) -> Result<BodyId> {
        let id = candidate.body_id();
        if self.fixed.contains(&id) {
            return Err(CoverageError::AddBody(
                id,
                "name is taken by the attacker or victim".to_string(),
            ));
        }

        let elements = self
            .catalog
            .elements(&candidate.catalog_id)
            .ok_or_else(|| CoverageError::AddBody(id.clone(), "no orbital elements".to_string()))?;
        let body = OrbitalBody::from_elements(&candidate.name, elements)
            .map_err(|e| CoverageError::AddBody(id.clone(), e.to_string()))?;

        if self.bodies.insert(id.clone(), body).is_some() {
            debug!("Replaced existing body {}", id);
        }
        Ok(id)
    }

    fn remove_body(&mut self, body: &BodyId) -> Result<()> {
        if self.fixed.contains(body) {
            trace!("Not removing fixed body {}", body);
            return Ok(());
        }
        self.bodies.remove(body);
        Ok(())
    }
}
