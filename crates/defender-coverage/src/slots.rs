//! Time slots, scenario windows and range series

use crate::{CoverageError, Result};
use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use decision_window::Distance;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Whole-second instant used as a lookup key.
///
/// Providers do not always land exactly on the step grid, so sub-second
/// jitter is discarded on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeSlot(DateTime<Utc>);

impl TimeSlot {
    pub fn new(at: DateTime<Utc>) -> Self {
        TimeSlot(at.trunc_subsecs(0))
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.0
    }
}

impl From<DateTime<Utc>> for TimeSlot {
    fn from(at: DateTime<Utc>) -> Self {
        TimeSlot::new(at)
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}

impl Serialize for TimeSlot {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Closed scenario window `[start, end]` sampled at a fixed step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub step: Duration,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, step: Duration) -> Result<Self> {
        if end < start {
            return Err(CoverageError::InvalidWindow(format!(
                "end {} is before start {}",
                end, start
            )));
        }
        if step < Duration::seconds(1) {
            return Err(CoverageError::InvalidWindow(format!(
                "step must be at least one second, got {}",
                step
            )));
        }
        Ok(Self { start, end, step })
    }

    /// Same window, different sampling step
    pub fn with_step(&self, step: Duration) -> Result<Self> {
        Self::new(self.start, self.end, step)
    }

    pub fn step_seconds(&self) -> i64 {
        self.step.num_seconds()
    }

    /// Every instant `start + k * step` that does not pass `end`
    pub fn instants(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        let mut next = Some(self.start);
        std::iter::from_fn(move || {
            let current = next?;
            if current > self.end {
                return None;
            }
            next = current.checked_add_signed(self.step);
            Some(current)
        })
    }

    pub fn slots(&self) -> Vec<TimeSlot> {
        self.instants().map(TimeSlot::new).collect()
    }
}

/// Range between two bodies at every slot where they see each other.
///
/// A slot that is absent means "not visible then"; that is an ordinary
/// outcome, not an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeSeries(BTreeMap<TimeSlot, Distance>);

impl RangeSeries {
    /// Convert raw provider samples (kilometers) into a series in meters.
    ///
    /// This is the only place provider kilometers are turned into meters.
    pub fn from_kilometers<I>(samples: I) -> Result<Self>
    where
        I: IntoIterator<Item = (DateTime<Utc>, f64)>,
    {
        let mut series = BTreeMap::new();
        for (at, range_km) in samples {
            series.insert(TimeSlot::new(at), Distance::from_kilometers(range_km)?);
        }
        Ok(RangeSeries(series))
    }

    pub fn get(&self, slot: TimeSlot) -> Option<Distance> {
        self.0.get(&slot).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Slots in time order
    pub fn slots(&self) -> impl Iterator<Item = TimeSlot> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TimeSlot, Distance)> + '_ {
        self.0.iter().map(|(slot, d)| (*slot, *d))
    }
}
