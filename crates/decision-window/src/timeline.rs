//! Event timeline of a single signal race
//!
//! All instants are seconds after the Attacker starts sending the tail.

use crate::{propagation_time, Distance};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed time interval (seconds)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub start: f64,
    pub end: f64,
}

impl Window {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Signed length; negative when the window has closed before it opened
    pub fn length(&self) -> f64 {
        self.end - self.start
    }

    pub fn is_open(&self) -> bool {
        self.length() > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecisionTimeline {
    /// Tail start travelling Attacker -> Victim
    pub tail_start_to_victim: Window,
    /// Tail start travelling Attacker -> Defender
    pub tail_start_to_defender: Window,
    /// Victim receiving the tail, first to last bit
    pub tail_reception_at_victim: Window,
    /// Jamming signal in flight Defender -> Victim, sent at the latest moment
    pub jamming_in_flight: Window,
    /// From hearing the tail start to the latest jamming start
    pub decision_window: Window,
}

impl DecisionTimeline {
    pub fn new(atod: Distance, dtov: Distance, atov: Distance, tail_duration: f64) -> Self {
        let victim_arrival = propagation_time(atov.meters());
        let defender_arrival = propagation_time(atod.meters());
        let tail_end_at_victim = victim_arrival + tail_duration;
        let latest_jamming_start = tail_end_at_victim - propagation_time(dtov.meters());

        Self {
            tail_start_to_victim: Window::new(0.0, victim_arrival),
            tail_start_to_defender: Window::new(0.0, defender_arrival),
            tail_reception_at_victim: Window::new(victim_arrival, tail_end_at_victim),
            jamming_in_flight: Window::new(latest_jamming_start, tail_end_at_victim),
            decision_window: Window::new(defender_arrival, latest_jamming_start),
        }
    }

    pub fn latest_jamming_start(&self) -> f64 {
        self.jamming_in_flight.start
    }
}

impl fmt::Display for DecisionTimeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = [
            ("Attacker -> Victim (tail start)", self.tail_start_to_victim),
            ("Attacker -> Defender (tail start)", self.tail_start_to_defender),
            ("Victim tail reception", self.tail_reception_at_victim),
            ("Defender -> Victim (jamming)", self.jamming_in_flight),
            ("Defender decision window", self.decision_window),
        ];
        for (label, window) in rows {
            writeln!(
                f,
                "{:<36} {:>10.4} ms .. {:>10.4} ms  ({:+.4} ms)",
                label,
                window.start * 1000.0,
                window.end * 1000.0,
                window.length() * 1000.0
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision_delay;

    #[test]
    fn test_decision_window_matches_decision_delay() {
        let atod = Distance::from_kilometers(1000.0).unwrap();
        let dtov = Distance::from_kilometers(200.0).unwrap();
        let atov = Distance::from_kilometers(700.0).unwrap();

        let timeline = DecisionTimeline::new(atod, dtov, atov, 0.005);
        let delay = decision_delay(atod, dtov, atov, 0.005);

        assert!((timeline.decision_window.length() - delay).abs() < 1e-15);
        assert!(timeline.decision_window.is_open());
        assert_eq!(timeline.jamming_in_flight.end, timeline.tail_reception_at_victim.end);
    }

    #[test]
    fn test_closed_window_when_too_far() {
        let atod = Distance::from_kilometers(500.0).unwrap();
        let dtov = Distance::from_kilometers(10_000.0).unwrap();
        let atov = Distance::from_kilometers(500.0).unwrap();

        let timeline = DecisionTimeline::new(atod, dtov, atov, 0.001);
        assert!(!timeline.decision_window.is_open());
        assert!(timeline.latest_jamming_start() < timeline.tail_start_to_defender.end);
    }

    #[test]
    fn test_display_lists_every_row() {
        let d = Distance::from_kilometers(100.0).unwrap();
        let rendered = DecisionTimeline::new(d, d, d, 0.005).to_string();
        assert_eq!(rendered.lines().count(), 5);
        assert!(rendered.contains("Defender decision window"));
    }
}
