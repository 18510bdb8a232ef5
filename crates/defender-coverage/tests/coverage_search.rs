//! Coverage search and survey against a scripted simulator session

use chrono::{DateTime, Duration, TimeZone, Utc};
use defender_coverage::{
    attack_baseline, survey_instant, BodyId, CancelFlag, Candidate, CatalogId, CoverageError,
    CoverageRun, CoverageSearch, CoverageSetup, GeometryProvider, RunClock, SearchParams,
    SimulatorSession, TimeSlot, TimeWindow,
};
use std::collections::{HashMap, HashSet};

const ATTACKER: &str = "ATTACKER";
const VICTIM: &str = "VICTIM";

// Feasible: +3.33 ms with a 5 ms tail. Infeasible: DtoV too long.
const ATOV_KM: f64 = 700.0;
const ATOD_KM: f64 = 1000.0;
const DTOV_NEAR_KM: f64 = 200.0;
const DTOV_FAR_KM: f64 = 5000.0;

fn minute(m: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::minutes(m)
}

fn slot(m: i64) -> TimeSlot {
    TimeSlot::new(minute(m))
}

fn id(name: &str) -> BodyId {
    BodyId::new(name)
}

#[derive(Default)]
struct StubSession {
    ranges: HashMap<(BodyId, BodyId), Vec<(DateTime<Utc>, f64)>>,
    active: HashSet<BodyId>,
    adds: Vec<BodyId>,
    removes: Vec<BodyId>,
    range_calls: Vec<(BodyId, BodyId)>,
    fail_add: HashSet<BodyId>,
    fail_geometry: HashSet<BodyId>,
    cancel_on_add: Option<(BodyId, CancelFlag)>,
}

impl StubSession {
    fn new() -> Self {
        let mut session = Self::default();
        session.active.insert(id(ATTACKER));
        session.active.insert(id(VICTIM));
        session
    }

    fn with_range(mut self, a: &str, b: &str, samples: Vec<(DateTime<Utc>, f64)>) -> Self {
        self.ranges.insert((id(a), id(b)), samples);
        self
    }

    fn with_baseline(self, minutes: &[i64]) -> Self {
        let samples = minutes.iter().map(|&m| (minute(m), ATOV_KM)).collect();
        self.with_range(ATTACKER, VICTIM, samples)
    }

    /// Both legs of `name`, feasible at `near` and infeasible at `far`
    fn with_defender(self, name: &str, near: &[i64], far: &[i64]) -> Self {
        let atod = near.iter().chain(far).map(|&m| (minute(m), ATOD_KM)).collect();
        let dtov = near
            .iter()
            .map(|&m| (minute(m), DTOV_NEAR_KM))
            .chain(far.iter().map(|&m| (minute(m), DTOV_FAR_KM)))
            .collect();
        self.with_range(ATTACKER, name, atod).with_range(name, VICTIM, dtov)
    }

    fn candidate_range_calls(&self) -> usize {
        let baseline = (id(ATTACKER), id(VICTIM));
        self.range_calls.iter().filter(|&call| *call != baseline).count()
    }
}

impl GeometryProvider for StubSession {
    fn range_series_km(
        &mut self,
        a: &BodyId,
        b: &BodyId,
        _step: Duration,
    ) -> defender_coverage::Result<Vec<(DateTime<Utc>, f64)>> {
        self.range_calls.push((a.clone(), b.clone()));
        for body in [a, b] {
            if !self.active.contains(body) {
                return Err(CoverageError::UnknownBody(body.clone()));
            }
            if self.fail_geometry.contains(body) {
                return Err(CoverageError::Geometry(a.clone(), b.clone(), "link lost".into()));
            }
        }
        Ok(self
            .ranges
            .get(&(a.clone(), b.clone()))
            .cloned()
            .unwrap_or_default())
    }
}

impl SimulatorSession for StubSession {
    fn add_body(&mut self, candidate: &Candidate) -> defender_coverage::Result<BodyId> {
        let body = candidate.body_id();
        self.adds.push(body.clone());
        if let Some((trigger, flag)) = &self.cancel_on_add {
            if *trigger == body {
                flag.cancel();
            }
        }
        if self.fail_add.contains(&body) {
            return Err(CoverageError::AddBody(body, "rejected".into()));
        }
        self.active.insert(body.clone());
        Ok(body)
    }

    fn remove_body(&mut self, body: &BodyId) -> defender_coverage::Result<()> {
        self.removes.push(body.clone());
        self.active.remove(body);
        Ok(())
    }
}

fn pool(names: &[&str]) -> Vec<Candidate> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| Candidate::new(*name, CatalogId::from_norad(40000 + i as u64)))
        .collect()
}

fn params() -> SearchParams {
    SearchParams {
        attacker: id(ATTACKER),
        victim: id(VICTIM),
        step: Duration::seconds(60),
        tail_duration: 0.005,
        candidate_limit: None,
    }
}

fn constellations(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_first_feasible_candidate_in_catalog_order_wins() {
    let mut session = StubSession::new()
        .with_baseline(&[0, 1, 2, 3])
        .with_defender("STARLINK-1", &[0, 1], &[2, 3])
        .with_defender("STARLINK-2", &[1, 2], &[])
        .with_defender("STARLINK-3", &[1, 2, 3], &[]);
    let pool = pool(&["STARLINK-1", "STARLINK-2", "STARLINK-3"]);
    let params = params();

    let baseline = attack_baseline(&mut session, &params).unwrap();
    let reports = CoverageSearch::new(&mut session, &params)
        .run(&constellations(&["starlink"]), &pool, &baseline)
        .unwrap();
    let report = &reports[0];

    let owner = |m| report.coverage.defender(slot(m)).unwrap().candidate.as_str();
    assert_eq!(owner(0), "STARLINK-1");
    assert_eq!(owner(1), "STARLINK-1");
    assert_eq!(owner(2), "STARLINK-2");
    assert_eq!(owner(3), "STARLINK-3");
    assert_eq!(report.defended_count, 4);
    assert_eq!(report.undefended_count, 0);
    assert!((report.defended_percentage - 100.0).abs() < 1e-12);
}

#[test]
fn test_no_queries_after_every_slot_is_covered() {
    let mut session = StubSession::new()
        .with_baseline(&[0, 1, 2])
        .with_defender("STARLINK-1", &[0, 1, 2], &[])
        .with_defender("STARLINK-2", &[0, 1, 2], &[]);
    let pool = pool(&["STARLINK-1", "STARLINK-2", "STARLINK-3"]);
    let params = params();

    let baseline = attack_baseline(&mut session, &params).unwrap();
    let report = CoverageSearch::new(&mut session, &params)
        .search_constellation("starlink", &pool, &baseline)
        .unwrap();

    assert_eq!(report.defended_count, 3);
    assert_eq!(report.candidates_total, 3);
    assert_eq!(report.candidates_evaluated, 1);
    assert_eq!(session.adds, vec![id("STARLINK-1")]);
    // One AtoD and one DtoV fetch for the only candidate evaluated
    assert_eq!(session.candidate_range_calls(), 2);
}

#[test]
fn test_candidate_never_in_range_skips_second_leg() {
    let mut session = StubSession::new()
        .with_baseline(&[0, 1])
        .with_defender("STARLINK-2", &[0, 1], &[]);
    let pool = pool(&["STARLINK-1", "STARLINK-2"]);
    let params = params();

    let baseline = attack_baseline(&mut session, &params).unwrap();
    let report = CoverageSearch::new(&mut session, &params)
        .search_constellation("starlink", &pool, &baseline)
        .unwrap();

    assert_eq!(report.defended_count, 2);
    let starlink1 = session
        .range_calls
        .iter()
        .filter(|(a, b)| *a == id("STARLINK-1") || *b == id("STARLINK-1"))
        .count();
    assert_eq!(starlink1, 1);
}

#[test]
fn test_slot_needs_both_legs_at_the_same_instant() {
    let mut session = StubSession::new()
        .with_baseline(&[0, 1])
        .with_range(ATTACKER, "STARLINK-1", vec![(minute(0), ATOD_KM)])
        .with_range("STARLINK-1", VICTIM, vec![(minute(1), DTOV_NEAR_KM)])
        .with_defender("STARLINK-2", &[], &[0, 1]);
    let pool = pool(&["STARLINK-1", "STARLINK-2"]);
    let params = params();

    let baseline = attack_baseline(&mut session, &params).unwrap();
    let report = CoverageSearch::new(&mut session, &params)
        .search_constellation("starlink", &pool, &baseline)
        .unwrap();

    assert_eq!(report.defended_count, 0);
    assert_eq!(report.undefended_count, 2);
    assert_eq!(report.defended_percentage, 0.0);
    assert_eq!(report.candidates_evaluated, 2);
}

#[test]
fn test_every_baseline_slot_is_reported() {
    let minutes = [0, 1, 2, 3, 4, 5];
    let mut session = StubSession::new()
        .with_baseline(&minutes)
        .with_defender("IRIDIUM 7", &[1, 4], &[2]);
    let pool = pool(&["STARLINK-1", "IRIDIUM 7", "IRIDIUM 8"]);
    let params = params();

    let baseline = attack_baseline(&mut session, &params).unwrap();
    let report = CoverageSearch::new(&mut session, &params)
        .search_constellation("iridium", &pool, &baseline)
        .unwrap();

    assert_eq!(report.total_slots(), minutes.len());
    assert_eq!(report.defended_count + report.undefended_count, minutes.len());
    let reported: Vec<_> = report.coverage.iter().map(|(s, _)| s).collect();
    let expected: Vec<_> = minutes.iter().map(|&m| slot(m)).collect();
    assert_eq!(reported, expected);
    assert_eq!(report.candidates_total, 2);
    assert!(session.adds.iter().all(|b| b.as_str().starts_with("IRIDIUM")));
}

#[test]
fn test_every_added_body_is_removed_once() {
    let mut session = StubSession::new()
        .with_baseline(&[0, 1, 2])
        .with_defender("STARLINK-1", &[0], &[])
        .with_defender("STARLINK-2", &[], &[1])
        .with_defender("STARLINK-3", &[1], &[]);
    session.fail_add.insert(id("STARLINK-2"));
    let pool = pool(&["STARLINK-1", "STARLINK-2", "STARLINK-3", "STARLINK-4"]);
    let params = params();

    let baseline = attack_baseline(&mut session, &params).unwrap();
    let report = CoverageSearch::new(&mut session, &params)
        .search_constellation("starlink", &pool, &baseline)
        .unwrap();

    assert_eq!(report.defended_count, 2);
    assert_eq!(report.candidates_total, 4);
    // STARLINK-2 was skipped, not evaluated
    assert_eq!(report.candidates_evaluated, 3);
    assert_eq!(session.adds, session.removes);
    assert_eq!(session.active.len(), 2);
}

#[test]
fn test_provider_failure_aborts_but_releases_body() {
    let mut session = StubSession::new()
        .with_baseline(&[0, 1])
        .with_defender("STARLINK-1", &[], &[0, 1])
        .with_defender("STARLINK-2", &[0, 1], &[]);
    session.fail_geometry.insert(id("STARLINK-2"));
    let pool = pool(&["STARLINK-1", "STARLINK-2", "STARLINK-3"]);
    let params = params();

    let baseline = attack_baseline(&mut session, &params).unwrap();
    let err = CoverageSearch::new(&mut session, &params)
        .run(&constellations(&["starlink"]), &pool, &baseline)
        .unwrap_err();

    assert!(matches!(err, CoverageError::Geometry(..)));
    assert_eq!(session.adds, vec![id("STARLINK-1"), id("STARLINK-2")]);
    assert_eq!(session.adds, session.removes);
}

#[test]
fn test_cancellation_keeps_partial_report() {
    let cancel = CancelFlag::new();
    let mut session = StubSession::new()
        .with_baseline(&[0, 1, 2])
        .with_defender("STARLINK-1", &[0], &[])
        .with_defender("STARLINK-2", &[1, 2], &[]);
    session.cancel_on_add = Some((id("STARLINK-1"), cancel.clone()));
    let pool = pool(&["STARLINK-1", "STARLINK-2", "IRIDIUM 1"]);
    let params = params();

    let baseline = attack_baseline(&mut session, &params).unwrap();
    let reports = CoverageSearch::new(&mut session, &params)
        .with_cancel(cancel)
        .run(&constellations(&["starlink", "iridium"]), &pool, &baseline)
        .unwrap();

    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert!(report.cancelled);
    assert_eq!(report.candidates_evaluated, 1);
    assert_eq!(report.defended_count, 1);
    assert_eq!(report.undefended_count, 2);
    assert_eq!(session.adds, session.removes);
}

#[test]
fn test_candidate_limit() {
    let mut session = StubSession::new()
        .with_baseline(&[0, 1])
        .with_defender("STARLINK-2", &[0, 1], &[]);
    let pool = pool(&["STARLINK-1", "STARLINK-2"]);
    let params = SearchParams {
        candidate_limit: Some(1),
        ..params()
    };

    let baseline = attack_baseline(&mut session, &params).unwrap();
    let report = CoverageSearch::new(&mut session, &params)
        .search_constellation("starlink", &pool, &baseline)
        .unwrap();

    assert_eq!(report.candidates_total, 1);
    assert_eq!(report.defended_count, 0);
    assert_eq!(session.adds, vec![id("STARLINK-1")]);
}

#[test]
fn test_subsecond_jitter_still_matches_slot() {
    let jitter = Duration::milliseconds(400);
    let mut session = StubSession::new()
        .with_baseline(&[0])
        .with_range(ATTACKER, "STARLINK-1", vec![(minute(0) + jitter, ATOD_KM)])
        .with_range("STARLINK-1", VICTIM, vec![(minute(0) + jitter * 2, DTOV_NEAR_KM)]);
    let pool = pool(&["STARLINK-1"]);
    let params = params();

    let baseline = attack_baseline(&mut session, &params).unwrap();
    let report = CoverageSearch::new(&mut session, &params)
        .search_constellation("starlink", &pool, &baseline)
        .unwrap();

    let result = report.coverage.defender(slot(0)).unwrap();
    assert_eq!(result.atov.meters(), 700_000.0);
    assert_eq!(result.atod.meters(), 1_000_000.0);
    assert_eq!(result.dtov.meters(), 200_000.0);
    assert!((result.decision_delay * 1000.0 - 3.332).abs() < 0.001);
}

#[test]
fn test_never_visible_is_fatal() {
    let mut session = StubSession::new();
    let err = attack_baseline(&mut session, &params()).unwrap_err();
    assert!(matches!(err, CoverageError::NeverVisible { .. }));
}

#[test]
fn test_survey_records_every_feasible_defender() {
    let mut session = StubSession::new()
        .with_baseline(&[0, 1, 2])
        .with_defender("STARLINK-1", &[1], &[])
        .with_defender("IRIDIUM 5", &[], &[1])
        .with_defender("STARLINK-2", &[0, 1], &[]);
    let pool = pool(&["STARLINK-1", "IRIDIUM 5", "STARLINK-2", "STARLINK-3"]);

    let survey = survey_instant(&mut session, &params(), slot(1), &pool, None).unwrap();

    let names: Vec<_> = survey.defenders.iter().map(|d| d.candidate.as_str()).collect();
    assert_eq!(names, vec!["STARLINK-1", "STARLINK-2"]);
    assert_eq!(survey.atov.kilometers(), ATOV_KM);
    assert_eq!(survey.candidates_evaluated, 4);
    assert_eq!(session.adds.len(), 4);
    assert_eq!(session.adds, session.removes);
}

#[test]
fn test_survey_skips_candidates_that_cannot_be_added() {
    let mut session = StubSession::new()
        .with_baseline(&[0])
        .with_defender("STARLINK-1", &[0], &[])
        .with_defender("STARLINK-2", &[0], &[]);
    session.fail_add.insert(id("STARLINK-1"));
    let pool = pool(&["STARLINK-1", "STARLINK-2"]);

    let survey = survey_instant(&mut session, &params(), slot(0), &pool, None).unwrap();

    assert_eq!(survey.candidates_total, 2);
    assert_eq!(survey.candidates_evaluated, 1);
    assert_eq!(survey.defenders.len(), 1);
    assert_eq!(survey.defenders[0].candidate, "STARLINK-2");
    assert_eq!(session.adds, session.removes);
}

#[test]
fn test_survey_stops_when_cancelled() {
    let cancel = CancelFlag::new();
    let mut session = StubSession::new()
        .with_baseline(&[0])
        .with_defender("STARLINK-1", &[0], &[])
        .with_defender("STARLINK-2", &[0], &[]);
    session.cancel_on_add = Some((id("STARLINK-1"), cancel.clone()));
    let pool = pool(&["STARLINK-1", "STARLINK-2", "STARLINK-3"]);

    let survey = survey_instant(&mut session, &params(), slot(0), &pool, Some(&cancel)).unwrap();

    assert!(survey.cancelled);
    assert_eq!(survey.candidates_evaluated, 1);
    assert_eq!(survey.defenders.len(), 1);
    assert_eq!(session.adds, vec![id("STARLINK-1")]);
    assert_eq!(session.adds, session.removes);
}

#[test]
fn test_survey_requires_attack_at_target() {
    let mut session = StubSession::new().with_baseline(&[0, 1]);
    let pool = pool(&["STARLINK-1"]);

    let err = survey_instant(&mut session, &params(), slot(5), &pool, None).unwrap_err();
    assert!(matches!(err, CoverageError::NotVisibleAt { .. }));
    assert!(session.adds.is_empty());
}

#[test]
fn test_coverage_run_json_layout() {
    let mut session = StubSession::new()
        .with_baseline(&[0, 1])
        .with_defender("STARLINK-1", &[1], &[0]);
    let pool = pool(&["STARLINK-1"]);
    let params = params();
    let window = TimeWindow::new(minute(0), minute(1), params.step).unwrap();

    let clock = RunClock::start();
    let baseline = attack_baseline(&mut session, &params).unwrap();
    let reports = CoverageSearch::new(&mut session, &params)
        .run(&constellations(&["starlink", "iridium"]), &pool, &baseline)
        .unwrap();
    let run = CoverageRun::new(
        CoverageSetup::new(&params, &window, Some(9600.0), baseline.len()),
        clock.finish(),
        reports,
    );

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report_coverage.json");
    run.write_json(&path).unwrap();
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();

    for key in ["setup", "runtime", "report"] {
        assert!(json.get(key).is_some(), "missing {}", key);
    }
    assert_eq!(json["setup"]["Victim"], "VICTIM");
    assert_eq!(json["setup"]["Bit rate"], 9600.0);

    let starlink = &json["report"]["starlink"];
    assert_eq!(starlink["defended times"], 1);
    assert_eq!(starlink["not defended times"], 1);
    assert_eq!(starlink["defend percentage"], 50.0);
    assert_eq!(starlink["defenders"]["2024-03-01T12:00:00Z"], serde_json::json!({}));
    let entry = &starlink["defenders"]["2024-03-01T12:01:00Z"]["STARLINK-1"];
    assert_eq!(entry["AtoV"], 700_000.0);
    assert_eq!(entry["AtoD"], 1_000_000.0);
    assert_eq!(entry["DtoV"], 200_000.0);

    assert_eq!(json["report"]["iridium"]["candidates"], 0);
    assert_eq!(json["report"]["iridium"]["defend percentage"], 0.0);
}
