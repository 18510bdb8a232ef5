//! Defender Coverage CLI
//!
//! Usage:
//!   defender-coverage coverage --scenario scenario.toml
//!   defender-coverage survey --scenario scenario.toml --at 2024-03-01T12:30:00Z
//!   defender-coverage timeline --atod-km 1000 --dtov-km 200 --atov-km 700 --tail-ms 5
//!   defender-coverage catalog --catalog data/celestrak_active.json --filter starlink

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use decision_window::{decision_delay, DecisionTimeline};
use defender_coverage::{
    attack_baseline, constellation_members, load_catalog, survey_instant, CancelFlag, Catalog,
    CoverageRun, CoverageSearch, CoverageSetup, Distance, RunClock, ScenarioConfig, SearchParams, Sgp4Session,
    SurveyRun, TailSpec, TimeSlot,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(
    name = "defender-coverage",
    about = "Find satellites that can jam an attack before its tail reaches the victim"
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sweep the scenario window and report which slots each constellation defends
    Coverage {
        /// Scenario TOML file
        #[arg(short, long, default_value = "scenario.toml")]
        scenario: PathBuf,

        /// Output JSON file (overrides the scenario)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Constellations to test (overrides the scenario)
        #[arg(short, long)]
        constellation: Vec<String>,
    },

    /// List every satellite that can defend at one instant
    Survey {
        /// Scenario TOML file
        #[arg(short, long, default_value = "scenario.toml")]
        scenario: PathBuf,

        /// Target instant (RFC 3339); defaults to the scenario's target time
        #[arg(long)]
        at: Option<DateTime<Utc>>,

        /// Output JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the event timeline of a single attacker/defender/victim geometry
    Timeline {
        #[arg(long)]
        atod_km: f64,

        #[arg(long)]
        dtov_km: f64,

        #[arg(long)]
        atov_km: f64,

        /// Tail reception time in ms; otherwise derived from bit rate and tail size
        #[arg(long, conflicts_with_all = ["bit_rate", "tail_bytes"])]
        tail_ms: Option<f64>,

        #[arg(long, default_value_t = 9600.0)]
        bit_rate: f64,

        #[arg(long, default_value_t = 6)]
        tail_bytes: u32,
    },

    /// Inspect a CelesTrak catalog
    Catalog {
        #[arg(short, long, default_value = "data/celestrak_active.json")]
        catalog: PathBuf,

        /// Only list objects whose name contains this
        #[arg(short, long)]
        filter: Option<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Coverage {
            scenario,
            output,
            constellation,
        } => run_coverage(&scenario, output, constellation),
        Command::Survey {
            scenario,
            at,
            output,
        } => run_survey(&scenario, at, output),
        Command::Timeline {
            atod_km,
            dtov_km,
            atov_km,
            tail_ms,
            bit_rate,
            tail_bytes,
        } => {
            let tail = match tail_ms {
                Some(duration_ms) => TailSpec::Duration { duration_ms },
                None => TailSpec::Bits {
                    bit_rate,
                    tail_bytes,
                },
            };
            print_timeline(atod_km, dtov_km, atov_km, tail)
        }
        Command::Catalog { catalog, filter } => list_catalog(&catalog, filter.as_deref()),
    }
}

/// Cancel the running search on the first Ctrl-C, exit on the second
fn cancel_on_ctrl_c() -> CancelFlag {
    let flag = CancelFlag::new();
    let watcher = flag.clone();
    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!("Ctrl-C handling unavailable: {}", e);
                return;
            }
        };
        runtime.block_on(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            warn!("Interrupted, stopping after the current candidate (Ctrl-C again to abort)");
            watcher.cancel();
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(130);
            }
        });
    });
    flag
}

fn banner(title: &str) {
    info!("{}", "=".repeat(60));
    info!("{}", title);
    info!("{}", "=".repeat(60));
}

struct Scenario {
    config: ScenarioConfig,
    catalog: Catalog,
    tail_duration: f64,
}

fn load_scenario(path: &Path) -> Result<Scenario> {
    let config = ScenarioConfig::from_file(path)
        .with_context(|| format!("Failed to read scenario {:?}", path))?;
    let tail_duration = config.tail_duration().context("Invalid tail specification")?;
    let catalog = load_catalog(&config.catalog)
        .with_context(|| format!("Failed to load catalog {:?}", config.catalog))?;

    Ok(Scenario {
        config,
        catalog,
        tail_duration,
    })
}

/// Session with Attacker and Victim in place
fn open_session<'c>(
    config: &ScenarioConfig,
    catalog: &'c Catalog,
    tail_duration: f64,
) -> Result<(Sgp4Session<'c>, SearchParams)> {
    let window = config.window().context("Invalid scenario window")?;
    let mut session =
        Sgp4Session::new(catalog, window).with_grazing_altitude(config.grazing_altitude_km);

    let attacker = session
        .add_fixed_body(&config.attacker)
        .with_context(|| format!("Cannot simulate attacker {}", config.attacker.name))?;
    let victim = session
        .add_fixed_body(&config.victim)
        .with_context(|| format!("Cannot simulate victim {}", config.victim.name))?;

    let params = SearchParams {
        attacker,
        victim,
        step: window.step,
        tail_duration,
        candidate_limit: config.candidate_limit,
    };
    Ok((session, params))
}

fn run_coverage(
    scenario: &Path,
    output: Option<PathBuf>,
    constellations: Vec<String>,
) -> Result<()> {
    banner("Defender Coverage Search");

    let Scenario {
        mut config,
        catalog,
        tail_duration,
    } = load_scenario(scenario)?;
    if !constellations.is_empty() {
        config.constellations = constellations;
    }
    let output = output.unwrap_or_else(|| config.output.clone());

    let (mut session, params) = open_session(&config, &catalog, tail_duration)?;
    let window = *session.window();
    info!(
        "{} -> {} from {} to {} every {}s, tail {:.4} ms",
        params.attacker,
        params.victim,
        TimeSlot::new(window.start),
        TimeSlot::new(window.end),
        window.step_seconds(),
        tail_duration * 1000.0
    );

    let cancel = cancel_on_ctrl_c();
    let clock = RunClock::start();
    let baseline = attack_baseline(&mut session, &params)
        .context("Attacker and victim must be in range of each other at least once")?;
    let reports = CoverageSearch::new(&mut session, &params)
        .with_cancel(cancel)
        .run(&config.constellations, catalog.candidates(), &baseline)?;
    let runtime = clock.finish();
    if let Some(report) = reports.iter().find(|r| r.cancelled) {
        warn!("Search cancelled during {}; the report is partial", report.name);
    }

    let setup = CoverageSetup::new(&params, &window, config.tail.bit_rate(), baseline.len());
    let run = CoverageRun::new(setup, runtime, reports);
    run.write_json(&output)
        .with_context(|| format!("Failed to write report {:?}", output))?;

    // Summary
    banner("SUMMARY");
    info!("Runtime: {}", run.runtime.runtime);
    for report in &run.report {
        info!(
            "  {:<20} {:>6} / {:<6} slots defended ({:.2}%)",
            report.name,
            report.defended_count,
            report.total_slots(),
            report.defended_percentage
        );
    }

    Ok(())
}

fn run_survey(scenario: &Path, at: Option<DateTime<Utc>>, output: Option<PathBuf>) -> Result<()> {
    banner("Defender Survey");

    let Scenario {
        config,
        catalog,
        tail_duration,
    } = load_scenario(scenario)?;
    let target = at.map(TimeSlot::new).unwrap_or_else(|| config.target_slot());
    let output = output.unwrap_or_else(|| config.output.with_file_name("report_survey.json"));

    let (mut session, params) = open_session(&config, &catalog, tail_duration)?;

    let cancel = cancel_on_ctrl_c();
    let clock = RunClock::start();
    let survey = survey_instant(
        &mut session,
        &params,
        target,
        catalog.candidates(),
        Some(&cancel),
    )
    .with_context(|| format!("No attack to defend at {}", target))?;
    let runtime = clock.finish();

    info!(
        "AtoV at {}: {:.3} km, {} defenders",
        survey.at,
        survey.atov.kilometers(),
        survey.defenders.len()
    );
    if survey.cancelled {
        warn!("Survey cancelled after {} candidates", survey.candidates_evaluated);
    }

    let run = SurveyRun::new(&params, survey, config.tail.bit_rate(), runtime);
    run.write_json(&output)
        .with_context(|| format!("Failed to write report {:?}", output))?;

    Ok(())
}

fn print_timeline(atod_km: f64, dtov_km: f64, atov_km: f64, tail: TailSpec) -> Result<()> {
    let atod = Distance::from_kilometers(atod_km).context("Invalid AtoD")?;
    let dtov = Distance::from_kilometers(dtov_km).context("Invalid DtoV")?;
    let atov = Distance::from_kilometers(atov_km).context("Invalid AtoV")?;
    let tail_duration = tail.duration().context("Invalid tail specification")?;

    let timeline = DecisionTimeline::new(atod, dtov, atov, tail_duration);
    let delay = decision_delay(atod, dtov, atov, tail_duration);

    print!("{}", timeline);
    println!(
        "Decision delay: {:+.6} ms ({})",
        delay * 1000.0,
        if delay > 0.0 { "defendable" } else { "too late" }
    );
    Ok(())
}

fn list_catalog(path: &Path, filter: Option<&str>) -> Result<()> {
    let catalog =
        load_catalog(path).with_context(|| format!("Failed to load catalog {:?}", path))?;

    let members = match filter {
        Some(name) => constellation_members(catalog.candidates(), name),
        None => catalog.candidates().iter().collect(),
    };
    for candidate in &members {
        println!(
            "{}  {:<30} {}",
            candidate.catalog_id,
            candidate.name,
            if catalog.elements(&candidate.catalog_id).is_some() {
                "elements"
            } else {
                "-"
            }
        );
    }
    info!("{} of {} objects listed", members.len(), catalog.len());

    let collisions = catalog.body_name_collisions();
    if !collisions.is_empty() {
        warn!("{} simulator names are shared by several objects", collisions.len());
    }
    Ok(())
}
