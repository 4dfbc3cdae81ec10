use crate::config::LoadConfig;
use crate::metrics::MetricsAggregator;
use crate::report::{self, RunReport};
use crate::runner::monitor::ProgressMonitor;
use crate::runner::parser::{load_scenarios, ScenarioFile};
use crate::runner::Scheduler;
use crate::scenario::Scenario;
use crate::thresholds;
use crate::utils::parse_duration;
use anyhow::{Context, Result};
use chrono::Utc;
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Mutex};

pub struct RunOptions {
    pub target: PathBuf,
    pub output: Option<PathBuf>,
    pub vus: Option<u32>,
    pub duration: Option<String>,
    pub tick_interval: Option<String>,
    pub grace_timeout: Option<String>,
    pub report_interval: String,
    pub ci: bool,
}

/// Load, compile and run a scenario; returns the process exit code.
pub async fn handle_run(options: RunOptions) -> Result<i32> {
    let report_interval = parse_duration(&options.report_interval)?;

    let mut files = load_scenarios(&options.target).await?;
    if files.len() > 1 {
        println!(
            "{} Found {} scenario files, running the first",
            "→".cyan(),
            files.len()
        );
    }
    let ScenarioFile {
        name: file_name,
        mut config,
    } = files.remove(0);

    // --vus/--duration replace the file's load shape with a flat profile.
    if options.vus.is_some() || options.duration.is_some() {
        config.load = LoadConfig {
            stages: None,
            vus: options.vus.or(config.load.vus).or(Some(10)),
            duration: options.duration.clone().or(config.load.duration),
            iterations: config.load.iterations,
        };
    }

    let mut scenario = Scenario::compile(config)
        .with_context(|| format!("Invalid scenario in {}", file_name))?;
    apply_timing_overrides(
        &mut scenario.options,
        options.tick_interval.as_deref(),
        options.grace_timeout.as_deref(),
    )?;
    let scenario = Arc::new(scenario);

    println!(
        "{} Starting load test: {}",
        "→".cyan(),
        scenario.name.bright_white()
    );
    println!(
        "  Steps: {} ({} requests per iteration)",
        scenario.steps.len(),
        scenario.request_step_count()
    );
    match scenario.profile.total_duration() {
        Some(total) => println!(
            "  Duration: {}",
            crate::utils::format_duration(total).bright_white()
        ),
        None => println!(
            "  Iterations per user: {}",
            scenario
                .profile
                .iterations()
                .unwrap_or_default()
                .to_string()
                .bright_white()
        ),
    }

    let metrics = Arc::new(Mutex::new(MetricsAggregator::new()));
    let scheduler = Scheduler::new(Arc::clone(&scenario), Arc::clone(&metrics))?;

    // Ctrl-C hard-aborts the run; the task keeps the sender alive.
    let (abort_tx, abort_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = abort_tx.send(true);
        }
    });

    let (done_tx, done_rx) = watch::channel(false);
    let monitor = ProgressMonitor::new(report_interval, options.ci).spawn(
        Arc::clone(&metrics),
        scenario.profile.total_duration(),
        done_rx,
    );

    let started_at = Utc::now();
    let started = Instant::now();
    let status = scheduler.run(abort_rx).await?;
    let wall = started.elapsed();

    let _ = done_tx.send(true);
    let _ = monitor.await;

    let (summary, verdicts) = {
        let metrics = metrics.lock().await;
        (
            metrics.summary(wall),
            thresholds::evaluate_all(&scenario.thresholds, &metrics),
        )
    };

    let run_report = RunReport {
        scenario: scenario.name.clone(),
        status,
        started_at,
        finished_at: Utc::now(),
        summary,
        thresholds: verdicts,
    };

    report::print_summary(&run_report);

    if let Some(path) = &options.output {
        run_report
            .save(path)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        println!("{} Report saved to {}", "✔".green(), path.display());
    }

    Ok(run_report.exit_code())
}

/// `--tick-interval` and `--grace-timeout` beat the scenario file's
/// `options:` block.
fn apply_timing_overrides(
    options: &mut crate::scenario::RunOptions,
    tick_interval: Option<&str>,
    grace_timeout: Option<&str>,
) -> Result<()> {
    if let Some(tick) = tick_interval {
        options.tick_interval = parse_duration(tick)?;
    }
    if let Some(grace) = grace_timeout {
        options.grace_timeout = parse_duration(grace)?;
    }
    Ok(())
}
