use crate::metrics::RunSummary;
use crate::runner::RunStatus;
use crate::thresholds::ThresholdVerdict;
use anyhow::Result;
use chrono::{DateTime, Utc};
use owo_colors::OwoColorize;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Everything the run produced, in the shape written to `--output` and used
/// for the console summary.
#[derive(Debug, Serialize, Deserialize)]
pub struct RunReport {
    pub scenario: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub summary: RunSummary,
    pub thresholds: Vec<ThresholdVerdict>,
}

impl RunReport {
    pub fn thresholds_passed(&self) -> bool {
        self.thresholds.iter().all(|verdict| verdict.passed)
    }

    /// The process exit contract: 0 for a clean completed run, 1 when any
    /// threshold was breached, 3 when the run was aborted.
    pub fn exit_code(&self) -> i32 {
        match self.status {
            RunStatus::Aborted => 3,
            RunStatus::Completed if self.thresholds_passed() => 0,
            RunStatus::Completed => 1,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

pub fn print_summary(report: &RunReport) {
    let summary = &report.summary;

    println!();
    println!("{}", "=".repeat(60).dimmed());
    match report.status {
        RunStatus::Completed => println!("{} Run completed: {}", "✔".green().bold(), report.scenario),
        RunStatus::Aborted => println!("{} Run aborted: {}", "✖".red().bold(), report.scenario),
    }
    println!("{}", "=".repeat(60).dimmed());

    println!();
    println!(
        "  Duration: {}",
        crate::utils::format_duration(Duration::from_millis(summary.wall_ms)).bright_white()
    );
    println!(
        "  Requests: {} ({:.1} rps)",
        summary.total_requests.to_string().bright_white(),
        summary.requests_per_second
    );
    println!(
        "  Failed: {} ({:.2}%)",
        summary.total_errors.to_string().bright_white(),
        summary.error_rate * 100.0
    );

    for (name, step) in &summary.steps {
        println!();
        println!("  {} {}", "▸".cyan(), name.bright_white());
        println!(
            "    count={} errors={} ({:.2}%)",
            step.count,
            step.errors,
            step.error_rate * 100.0
        );
        println!(
            "    latency ms: avg={:.1} min={} p50={} p95={} p99={} max={}",
            step.latency.mean_ms,
            step.latency.min_ms,
            step.latency.p50_ms,
            step.latency.p95_ms,
            step.latency.p99_ms,
            step.latency.max_ms
        );
        if !step.status_codes.is_empty() {
            let codes: Vec<String> = step
                .status_codes
                .iter()
                .map(|(code, n)| format!("{}×{}", code, n))
                .collect();
            println!("    status: {}", codes.join(" "));
        }
        for check in &step.checks {
            let total = check.passed + check.failed;
            if check.failed == 0 {
                println!(
                    "    {} {} ({}/{})",
                    "✔".green(),
                    check.name,
                    check.passed,
                    total
                );
            } else {
                println!(
                    "    {} {} ({}/{} passed)",
                    "✘".red(),
                    check.name,
                    check.passed,
                    total
                );
            }
        }
    }

    if !report.thresholds.is_empty() {
        println!();
        println!("  {}:", "Thresholds".bright_white());
        for verdict in &report.thresholds {
            let scope = verdict
                .step
                .as_deref()
                .map(|s| format!("{}: ", s))
                .unwrap_or_default();
            if verdict.passed {
                println!(
                    "    {} {}{} (actual {:.2})",
                    "✔".green(),
                    scope,
                    verdict.expr,
                    verdict.actual
                );
            } else {
                println!(
                    "    {} {}{} (actual {:.2})",
                    "✘".red(),
                    scope,
                    verdict.expr,
                    verdict.actual
                );
            }
        }
    }

    println!();
    println!("{}", "=".repeat(60).dimmed());
}
