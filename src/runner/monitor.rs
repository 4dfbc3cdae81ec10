use crate::metrics::MetricsAggregator;
use crate::utils::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// Periodic one-line progress during the run: elapsed time, request count,
/// current throughput and error rate. Plain println in CI mode or when
/// stdout is not a terminal.
pub struct ProgressMonitor {
    interval: Duration,
    plain: bool,
}

impl ProgressMonitor {
    pub fn new(interval: Duration, ci: bool) -> Self {
        Self {
            interval,
            plain: ci || !atty::is(atty::Stream::Stdout),
        }
    }

    pub fn spawn(
        self,
        metrics: Arc<Mutex<MetricsAggregator>>,
        total: Option<Duration>,
        mut done: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let bar = if self.plain {
                None
            } else {
                Some(spinner())
            };
            let started = Instant::now();
            let mut ticker = tokio::time::interval(self.interval);
            ticker.tick().await; // the first tick fires immediately

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let (requests, errors) = {
                            let m = metrics.lock().await;
                            (m.total_requests(), m.total_errors())
                        };
                        let elapsed = started.elapsed();
                        let rps = if elapsed.as_secs_f64() > 0.0 {
                            requests as f64 / elapsed.as_secs_f64()
                        } else {
                            0.0
                        };
                        let error_pct = if requests > 0 {
                            errors as f64 / requests as f64 * 100.0
                        } else {
                            0.0
                        };
                        let clock = match total {
                            Some(total) => format!(
                                "{} / {}",
                                format_duration(elapsed),
                                format_duration(total)
                            ),
                            None => format_duration(elapsed),
                        };
                        let line = format!(
                            "{} • {} reqs • {:.1} rps • {:.1}% errors",
                            clock, requests, rps, error_pct
                        );
                        match &bar {
                            Some(bar) => bar.set_message(line),
                            None => println!("{}", line),
                        }
                    }
                    changed = done.changed() => {
                        if changed.is_err() || *done.borrow() {
                            break;
                        }
                    }
                }
            }
            if let Some(bar) = bar {
                bar.finish_and_clear();
            }
        })
    }
}

fn spinner() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&["⠋", "⠙", "⠚", "⠞", "⠖", "⠦", "⠴", "⠲", "⠳", "⠓"])
            .template("{spinner} {wide_msg}")
            .expect("Invalid spinner template"),
    );
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}
