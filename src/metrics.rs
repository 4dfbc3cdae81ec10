use hdrhistogram::Histogram;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// One observed step execution, emitted by a virtual user and folded into the
/// aggregator immediately. Raw samples are never retained.
#[derive(Debug, Clone)]
pub struct MetricSample {
    pub latency: Duration,
    pub status: Option<u16>,
    pub failed: bool,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// Per-step accumulation: counters plus an HDR histogram of latencies.
///
/// The histogram keeps 3 significant figures, so reported percentiles are
/// approximate within 0.1% of the true value for a given sample set, and
/// deterministic for that set. Merging two stats objects is associative.
#[derive(Debug, Clone)]
pub struct StepStats {
    histogram: Histogram<u64>,
    pub count: u64,
    pub errors: u64,
    pub status_codes: BTreeMap<u16, u64>,
    pub checks: IndexMap<String, CheckCounts>,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CheckCounts {
    pub passed: u64,
    pub failed: u64,
}

impl StepStats {
    pub(crate) fn new() -> Self {
        Self {
            // Auto-resizing, 3 significant figures. Values are milliseconds.
            histogram: Histogram::new(3).expect("3 is a valid precision"),
            count: 0,
            errors: 0,
            status_codes: BTreeMap::new(),
            checks: IndexMap::new(),
            bytes_sent: 0,
            bytes_received: 0,
        }
    }

    fn record(&mut self, sample: &MetricSample) {
        self.histogram
            .saturating_record(sample.latency.as_millis().max(1) as u64);
        self.count += 1;
        self.bytes_sent += sample.bytes_sent;
        self.bytes_received += sample.bytes_received;
        if let Some(status) = sample.status {
            *self.status_codes.entry(status).or_insert(0) += 1;
        }
        if sample.failed {
            self.errors += 1;
        }
    }

    fn record_check(&mut self, name: &str, passed: bool) {
        let counts = self.checks.entry(name.to_string()).or_default();
        if passed {
            counts.passed += 1;
        } else {
            counts.failed += 1;
        }
    }

    fn merge(&mut self, other: &StepStats) {
        self.histogram
            .add(&other.histogram)
            .expect("auto-resizing histograms always merge");
        self.count += other.count;
        self.errors += other.errors;
        self.bytes_sent += other.bytes_sent;
        self.bytes_received += other.bytes_received;
        for (status, n) in &other.status_codes {
            *self.status_codes.entry(*status).or_insert(0) += n;
        }
        for (name, counts) in &other.checks {
            let entry = self.checks.entry(name.clone()).or_default();
            entry.passed += counts.passed;
            entry.failed += counts.failed;
        }
    }

    fn latency_summary(&self) -> LatencySummary {
        LatencySummary {
            mean_ms: self.histogram.mean(),
            min_ms: self.histogram.min(),
            max_ms: self.histogram.max(),
            p50_ms: self.histogram.value_at_quantile(0.50),
            p95_ms: self.histogram.value_at_quantile(0.95),
            p99_ms: self.histogram.value_at_quantile(0.99),
        }
    }

    /// Percentile in milliseconds for an arbitrary quantile in [0, 1].
    pub fn percentile_ms(&self, quantile: f64) -> u64 {
        self.histogram.value_at_quantile(quantile)
    }

    pub fn mean_ms(&self) -> f64 {
        self.histogram.mean()
    }

    pub fn error_rate(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.errors as f64 / self.count as f64
        }
    }
}

/// The single structure all virtual users write into (behind one async
/// mutex). Also usable unit-owned-then-merged since `merge` is associative.
#[derive(Debug, Clone)]
pub struct MetricsAggregator {
    steps: IndexMap<String, StepStats>,
    total_requests: u64,
    total_errors: u64,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self {
            steps: IndexMap::new(),
            total_requests: 0,
            total_errors: 0,
        }
    }

    pub fn record(&mut self, step: &str, sample: &MetricSample) {
        self.total_requests += 1;
        if sample.failed {
            self.total_errors += 1;
        }
        self.steps
            .entry(step.to_string())
            .or_insert_with(StepStats::new)
            .record(sample);
    }

    pub fn record_check(&mut self, step: &str, name: &str, passed: bool) {
        self.steps
            .entry(step.to_string())
            .or_insert_with(StepStats::new)
            .record_check(name, passed);
    }

    pub fn merge(&mut self, other: &MetricsAggregator) {
        self.total_requests += other.total_requests;
        self.total_errors += other.total_errors;
        for (name, stats) in &other.steps {
            self.steps
                .entry(name.clone())
                .or_insert_with(StepStats::new)
                .merge(stats);
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests
    }

    pub fn total_errors(&self) -> u64 {
        self.total_errors
    }

    pub fn step(&self, name: &str) -> Option<&StepStats> {
        self.steps.get(name)
    }

    pub fn steps(&self) -> impl Iterator<Item = (&String, &StepStats)> {
        self.steps.iter()
    }

    /// Run-wide stats with every step's histogram merged together, used for
    /// thresholds without a step scope.
    pub fn combined(&self) -> StepStats {
        let mut all = StepStats::new();
        for stats in self.steps.values() {
            all.merge(stats);
        }
        all
    }

    /// Freeze everything into the serializable end-of-run summary.
    pub fn summary(&self, wall: Duration) -> RunSummary {
        let steps = self
            .steps
            .iter()
            .map(|(name, stats)| {
                (
                    name.clone(),
                    StepSummary {
                        count: stats.count,
                        errors: stats.errors,
                        error_rate: stats.error_rate(),
                        latency: stats.latency_summary(),
                        status_codes: stats.status_codes.clone(),
                        checks: stats
                            .checks
                            .iter()
                            .map(|(check, counts)| CheckSummary {
                                name: check.clone(),
                                passed: counts.passed,
                                failed: counts.failed,
                            })
                            .collect(),
                        bytes_sent: stats.bytes_sent,
                        bytes_received: stats.bytes_received,
                    },
                )
            })
            .collect();

        let combined = self.combined();
        RunSummary {
            total_requests: self.total_requests,
            total_errors: self.total_errors,
            error_rate: if self.total_requests == 0 {
                0.0
            } else {
                self.total_errors as f64 / self.total_requests as f64
            },
            requests_per_second: if wall.is_zero() {
                0.0
            } else {
                self.total_requests as f64 / wall.as_secs_f64()
            },
            latency: combined.latency_summary(),
            steps,
            wall_ms: wall.as_millis() as u64,
        }
    }
}

/// Latency figures in milliseconds, straight out of the histogram.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencySummary {
    pub mean_ms: f64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSummary {
    pub count: u64,
    pub errors: u64,
    pub error_rate: f64,
    pub latency: LatencySummary,
    pub status_codes: BTreeMap<u16, u64>,
    pub checks: Vec<CheckSummary>,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckSummary {
    pub name: String,
    pub passed: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_requests: u64,
    pub total_errors: u64,
    pub error_rate: f64,
    pub requests_per_second: f64,
    pub latency: LatencySummary,
    pub steps: IndexMap<String, StepSummary>,
    pub wall_ms: u64,
}
