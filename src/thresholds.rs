use crate::config::ThresholdConfig;
use crate::error::ConfigError;
use crate::metrics::MetricsAggregator;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Which aggregated figure a threshold constrains. Latency selectors are in
/// milliseconds; `rate` is the failed-request fraction in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricSelector {
    Percentile(f64),
    Avg,
    Min,
    Max,
    Rate,
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparator {
    fn holds(self, actual: f64, bound: f64) -> bool {
        match self {
            Comparator::Lt => actual < bound,
            Comparator::Le => actual <= bound,
            Comparator::Gt => actual > bound,
            Comparator::Ge => actual >= bound,
        }
    }
}

/// A compiled pass/fail rule, evaluated once against the aggregated metrics
/// at the end of the run.
#[derive(Debug, Clone)]
pub struct ThresholdRule {
    /// Scope to one step's series; `None` means the merged run-wide series.
    pub step: Option<String>,
    pub selector: MetricSelector,
    pub comparator: Comparator,
    pub bound: f64,
    /// The expression as written, kept for reporting.
    pub expr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdVerdict {
    pub step: Option<String>,
    pub expr: String,
    pub actual: f64,
    pub passed: bool,
}

impl ThresholdRule {
    /// Parse an expression like `p(95)<500`, `avg<=200`, `rate<0.01`,
    /// `count>=100`.
    pub fn parse(config: &ThresholdConfig) -> Result<Self, ConfigError> {
        let pattern = Regex::new(
            r"^\s*(?:p\((\d{1,3}(?:\.\d+)?)\)|(avg|min|max|rate|count))\s*(<=|>=|<|>)\s*(\d+(?:\.\d+)?)\s*$",
        )
        .unwrap();

        let invalid = || ConfigError::InvalidThreshold(config.expr.clone());
        let caps = pattern.captures(&config.expr).ok_or_else(invalid)?;

        let selector = if let Some(pct) = caps.get(1) {
            let pct: f64 = pct.as_str().parse().map_err(|_| invalid())?;
            if pct > 100.0 {
                return Err(invalid());
            }
            MetricSelector::Percentile(pct / 100.0)
        } else {
            match caps.get(2).map(|m| m.as_str()) {
                Some("avg") => MetricSelector::Avg,
                Some("min") => MetricSelector::Min,
                Some("max") => MetricSelector::Max,
                Some("rate") => MetricSelector::Rate,
                Some("count") => MetricSelector::Count,
                _ => return Err(invalid()),
            }
        };

        let comparator = match &caps[3] {
            "<" => Comparator::Lt,
            "<=" => Comparator::Le,
            ">" => Comparator::Gt,
            ">=" => Comparator::Ge,
            _ => return Err(invalid()),
        };

        let bound: f64 = caps[4].parse().map_err(|_| invalid())?;

        Ok(ThresholdRule {
            step: config.step.clone(),
            selector,
            comparator,
            bound,
            expr: config.expr.trim().to_string(),
        })
    }

    pub fn evaluate(&self, metrics: &MetricsAggregator) -> ThresholdVerdict {
        let stats = match &self.step {
            Some(step) => metrics
                .step(step)
                .cloned()
                .unwrap_or_else(crate::metrics::StepStats::new),
            None => metrics.combined(),
        };

        let actual = match self.selector {
            MetricSelector::Percentile(q) => stats.percentile_ms(q) as f64,
            MetricSelector::Avg => stats.mean_ms(),
            MetricSelector::Min => stats.percentile_ms(0.0) as f64,
            MetricSelector::Max => stats.percentile_ms(1.0) as f64,
            MetricSelector::Rate => stats.error_rate(),
            MetricSelector::Count => stats.count as f64,
        };

        ThresholdVerdict {
            step: self.step.clone(),
            expr: self.expr.clone(),
            actual,
            passed: self.comparator.holds(actual, self.bound),
        }
    }
}

/// Evaluate every rule; order follows declaration order in the scenario.
pub fn evaluate_all(rules: &[ThresholdRule], metrics: &MetricsAggregator) -> Vec<ThresholdVerdict> {
    rules.iter().map(|rule| rule.evaluate(metrics)).collect()
}
