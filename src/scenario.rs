use crate::config::{CheckConfig, ScenarioConfig, StepConfig};
use crate::error::ConfigError;
use crate::profile::LoadProfile;
use crate::thresholds::ThresholdRule;
use crate::utils::parse_duration;
use indexmap::IndexMap;
use regex::Regex;
use reqwest::Method;
use std::collections::HashSet;
use std::time::Duration;

/// A validated, runnable scenario. Immutable once compiled and shared
/// read-only (behind an `Arc`) across every virtual user.
#[derive(Debug)]
pub struct Scenario {
    pub name: String,
    pub vars: IndexMap<String, String>,
    pub steps: Vec<Step>,
    pub profile: LoadProfile,
    pub thresholds: Vec<ThresholdRule>,
    pub options: RunOptions,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Pause between scenario iterations.
    pub think_time: Option<Duration>,
    pub http_timeout: Duration,
    pub tick_interval: Duration,
    pub grace_timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            think_time: None,
            http_timeout: Duration::from_secs(30),
            tick_interval: Duration::from_secs(1),
            grace_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Step {
    Request(RequestStep),
    Think(Duration),
}

#[derive(Debug, Clone)]
pub struct RequestStep {
    pub name: String,
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub captures: Vec<Capture>,
    pub checks: Vec<Check>,
    pub fatal: bool,
}

/// Extraction of a response-body field into the virtual user's state.
#[derive(Debug, Clone)]
pub struct Capture {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct Check {
    pub name: String,
    pub status: Option<u16>,
    pub max_latency: Option<Duration>,
    pub jsonpath: Option<String>,
    pub equals: Option<serde_json::Value>,
}

impl Scenario {
    /// Turn a parsed config into a runnable scenario, performing all the
    /// load-time validation: durations parse, methods are real, every
    /// `{{name}}` a step references is bound by `vars` or a capture from an
    /// earlier step, thresholds parse and point at known steps.
    pub fn compile(config: ScenarioConfig) -> Result<Self, ConfigError> {
        if config.steps.is_empty() {
            return Err(ConfigError::EmptyScenario(config.name));
        }

        let vars = config.vars.unwrap_or_default();
        let mut bound: HashSet<String> = vars.keys().cloned().collect();
        let mut steps = Vec::with_capacity(config.steps.len());
        let mut step_names = HashSet::new();

        for step in config.steps {
            match step {
                StepConfig::Think { think } => {
                    steps.push(Step::Think(parse_duration(&think)?));
                }
                StepConfig::Request(raw) => {
                    let method: Method = raw
                        .request
                        .method
                        .parse()
                        .map_err(|_| ConfigError::InvalidMethod(raw.request.method.clone()))?;

                    let headers: Vec<(String, String)> = raw
                        .request
                        .headers
                        .unwrap_or_default()
                        .into_iter()
                        .collect();

                    check_references(&raw.name, &raw.request.url, &bound)?;
                    for (key, value) in &headers {
                        check_references(&raw.name, key, &bound)?;
                        check_references(&raw.name, value, &bound)?;
                    }
                    if let Some(body) = &raw.request.body {
                        check_references(&raw.name, body, &bound)?;
                    }

                    let mut captures = Vec::new();
                    for (name, path) in raw.capture.unwrap_or_default() {
                        if !path.starts_with('$') {
                            return Err(ConfigError::InvalidCapturePath {
                                step: raw.name.clone(),
                                path,
                            });
                        }
                        bound.insert(name.clone());
                        captures.push(Capture { name, path });
                    }

                    let mut checks = Vec::new();
                    for check in raw.checks.unwrap_or_default() {
                        checks.push(compile_check(&raw.name, check)?);
                    }

                    step_names.insert(raw.name.clone());
                    steps.push(Step::Request(RequestStep {
                        name: raw.name,
                        method,
                        url: raw.request.url,
                        headers,
                        body: raw.request.body,
                        captures,
                        checks,
                        fatal: raw.fatal,
                    }));
                }
            }
        }

        let mut thresholds = Vec::with_capacity(config.thresholds.len());
        for threshold in &config.thresholds {
            let rule = ThresholdRule::parse(threshold)?;
            if let Some(step) = &rule.step {
                if !step_names.contains(step) {
                    return Err(ConfigError::UnknownThresholdStep(step.clone()));
                }
            }
            thresholds.push(rule);
        }

        let defaults = RunOptions::default();
        let options = RunOptions {
            think_time: config
                .options
                .think_time
                .as_deref()
                .map(parse_duration)
                .transpose()?,
            http_timeout: config
                .options
                .http_timeout
                .as_deref()
                .map(parse_duration)
                .transpose()?
                .unwrap_or(defaults.http_timeout),
            tick_interval: config
                .options
                .tick_interval
                .as_deref()
                .map(parse_duration)
                .transpose()?
                .unwrap_or(defaults.tick_interval),
            grace_timeout: config
                .options
                .grace_timeout
                .as_deref()
                .map(parse_duration)
                .transpose()?
                .unwrap_or(defaults.grace_timeout),
        };

        Ok(Scenario {
            name: config.name,
            vars,
            steps,
            profile: LoadProfile::from_config(&config.load)?,
            thresholds,
            options,
        })
    }

    pub fn request_step_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, Step::Request(_)))
            .count()
    }
}

/// Every `{{name}}` in `template` must already be bound. `${ENV:default}`
/// placeholders resolve from the environment at run time and are not checked
/// here.
fn check_references(
    step: &str,
    template: &str,
    bound: &HashSet<String>,
) -> Result<(), ConfigError> {
    let placeholder = Regex::new(r"\{\{(\w+)\}\}").unwrap();
    for caps in placeholder.captures_iter(template) {
        let name = &caps[1];
        if !bound.contains(name) {
            return Err(ConfigError::UnboundVariable {
                step: step.to_string(),
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

fn compile_check(step: &str, check: CheckConfig) -> Result<Check, ConfigError> {
    let max_latency = check
        .max_duration
        .as_deref()
        .map(parse_duration)
        .transpose()?;
    if check.status.is_none()
        && max_latency.is_none()
        && check.jsonpath.is_none()
        && check.equals.is_none()
    {
        return Err(ConfigError::EmptyCheck {
            step: step.to_string(),
            check: check.name,
        });
    }
    Ok(Check {
        name: check.name,
        status: check.status,
        max_latency,
        jsonpath: check.jsonpath,
        equals: check.equals,
    })
}
