use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Raw scenario file as written by the user. Everything here is plain data;
/// durations are human strings and nothing is validated yet. Compilation into
/// the runnable form (with all load-time validation) happens in
/// [`crate::scenario::Scenario::compile`].
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ScenarioConfig {
    pub name: String,
    pub description: Option<String>,
    pub vars: Option<IndexMap<String, String>>,
    pub load: LoadConfig,
    pub steps: Vec<StepConfig>,
    #[serde(default)]
    pub thresholds: Vec<ThresholdConfig>,
    #[serde(default)]
    pub options: OptionsConfig,
}

/// Load shape: either a list of ramp stages or a flat `vus` population with a
/// duration and/or a per-user iteration cap.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct LoadConfig {
    pub stages: Option<Vec<StageConfig>>,
    pub vus: Option<u32>,
    pub duration: Option<String>,
    pub iterations: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StageConfig {
    pub duration: String,
    pub target: u32,
}

/// A scenario step is either an HTTP request or a think-time pause.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum StepConfig {
    Think { think: String },
    Request(RequestStepConfig),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RequestStepConfig {
    pub name: String,
    pub request: RequestConfig,
    /// Captured values: name -> JSON path into the response body.
    pub capture: Option<IndexMap<String, String>>,
    pub checks: Option<Vec<CheckConfig>>,
    /// When true, a failed outcome ends the current iteration early.
    #[serde(default)]
    pub fatal: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RequestConfig {
    pub method: String,
    pub url: String,
    pub headers: Option<IndexMap<String, String>>,
    pub body: Option<String>,
}

/// One named assertion over a step outcome. Any combination of the condition
/// fields may be set; at least one is required.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CheckConfig {
    pub name: String,
    pub status: Option<u16>,
    pub max_duration: Option<String>,
    pub jsonpath: Option<String>,
    pub equals: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ThresholdConfig {
    /// Scope the rule to one step; absent means the whole run.
    pub step: Option<String>,
    pub expr: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct OptionsConfig {
    /// Pause between scenario iterations.
    pub think_time: Option<String>,
    pub http_timeout: Option<String>,
    /// How often the scheduler re-samples the load profile.
    pub tick_interval: Option<String>,
    /// How long to wait for in-flight iterations to drain at the end.
    pub grace_timeout: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
name: user journey
vars:
  base_url: http://localhost:8080
load:
  stages:
    - duration: 30s
      target: 50
    - duration: 1m
      target: 100
    - duration: 30s
      target: 0
steps:
  - name: login
    request:
      method: POST
      url: "{{base_url}}/api/v1/auth/verify-pin"
      headers:
        Content-Type: application/json
      body: '{"user_id":"u1","pin":"123456"}'
    capture:
      auth_token: "$.tokens.access"
    checks:
      - name: login successful
        status: 200
    fatal: true
  - think: 1s
  - name: list transactions
    request:
      method: GET
      url: "{{base_url}}/transactions?page=1"
      headers:
        Authorization: "Bearer {{auth_token}}"
    checks:
      - name: status is 200
        status: 200
      - name: response under 500ms
        max_duration: 500ms
thresholds:
  - step: list transactions
    expr: p(95)<500
  - expr: rate<0.01
"#;

    #[test]
    fn parses_full_scenario() {
        let config: ScenarioConfig = serde_yaml::from_str(SAMPLE).unwrap();
        assert_eq!(config.name, "user journey");
        assert_eq!(config.steps.len(), 3);
        assert_eq!(config.thresholds.len(), 2);
        assert_eq!(config.load.stages.as_ref().unwrap().len(), 3);
    }

    #[test]
    fn step_variants_are_untagged() {
        let config: ScenarioConfig = serde_yaml::from_str(SAMPLE).unwrap();
        assert!(matches!(config.steps[0], StepConfig::Request(_)));
        match &config.steps[1] {
            StepConfig::Think { think } => assert_eq!(think, "1s"),
            other => panic!("expected think step, got {:?}", other),
        }
    }

    #[test]
    fn request_step_carries_captures_and_checks() {
        let config: ScenarioConfig = serde_yaml::from_str(SAMPLE).unwrap();
        let StepConfig::Request(step) = &config.steps[0] else {
            panic!("expected request step");
        };
        assert!(step.fatal);
        assert_eq!(
            step.capture.as_ref().unwrap().get("auth_token").unwrap(),
            "$.tokens.access"
        );
        assert_eq!(step.checks.as_ref().unwrap()[0].status, Some(200));
    }

    #[test]
    fn flat_load_profile_parses() {
        let yaml = r#"
name: flat
load:
  vus: 10
  duration: 30s
steps:
  - name: ping
    request:
      method: GET
      url: http://localhost:8080/ping
"#;
        let config: ScenarioConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.load.vus, Some(10));
        assert!(config.load.stages.is_none());
        assert!(config.thresholds.is_empty());
    }

    #[test]
    fn round_trips_through_yaml() {
        let config: ScenarioConfig = serde_yaml::from_str(SAMPLE).unwrap();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let back: ScenarioConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.name, config.name);
        assert_eq!(back.steps.len(), config.steps.len());
    }
}
