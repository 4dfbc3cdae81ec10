use crate::metrics::MetricsAggregator;
use crate::runner::checks;
use crate::runner::executor::{Outcome, StepExecutor};
use crate::runner::json;
use crate::runner::vu::VuState;
use crate::scenario::{RequestStep, Scenario, Step};
use anyhow::Result;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

/// How a run ended. Aborted means the operator cancelled it; its metrics are
/// partial and threshold verdicts are not meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Aborted,
}

/// Global run phase broadcast to every virtual user. Draining lets units
/// finish their current iteration; Aborted abandons in-flight work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    Draining,
    Aborted,
}

struct VuHandle {
    retire_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

/// Owns the virtual-user population. A tick loop samples
/// `LoadProfile::concurrency_at` and spawns or retires units so the live
/// population converges on the target; each unit runs scenario iterations
/// back to back against its own exclusively-owned state.
pub struct Scheduler {
    scenario: Arc<Scenario>,
    executor: StepExecutor,
    metrics: Arc<Mutex<MetricsAggregator>>,
}

impl Scheduler {
    pub fn new(
        scenario: Arc<Scenario>,
        metrics: Arc<Mutex<MetricsAggregator>>,
    ) -> Result<Self> {
        let executor = StepExecutor::new(scenario.options.http_timeout)?;
        Ok(Self {
            scenario,
            executor,
            metrics,
        })
    }

    /// Drive the population until the profile is exhausted (graceful drain)
    /// or `abort` fires (hard stop). Returns how the run ended.
    pub async fn run(&self, abort: watch::Receiver<bool>) -> Result<RunStatus> {
        let (phase_tx, phase_rx) = watch::channel(Phase::Running);
        let profile = &self.scenario.profile;
        let time_limit = profile.total_duration();
        let iterations = profile.iterations();
        let started = Instant::now();

        let mut units: Vec<VuHandle> = Vec::new();
        let mut retired: Vec<JoinHandle<()>> = Vec::new();
        let mut spawned_total = 0usize;
        let mut spawned_any = false;
        let mut aborted = false;

        let mut ticker = tokio::time::interval(self.scenario.options.tick_interval);
        let abort_fired = wait_for_signal(abort);
        tokio::pin!(abort_fired);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let elapsed = started.elapsed();
                    if let Some(limit) = time_limit {
                        if elapsed >= limit {
                            break;
                        }
                    }

                    let target = profile.concurrency_at(elapsed) as usize;
                    units.retain(|unit| !unit.join.is_finished());
                    while units.len() < target {
                        // Under an iteration cap each population slot is
                        // filled exactly once; finished units are not
                        // replaced.
                        if iterations.is_some() && spawned_total >= target {
                            break;
                        }
                        units.push(self.spawn_unit(phase_rx.clone(), iterations));
                        spawned_total += 1;
                        spawned_any = true;
                    }
                    while units.len() > target {
                        // Retire, never kill: the unit finishes its current
                        // iteration and stops before starting another.
                        if let Some(unit) = units.pop() {
                            let _ = unit.retire_tx.send(true);
                            retired.push(unit.join);
                        }
                    }

                    // Iteration-capped profiles end when every unit has
                    // finished its share, even before any time limit.
                    if iterations.is_some() && units.is_empty() && (spawned_any || target == 0) {
                        break;
                    }
                }
                _ = &mut abort_fired => {
                    aborted = true;
                    break;
                }
            }
        }

        let mut joins: Vec<JoinHandle<()>> = units
            .into_iter()
            .map(|unit| unit.join)
            .chain(retired)
            .collect();

        if aborted {
            let _ = phase_tx.send(Phase::Aborted);
            // Units observe the abort between awaits; anything still running
            // after a short window is torn down.
            if timeout(Duration::from_secs(2), join_all(joins.iter_mut()))
                .await
                .is_err()
            {
                for join in &joins {
                    join.abort();
                }
            }
            Ok(RunStatus::Aborted)
        } else {
            let _ = phase_tx.send(Phase::Draining);
            let grace = self.scenario.options.grace_timeout;
            if timeout(grace, join_all(joins.iter_mut())).await.is_err() {
                for join in &joins {
                    join.abort();
                }
            }
            Ok(RunStatus::Completed)
        }
    }

    fn spawn_unit(&self, phase: watch::Receiver<Phase>, iterations: Option<u64>) -> VuHandle {
        let (retire_tx, retire_rx) = watch::channel(false);
        let scenario = Arc::clone(&self.scenario);
        let executor = self.executor.clone();
        let metrics = Arc::clone(&self.metrics);
        let join = tokio::spawn(async move {
            unit_loop(scenario, executor, metrics, phase, retire_rx, iterations).await;
        });
        VuHandle { retire_tx, join }
    }
}

/// Resolves once the watch flips to true; pends forever if the sender is
/// dropped without firing.
async fn wait_for_signal(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Resolves only when the run is hard-aborted.
async fn phase_aborted(rx: &mut watch::Receiver<Phase>) {
    loop {
        if *rx.borrow() == Phase::Aborted {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Pause that yields early on abort. Returns false if the abort interrupted.
async fn sleep_unless_aborted(pause: Duration, phase: &mut watch::Receiver<Phase>) -> bool {
    tokio::select! {
        _ = sleep(pause) => true,
        _ = phase_aborted(phase) => false,
    }
}

#[derive(Debug, PartialEq, Eq)]
enum IterationEnd {
    Finished,
    Aborted,
}

/// One virtual user: a strictly sequential loop of scenario iterations. The
/// stop conditions are checked at the top of the loop (retire, drain,
/// iteration cap) and the abort signal additionally between and during steps.
async fn unit_loop(
    scenario: Arc<Scenario>,
    executor: StepExecutor,
    metrics: Arc<Mutex<MetricsAggregator>>,
    mut phase: watch::Receiver<Phase>,
    retire: watch::Receiver<bool>,
    iterations: Option<u64>,
) {
    let mut state = VuState::new(&scenario.vars);
    let mut completed = 0u64;

    loop {
        if *retire.borrow() || *phase.borrow() != Phase::Running {
            break;
        }
        if let Some(limit) = iterations {
            if completed >= limit {
                break;
            }
        }

        if run_iteration(&scenario, &executor, &metrics, &mut state, &mut phase).await
            == IterationEnd::Aborted
        {
            break;
        }
        completed += 1;
        state.reset();

        // A unit that will stop anyway must not sit out the pause first;
        // draining would otherwise wait a full think_time per finished unit.
        let stopping = *retire.borrow()
            || *phase.borrow() != Phase::Running
            || iterations.is_some_and(|limit| completed >= limit);
        if stopping {
            break;
        }

        if let Some(pause) = scenario.options.think_time {
            if !sleep_unless_aborted(pause, &mut phase).await {
                break;
            }
        }
    }
}

async fn run_iteration(
    scenario: &Scenario,
    executor: &StepExecutor,
    metrics: &Mutex<MetricsAggregator>,
    state: &mut VuState,
    phase: &mut watch::Receiver<Phase>,
) -> IterationEnd {
    for step in &scenario.steps {
        if *phase.borrow() == Phase::Aborted {
            return IterationEnd::Aborted;
        }
        match step {
            Step::Think(pause) => {
                if !sleep_unless_aborted(*pause, phase).await {
                    return IterationEnd::Aborted;
                }
            }
            Step::Request(step) => {
                let outcome = tokio::select! {
                    outcome = executor.execute(step, &*state) => outcome,
                    _ = phase_aborted(phase) => return IterationEnd::Aborted,
                };

                let results = checks::evaluate(&step.checks, &outcome, state);
                {
                    let mut metrics = metrics.lock().await;
                    metrics.record(&step.name, &outcome.sample());
                    for result in &results {
                        metrics.record_check(&step.name, &result.name, result.passed);
                    }
                }

                apply_captures(step, &outcome, state);

                if step.fatal && outcome.failed() {
                    // Ends this iteration only; the unit starts a fresh one.
                    return IterationEnd::Finished;
                }
            }
        }
    }
    IterationEnd::Finished
}

fn apply_captures(step: &RequestStep, outcome: &Outcome, state: &mut VuState) {
    if step.captures.is_empty() {
        return;
    }
    let Some(body) = outcome.body.as_deref() else {
        return;
    };
    let Ok(doc) = serde_json::from_str::<serde_json::Value>(body) else {
        return;
    };
    for capture in &step.captures {
        if let Some(value) = json::lookup(&doc, &capture.path) {
            state.set_capture(&capture.name, json::value_to_string(value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::Capture;

    fn request_step(captures: Vec<Capture>) -> RequestStep {
        RequestStep {
            name: "login".into(),
            method: reqwest::Method::POST,
            url: "http://localhost/auth".into(),
            headers: vec![],
            body: None,
            captures,
            checks: vec![],
            fatal: false,
        }
    }

    fn token_outcome(body: &str) -> Outcome {
        Outcome {
            status: Some(200),
            latency: Duration::from_millis(10),
            body: Some(body.to_string()),
            error: None,
            bytes_sent: 0,
            bytes_received: body.len() as u64,
        }
    }

    #[test]
    fn captures_flow_into_vu_state() {
        let step = request_step(vec![Capture {
            name: "auth_token".into(),
            path: "$.tokens.access".into(),
        }]);
        let mut state = VuState::new(&Default::default());
        apply_captures(
            &step,
            &token_outcome(r#"{"tokens":{"access":"T"}}"#),
            &mut state,
        );
        assert_eq!(state.get("auth_token"), Some("T"));
    }

    #[test]
    fn missing_capture_paths_leave_state_untouched() {
        let step = request_step(vec![Capture {
            name: "auth_token".into(),
            path: "$.tokens.access".into(),
        }]);
        let mut state = VuState::new(&Default::default());
        apply_captures(&step, &token_outcome("not json"), &mut state);
        assert_eq!(state.get("auth_token"), None);
    }

    #[tokio::test]
    async fn sleep_is_interrupted_by_abort() {
        let (tx, mut rx) = watch::channel(Phase::Running);
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            let _ = tx.send(Phase::Aborted);
        });
        let started = Instant::now();
        let finished = sleep_unless_aborted(Duration::from_secs(30), &mut rx).await;
        assert!(!finished);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn drain_phase_does_not_interrupt_a_pause() {
        let (tx, mut rx) = watch::channel(Phase::Running);
        let _ = tx.send(Phase::Draining);
        let finished = sleep_unless_aborted(Duration::from_millis(10), &mut rx).await;
        assert!(finished, "draining lets the current iteration complete");
    }

    fn think_only_scenario(think_time: &str) -> Arc<Scenario> {
        let yaml = format!(
            r#"
name: think only
load:
  vus: 1
  duration: 30s
steps:
  - think: 100ms
options:
  think_time: {}
"#,
            think_time
        );
        let config: crate::config::ScenarioConfig = serde_yaml::from_str(&yaml).unwrap();
        Arc::new(Scenario::compile(config).unwrap())
    }

    #[tokio::test]
    async fn draining_unit_stops_without_sitting_out_the_pause() {
        let scenario = think_only_scenario("30s");
        let executor = StepExecutor::new(Duration::from_secs(1)).unwrap();
        let metrics = Arc::new(Mutex::new(MetricsAggregator::new()));
        let (phase_tx, phase_rx) = watch::channel(Phase::Running);
        let (_retire_tx, retire_rx) = watch::channel(false);

        let unit = tokio::spawn(unit_loop(
            scenario, executor, metrics, phase_rx, retire_rx, None,
        ));

        // Drain lands mid-iteration; the unit must finish the 100ms think
        // step and exit instead of entering the 30s inter-iteration pause.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let _ = phase_tx.send(Phase::Draining);

        tokio::time::timeout(Duration::from_secs(5), unit)
            .await
            .expect("unit kept running into the inter-iteration pause")
            .unwrap();
    }

    #[tokio::test]
    async fn capped_unit_stops_right_after_its_last_iteration() {
        let scenario = think_only_scenario("30s");
        let executor = StepExecutor::new(Duration::from_secs(1)).unwrap();
        let metrics = Arc::new(Mutex::new(MetricsAggregator::new()));
        let (_phase_tx, phase_rx) = watch::channel(Phase::Running);
        let (_retire_tx, retire_rx) = watch::channel(false);

        let unit = tokio::spawn(unit_loop(
            scenario,
            executor,
            metrics,
            phase_rx,
            retire_rx,
            Some(1),
        ));

        tokio::time::timeout(Duration::from_secs(5), unit)
            .await
            .expect("unit paused after its final iteration")
            .unwrap();
    }
}
