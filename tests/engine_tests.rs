use stampede::config::ScenarioConfig;
use stampede::metrics::MetricsAggregator;
use stampede::runner::{RunStatus, Scheduler};
use stampede::scenario::Scenario;
use stampede::thresholds;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex};

/// Minimal HTTP/1.1 responder: enough for the engine to exercise the login ->
/// capture -> authorized-request flow without a real backend.
async fn spawn_server(latency: Duration) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut tmp = [0u8; 1024];
                let header_end = loop {
                    match socket.read(&mut tmp).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => {
                            buf.extend_from_slice(&tmp[..n]);
                            if let Some(pos) =
                                buf.windows(4).position(|w| w == b"\r\n\r\n")
                            {
                                break pos + 4;
                            }
                        }
                    }
                };
                let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
                let content_length = head
                    .lines()
                    .find_map(|line| {
                        let (key, value) = line.split_once(':')?;
                        key.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                while buf.len() < header_end + content_length {
                    match socket.read(&mut tmp).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buf.extend_from_slice(&tmp[..n]),
                    }
                }

                if !latency.is_zero() {
                    tokio::time::sleep(latency).await;
                }

                let request_line = head.lines().next().unwrap_or_default();
                let authorized = head.lines().any(|line| {
                    line.to_ascii_lowercase().starts_with("authorization:")
                        && line.contains("Bearer T")
                });
                let (status, body) = route(request_line, authorized);
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

fn route(request_line: &str, authorized: bool) -> (&'static str, &'static str) {
    if request_line.starts_with("POST /api/v1/auth/verify-pin") {
        ("200 OK", r#"{"tokens":{"access":"T"}}"#)
    } else if request_line.starts_with("GET /api/v1/user/profile") {
        if authorized {
            ("200 OK", r#"{"message":"ok"}"#)
        } else {
            ("401 Unauthorized", r#"{"error":"unauthorized"}"#)
        }
    } else {
        ("404 Not Found", r#"{"error":"not found"}"#)
    }
}

fn compile(yaml: &str) -> Arc<Scenario> {
    let config: ScenarioConfig = serde_yaml::from_str(yaml).unwrap();
    Arc::new(Scenario::compile(config).unwrap())
}

async fn run_to_end(
    scenario: Arc<Scenario>,
) -> (RunStatus, stampede::metrics::RunSummary, Vec<stampede::thresholds::ThresholdVerdict>) {
    let metrics = Arc::new(Mutex::new(MetricsAggregator::new()));
    let scheduler = Scheduler::new(Arc::clone(&scenario), Arc::clone(&metrics)).unwrap();
    let (_abort_tx, abort_rx) = watch::channel(false);

    let started = Instant::now();
    let status = scheduler.run(abort_rx).await.unwrap();
    let wall = started.elapsed();

    let metrics = metrics.lock().await;
    let verdicts = thresholds::evaluate_all(&scenario.thresholds, &metrics);
    (status, metrics.summary(wall), verdicts)
}

#[tokio::test]
async fn ten_users_five_iterations_capture_flows_into_auth_header() {
    let addr = spawn_server(Duration::ZERO).await;
    let scenario = compile(&format!(
        r#"
name: login and profile
vars:
  base_url: "http://{}"
load:
  vus: 10
  iterations: 5
steps:
  - name: login
    request:
      method: POST
      url: "{{{{base_url}}}}/api/v1/auth/verify-pin"
      headers:
        Content-Type: application/json
      body: '{{"user_id":"u1","pin":"123456"}}'
    capture:
      auth_token: "$.tokens.access"
    checks:
      - name: login successful
        status: 200
  - name: profile
    request:
      method: GET
      url: "{{{{base_url}}}}/api/v1/user/profile"
      headers:
        Authorization: "Bearer {{{{auth_token}}}}"
    checks:
      - name: profile status is 200
        status: 200
thresholds:
  - expr: rate<=0
options:
  tick_interval: 50ms
  grace_timeout: 5s
  http_timeout: 5s
"#,
        addr
    ));

    let (status, summary, verdicts) = run_to_end(scenario).await;

    assert_eq!(status, RunStatus::Completed);
    // 10 units x 5 iterations, each iteration runs both steps once.
    assert_eq!(summary.steps["login"].count, 50);
    assert_eq!(summary.steps["profile"].count, 50);
    assert_eq!(summary.total_requests, 100);
    assert_eq!(summary.total_errors, 0, "captured token must authorize the profile step");

    for step in summary.steps.values() {
        for check in &step.checks {
            assert_eq!(check.failed, 0, "check '{}' failed", check.name);
        }
    }
    assert!(verdicts.iter().all(|v| v.passed));
}

#[tokio::test]
async fn slow_endpoint_breaches_p95_threshold() {
    let addr = spawn_server(Duration::from_millis(600)).await;
    let scenario = compile(&format!(
        r#"
name: slow login
vars:
  base_url: "http://{}"
load:
  vus: 2
  iterations: 2
steps:
  - name: login
    request:
      method: POST
      url: "{{{{base_url}}}}/api/v1/auth/verify-pin"
thresholds:
  - step: login
    expr: p(95)<500
options:
  tick_interval: 50ms
  http_timeout: 5s
"#,
        addr
    ));

    let (status, summary, verdicts) = run_to_end(scenario).await;

    assert_eq!(status, RunStatus::Completed);
    assert_eq!(summary.steps["login"].count, 4);
    assert_eq!(verdicts.len(), 1);
    assert!(!verdicts[0].passed);
    assert!(verdicts[0].actual >= 500.0);
}

#[tokio::test]
async fn abort_stops_all_units_promptly() {
    let addr = spawn_server(Duration::from_millis(300)).await;
    let scenario = compile(&format!(
        r#"
name: long run
vars:
  base_url: "http://{}"
load:
  vus: 2
  duration: 30s
steps:
  - name: login
    request:
      method: POST
      url: "{{{{base_url}}}}/api/v1/auth/verify-pin"
options:
  tick_interval: 50ms
  http_timeout: 5s
"#,
        addr
    ));

    let metrics = Arc::new(Mutex::new(MetricsAggregator::new()));
    let scheduler = Scheduler::new(Arc::clone(&scenario), Arc::clone(&metrics)).unwrap();
    let (abort_tx, abort_rx) = watch::channel(false);

    let started = Instant::now();
    let run = tokio::spawn(async move { scheduler.run(abort_rx).await });

    tokio::time::sleep(Duration::from_millis(500)).await;
    abort_tx.send(true).unwrap();

    let status = run.await.unwrap().unwrap();
    assert_eq!(status, RunStatus::Aborted);
    assert!(
        started.elapsed() < Duration::from_secs(10),
        "abort must not wait for the 30s profile to elapse"
    );
}

#[tokio::test]
async fn failed_steps_are_recorded_not_raised() {
    let addr = spawn_server(Duration::ZERO).await;
    let scenario = compile(&format!(
        r#"
name: unauthorized profile
vars:
  base_url: "http://{}"
load:
  vus: 1
  iterations: 3
steps:
  - name: profile
    request:
      method: GET
      url: "{{{{base_url}}}}/api/v1/user/profile"
    checks:
      - name: profile status is 200
        status: 200
options:
  tick_interval: 50ms
  http_timeout: 5s
"#,
        addr
    ));

    let (status, summary, _) = run_to_end(scenario).await;

    // No token was captured, so every request 401s; the run still completes.
    assert_eq!(status, RunStatus::Completed);
    let step = &summary.steps["profile"];
    assert_eq!(step.count, 3);
    assert_eq!(step.errors, 3);
    assert_eq!(step.status_codes.get(&401), Some(&3));
    assert_eq!(step.checks[0].failed, 3);
}
