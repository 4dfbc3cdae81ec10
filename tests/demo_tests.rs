use stampede::profile::LoadProfile;
use stampede::runner::parser::load_scenarios;
use std::path::Path;
use std::time::Duration;

/// The shipped demo scenarios must always load and compile.
#[tokio::test]
async fn demo_scenarios_compile() {
    let demos = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos");
    let files = load_scenarios(&demos).await.unwrap();
    assert_eq!(files.len(), 2);

    for file in files {
        let file_name = file.name.clone();
        let scenario = file
            .compile()
            .unwrap_or_else(|e| panic!("{} failed to compile: {}", file_name, e));
        assert!(scenario.request_step_count() >= 2, "{}", file_name);
        assert!(!scenario.thresholds.is_empty(), "{}", file_name);
    }
}

#[tokio::test]
async fn transactions_demo_ramps_to_one_hundred_users() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/transactions.stampede.yaml");
    let files = load_scenarios(&path).await.unwrap();
    let scenario = files.into_iter().next().unwrap().compile().unwrap();

    assert_eq!(
        scenario.profile.total_duration(),
        Some(Duration::from_secs(120))
    );
    // Halfway through the second stage: linearly between 50 and 100.
    assert_eq!(scenario.profile.concurrency_at(Duration::from_secs(60)), 75);
    // The ramp peaks at 100 users where the final ramp-down begins.
    assert_eq!(
        scenario.profile.concurrency_at(Duration::from_secs(90)),
        100
    );
    assert_eq!(
        scenario.profile.concurrency_at(Duration::from_secs(121)),
        0
    );
    assert!(matches!(scenario.profile, LoadProfile::Ramp { .. }));
}
