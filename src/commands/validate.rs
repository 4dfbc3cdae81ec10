use crate::runner::parser::load_scenarios;
use anyhow::Result;
use owo_colors::OwoColorize;
use std::path::PathBuf;

/// Parse and compile every scenario under `target` without running anything.
/// Catches the whole load-time error taxonomy: malformed YAML, bad durations,
/// captures used before they exist, unknown threshold steps.
pub async fn handle_validate(target: PathBuf) -> Result<()> {
    let files = load_scenarios(&target).await?;
    let mut failures = 0usize;

    for file in files {
        let file_name = file.name.clone();
        match file.compile() {
            Ok(scenario) => {
                println!(
                    "{} {} ({} steps, {} thresholds)",
                    "✔".green(),
                    file_name,
                    scenario.steps.len(),
                    scenario.thresholds.len()
                );
            }
            Err(e) => {
                failures += 1;
                println!("{} {}: {}", "✘".red(), file_name, e);
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} scenario file(s) failed validation", failures);
    }
    Ok(())
}
