use crate::config::ScenarioConfig;
use crate::error::ConfigError;
use crate::scenario::Scenario;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use walkdir::WalkDir;

/// A scenario file on disk, parsed but not yet compiled. Compilation is a
/// separate step so the CLI can override the load shape first.
#[derive(Debug)]
pub struct ScenarioFile {
    pub name: String,
    pub config: ScenarioConfig,
}

impl ScenarioFile {
    pub fn compile(self) -> Result<Scenario, ConfigError> {
        Scenario::compile(self.config)
    }
}

/// Scenario files end in `.stampede.yaml` or `.stampede.yml`; anything else
/// in a scanned directory is ignored.
fn is_scenario_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.ends_with(".stampede.yaml") || name.ends_with(".stampede.yml"))
        .unwrap_or(false)
}

/// Load one scenario file, or scan a directory for scenario files, sorted by
/// path for a stable pick order.
pub async fn load_scenarios(path: &Path) -> Result<Vec<ScenarioFile>> {
    if path.is_file() {
        return Ok(vec![read_scenario(path).await?]);
    }
    if !path.is_dir() {
        anyhow::bail!("Path does not exist: {}", path.display());
    }

    let mut paths: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_scenario_file(path))
        .collect();
    paths.sort();

    if paths.is_empty() {
        anyhow::bail!(
            "No .stampede.yaml files found in directory: {}",
            path.display()
        );
    }

    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        files.push(read_scenario(path).await?);
    }
    Ok(files)
}

async fn read_scenario(path: &Path) -> Result<ScenarioFile> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read file: {}", path.display()))?;

    let config: ScenarioConfig = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse YAML in file: {}", path.display()))?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    Ok(ScenarioFile { name, config })
}
