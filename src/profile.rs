use crate::config::LoadConfig;
use crate::error::ConfigError;
use crate::utils::parse_duration;
use std::time::Duration;

/// One segment of a ramp profile: over `duration`, the desired population
/// moves linearly from the previous stage's target to `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u32,
}

/// Time-varying desired virtual-user population. Pure: `concurrency_at` can
/// be sampled at any rate without affecting the run.
#[derive(Debug, Clone)]
pub enum LoadProfile {
    /// Linear interpolation through a stage list, starting from 0.
    Ramp { stages: Vec<Stage> },
    /// Fixed population, bounded by a wall-clock duration and/or a per-user
    /// iteration cap.
    Flat {
        vus: u32,
        duration: Option<Duration>,
        iterations: Option<u64>,
    },
}

impl LoadProfile {
    pub fn from_config(config: &LoadConfig) -> Result<Self, ConfigError> {
        match (&config.stages, config.vus) {
            (Some(_), Some(_)) => Err(ConfigError::ConflictingLoadProfile),
            (Some(stages), None) => {
                if stages.is_empty() {
                    return Err(ConfigError::MissingLoadProfile);
                }
                let mut compiled = Vec::with_capacity(stages.len());
                for (index, stage) in stages.iter().enumerate() {
                    let duration = parse_duration(&stage.duration)?;
                    if duration.is_zero() {
                        return Err(ConfigError::EmptyStage { index });
                    }
                    compiled.push(Stage {
                        duration,
                        target: stage.target,
                    });
                }
                Ok(LoadProfile::Ramp { stages: compiled })
            }
            (None, Some(vus)) => {
                let duration = config
                    .duration
                    .as_deref()
                    .map(parse_duration)
                    .transpose()?;
                if duration.is_none() && config.iterations.is_none() {
                    return Err(ConfigError::MissingLoadProfile);
                }
                Ok(LoadProfile::Flat {
                    vus,
                    duration,
                    iterations: config.iterations,
                })
            }
            (None, None) => Err(ConfigError::MissingLoadProfile),
        }
    }

    /// Desired population at `elapsed` since run start. Returns 0 once the
    /// profile is exhausted.
    pub fn concurrency_at(&self, elapsed: Duration) -> u32 {
        match self {
            LoadProfile::Ramp { stages } => {
                let mut stage_start = Duration::ZERO;
                let mut previous = 0u32;
                for stage in stages {
                    let stage_end = stage_start + stage.duration;
                    if elapsed < stage_end {
                        let progress = (elapsed - stage_start).as_secs_f64()
                            / stage.duration.as_secs_f64();
                        let from = previous as f64;
                        let to = stage.target as f64;
                        return (from + (to - from) * progress).round() as u32;
                    }
                    stage_start = stage_end;
                    previous = stage.target;
                }
                0
            }
            LoadProfile::Flat { vus, duration, .. } => match duration {
                Some(d) if elapsed >= *d => 0,
                _ => *vus,
            },
        }
    }

    /// Wall-clock bound on the run, if the profile has one. A flat profile
    /// with only an iteration cap runs until every unit finishes.
    pub fn total_duration(&self) -> Option<Duration> {
        match self {
            LoadProfile::Ramp { stages } => {
                Some(stages.iter().map(|s| s.duration).sum())
            }
            LoadProfile::Flat { duration, .. } => *duration,
        }
    }

    /// Per-virtual-user iteration cap, if any.
    pub fn iterations(&self) -> Option<u64> {
        match self {
            LoadProfile::Ramp { .. } => None,
            LoadProfile::Flat { iterations, .. } => *iterations,
        }
    }
}
