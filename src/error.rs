use thiserror::Error;

/// Everything that can be wrong with a scenario file. All of these are
/// caught at compile time, before any virtual user is spawned.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("scenario '{0}' has no steps")]
    EmptyScenario(String),

    #[error("load section needs either 'stages' or 'vus' with a 'duration' or 'iterations'")]
    MissingLoadProfile,

    #[error("load section sets both 'stages' and 'vus'; pick one shape")]
    ConflictingLoadProfile,

    #[error("stage {index} has a zero duration")]
    EmptyStage { index: usize },

    #[error("invalid duration '{0}' (expected e.g. 500ms, 30s, 5m, 1h)")]
    InvalidDuration(String),

    #[error("invalid HTTP method '{0}'")]
    InvalidMethod(String),

    #[error("step '{step}' references '{{{{{name}}}}}' before any var or capture binds it")]
    UnboundVariable { step: String, name: String },

    #[error("step '{step}' capture path '{path}' must start with '$'")]
    InvalidCapturePath { step: String, path: String },

    #[error("invalid threshold expression '{0}' (expected e.g. p(95)<500, rate<0.01)")]
    InvalidThreshold(String),

    #[error("threshold references unknown step '{0}'")]
    UnknownThresholdStep(String),

    #[error("check '{check}' on step '{step}' has no conditions")]
    EmptyCheck { step: String, check: String },
}
