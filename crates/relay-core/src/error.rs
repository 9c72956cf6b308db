//! Error types for Relay CI.

use thiserror::Error;

/// Configuration problems detected while loading pipeline definitions.
///
/// All of these are fatal at load time: no job runs when any is present.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Pipeline '{0}' has no jobs")]
    EmptyPipeline(String),

    #[error("Duplicate pipeline name: {0}")]
    DuplicatePipeline(String),

    #[error("Duplicate job id '{job}' in pipeline '{pipeline}'")]
    DuplicateJob { pipeline: String, job: String },

    #[error("Duplicate step id '{step}' in job '{job}'")]
    DuplicateStep { job: String, step: String },

    #[error("Job '{job}' needs unknown job '{dependency}'")]
    UnknownDependency { job: String, dependency: String },

    #[error("Pipeline '{pipeline}' requires unknown pipeline '{required}'")]
    UnknownPipeline { pipeline: String, required: String },

    #[error("Cycle detected in {scope}: {}", cycle.join(" -> "))]
    CycleDetected { scope: String, cycle: Vec<String> },

    #[error("Invalid condition on {location}: {reason}")]
    InvalidCondition { location: String, reason: String },

    #[error("Step '{step}' of job '{job}' uses credential '{credential}' without listing it")]
    UnlistedCredential {
        job: String,
        step: String,
        credential: String,
    },

    #[error("Invalid pipeline definition: {0}")]
    InvalidDefinition(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Pipeline not found: {0}")]
    PipelineNotFound(String),

    // Credential errors
    #[error("Permission denied: job '{job}' may not receive credential '{credential}'")]
    PermissionDenied { job: String, credential: String },

    #[error("Secret not found: {0}")]
    SecretNotFound(String),

    #[error("Secret provider not configured: {0}")]
    SecretProviderNotConfigured(String),

    // Step errors
    #[error("Step '{step}' failed with exit code {exit_code}: {message}")]
    StepFailed {
        step: String,
        exit_code: i32,
        message: String,
    },

    #[error("Step '{step}' timed out after {minutes} minutes")]
    StepTimeout { step: String, minutes: u32 },

    #[error("Action not registered: {0}")]
    ActionNotFound(String),

    #[error("Invalid action input: {0}")]
    InvalidInput(String),

    // Lifecycle errors
    #[error("Invalid status transition for job '{job}': {from} -> {to}")]
    InvalidTransition {
        job: String,
        from: String,
        to: String,
    },

    #[error("Cancelled: {reason}")]
    Cancelled { reason: String },

    // Cache errors
    #[error("Cache error: {0}")]
    Cache(String),

    // Infrastructure errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error came from pipeline configuration.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    /// Whether this error represents cancellation rather than failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_names_jobs() {
        let err = ConfigError::CycleDetected {
            scope: "pipeline 'ci'".to_string(),
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Cycle detected in pipeline 'ci': a -> b -> a");
    }

    #[test]
    fn test_config_error_classification() {
        let err: Error = ConfigError::EmptyPipeline("ci".into()).into();
        assert!(err.is_config());
        assert!(!err.is_cancelled());
    }
}
