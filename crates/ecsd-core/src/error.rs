//! Error types for the orchestration boundary and configuration.

use thiserror::Error;

/// Result type alias for orchestration API calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors surfaced by an [`OrchestrationApi`](crate::OrchestrationApi).
#[derive(Debug, Error)]
pub enum ApiError {
    /// No active task definition exists for the family.
    #[error("task definition not found: {0}")]
    TaskDefinitionNotFound(String),

    /// The cluster does not know the service.
    #[error("service not found: {0}")]
    ServiceNotFound(String),

    /// Any other failure reported by (or on the way to) the orchestrator.
    #[error("{operation} failed: {message}")]
    Remote {
        operation: &'static str,
        message: String,
    },
}

impl ApiError {
    pub fn remote(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Remote {
            operation,
            message: message.into(),
        }
    }
}

/// Errors raised while assembling a [`DeployConfig`](crate::DeployConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("a service name is required")]
    MissingService,

    #[error("--image requires --tag")]
    ImageWithoutTag,

    #[error("invalid environment assignment (expected NAME=value): {0}")]
    InvalidEnv(String),

    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    #[error("desired count {0} is out of range")]
    InvalidCount(i64),
}
