//! Rollout error types.

use std::fmt;

use ecsd_core::{ApiError, DeploymentCounts, RevisionArn};
use thiserror::Error;

/// The step of a deploy run that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Register,
    UpdateService,
    Wait,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Register => "register task definition",
            Stage::UpdateService => "update service",
            Stage::Wait => "wait",
        })
    }
}

/// Errors that abort a deploy run. Nothing done before the failing step is
/// undone.
#[derive(Debug, Error)]
pub enum RolloutError {
    #[error("register task definition: {0}")]
    Register(#[source] ApiError),

    /// The service update failed. If a revision was registered first it
    /// stays registered and unused.
    #[error("update service: {source}")]
    UpdateService {
        registered: Option<RevisionArn>,
        #[source]
        source: ApiError,
    },

    #[error("wait: {0}")]
    Wait(#[source] ApiError),

    #[error("wait: timed out after {elapsed_ms}ms ({})", fmt_counts(.last))]
    TimedOut {
        elapsed_ms: u64,
        last: Option<DeploymentCounts>,
    },

    #[error("wait: cancelled ({})", fmt_counts(.last))]
    Cancelled { last: Option<DeploymentCounts> },
}

impl RolloutError {
    pub fn stage(&self) -> Stage {
        match self {
            RolloutError::Register(_) => Stage::Register,
            RolloutError::UpdateService { .. } => Stage::UpdateService,
            RolloutError::Wait(_)
            | RolloutError::TimedOut { .. }
            | RolloutError::Cancelled { .. } => Stage::Wait,
        }
    }

    /// A revision registered by this run that the service never picked up.
    pub fn orphaned_revision(&self) -> Option<&str> {
        match self {
            RolloutError::UpdateService { registered, .. } => registered.as_deref(),
            _ => None,
        }
    }
}

fn fmt_counts(counts: &Option<DeploymentCounts>) -> String {
    match counts {
        Some(c) => c.to_string(),
        None => "deployment not observed".to_string(),
    }
}

pub type RolloutResult<T> = Result<T, RolloutError>;
