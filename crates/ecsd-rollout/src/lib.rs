//! ecsd-rollout — rolling updates of an orchestrated service.
//!
//! A deploy run registers a new task definition revision (retagged image,
//! merged environment), points the service at it, and optionally waits for
//! the orchestrator to report the new revision converged.
//!
//! # Components
//!
//! - **`mutator`** — build and register the next task definition revision
//! - **`updater`** — send the service update
//! - **`watcher`** — poll until running == desired (cancellable, bounded)
//! - **`workflow`** — the three steps in order, with per-stage errors

pub mod error;
pub mod mutator;
pub mod updater;
pub mod watcher;
pub mod workflow;

pub use error::{RolloutError, RolloutResult, Stage};
pub use mutator::{
    ContainerChange, MutationReport, RegisteredRevision, TaskDefinitionMutator,
    build_registration,
};
pub use updater::ServiceUpdater;
pub use watcher::{DeploymentWatcher, WaitOutcome, WatchPhase, WatchState};
pub use workflow::{DeployReport, deploy};
