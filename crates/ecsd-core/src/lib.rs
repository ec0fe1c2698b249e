//! ecsd-core — domain types and the orchestration boundary for ecs-deploy.
//!
//! - **types** — task definitions, containers, services, deployments
//! - **env** — environment override sets and the merge algorithm
//! - **config** — `deploy.toml` parsing and resolution into `DeployConfig`
//! - **api** — the `OrchestrationApi` trait the rollout logic calls
//! - **memory** — an in-memory orchestrator for tests

pub mod api;
pub mod config;
pub mod env;
pub mod error;
pub mod memory;
pub mod types;

pub use api::OrchestrationApi;
pub use config::{DeployConfig, DeploySettings, ImageOverride, WaitPolicy, WaitSettings};
pub use env::{EnvAssignment, EnvironmentOverrides, MergeReport, merge_environment};
pub use error::{ApiError, ApiResult, ConfigError};
pub use memory::{InMemoryOrchestrator, Operation};
pub use types::*;
