//! ecsd-aws — the Amazon ECS implementation of `OrchestrationApi`.
//!
//! - **session** — region, profile and assume-role credential setup
//! - **ecs** — `EcsOrchestrator`, translating between SDK and core types

pub mod ecs;
pub mod session;

pub use ecs::EcsOrchestrator;
pub use session::{SESSION_NAME, SessionConfig, ecs_client};
