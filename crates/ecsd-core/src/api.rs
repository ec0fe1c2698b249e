//! The orchestration API boundary consumed by the rollout logic.

use async_trait::async_trait;

use crate::error::ApiResult;
use crate::types::{RegistrationRequest, Service, ServiceUpdate, TaskDefinition};

/// Remote calls a rollout needs from the orchestrator.
///
/// Implemented by the ECS adapter in `ecsd-aws` and by
/// [`InMemoryOrchestrator`](crate::InMemoryOrchestrator) for tests.
#[async_trait]
pub trait OrchestrationApi: Send + Sync {
    /// Fetch the latest active revision of a family.
    async fn describe_task_definition(&self, family: &str) -> ApiResult<TaskDefinition>;

    /// Register a new revision and return it as stored.
    async fn register_task_definition(
        &self,
        request: RegistrationRequest,
    ) -> ApiResult<TaskDefinition>;

    /// Point a service at a new revision and/or desired count.
    async fn update_service(&self, update: &ServiceUpdate) -> ApiResult<()>;

    /// Current state of one service, including its deployments.
    async fn describe_service(&self, cluster: &str, service: &str) -> ApiResult<Service>;
}
