//! In-memory orchestrator.
//!
//! Keeps task definition revisions and services in process and simulates a
//! rollout: every `describe_service` call moves the primary deployment's
//! running count one step toward its desired count and drains older
//! deployments. Used by tests across the workspace; supports failure
//! injection and records every request it receives.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::api::OrchestrationApi;
use crate::error::{ApiError, ApiResult};
use crate::types::*;

/// Remote operations, used to target failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    DescribeTaskDefinition,
    RegisterTaskDefinition,
    UpdateService,
    DescribeServices,
}

impl Operation {
    pub fn name(self) -> &'static str {
        match self {
            Operation::DescribeTaskDefinition => "DescribeTaskDefinition",
            Operation::RegisterTaskDefinition => "RegisterTaskDefinition",
            Operation::UpdateService => "UpdateService",
            Operation::DescribeServices => "DescribeServices",
        }
    }
}

#[derive(Default)]
struct State {
    /// family → revisions, oldest first.
    task_definitions: HashMap<String, Vec<TaskDefinition>>,
    /// (cluster, service) → service.
    services: HashMap<(String, String), Service>,
    failures: HashSet<Operation>,
    registrations: Vec<RegistrationRequest>,
    updates: Vec<ServiceUpdate>,
    describe_calls: usize,
    next_deployment: u64,
}

/// Thread-safe in-memory [`OrchestrationApi`]. Clones share state.
#[derive(Clone)]
pub struct InMemoryOrchestrator {
    state: Arc<Mutex<State>>,
    /// Instances started per poll; `0` leaves deployments stuck.
    step: i32,
}

impl Default for InMemoryOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryOrchestrator {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            step: 1,
        }
    }

    /// Change how many instances start per poll.
    pub fn with_convergence_step(mut self, step: i32) -> Self {
        self.step = step;
        self
    }

    pub fn revision_arn(family: &str, revision: i32) -> RevisionArn {
        format!("arn:aws:ecs:us-east-1:000000000000:task-definition/{family}:{revision}")
    }

    /// Store a new revision of `family` directly, bypassing request recording.
    pub async fn seed_task_definition(
        &self,
        family: &str,
        containers: Vec<ContainerDefinition>,
        attributes: TaskAttributes,
    ) -> TaskDefinition {
        let mut state = self.state.lock().await;
        store_revision(&mut state, family, containers, attributes)
    }

    /// Create a service already converged on `task_definition`.
    pub async fn seed_service(
        &self,
        cluster: &str,
        name: &str,
        desired: i32,
        task_definition: &str,
    ) {
        let mut state = self.state.lock().await;
        let id = next_deployment_id(&mut state);
        let counts = DeploymentCounts::new(desired, 0, desired);
        state.services.insert(
            (cluster.to_string(), name.to_string()),
            Service {
                cluster: cluster.to_string(),
                name: name.to_string(),
                task_definition: Some(task_definition.to_string()),
                counts,
                deployments: vec![Deployment {
                    id,
                    status: "PRIMARY".to_string(),
                    task_definition: task_definition.to_string(),
                    counts,
                }],
            },
        );
    }

    /// Replace a service's deployment list wholesale.
    pub async fn set_deployments(&self, cluster: &str, name: &str, deployments: Vec<Deployment>) {
        let mut state = self.state.lock().await;
        if let Some(svc) = state.services.get_mut(&(cluster.to_string(), name.to_string())) {
            svc.deployments = deployments;
        }
    }

    /// Make the next call of `op` fail with a remote error.
    pub async fn fail_next(&self, op: Operation) {
        self.state.lock().await.failures.insert(op);
    }

    pub async fn registrations(&self) -> Vec<RegistrationRequest> {
        self.state.lock().await.registrations.clone()
    }

    pub async fn updates(&self) -> Vec<ServiceUpdate> {
        self.state.lock().await.updates.clone()
    }

    pub async fn describe_calls(&self) -> usize {
        self.state.lock().await.describe_calls
    }

    pub async fn revisions(&self, family: &str) -> Vec<TaskDefinition> {
        self.state
            .lock()
            .await
            .task_definitions
            .get(family)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn service(&self, cluster: &str, name: &str) -> Option<Service> {
        self.state
            .lock()
            .await
            .services
            .get(&(cluster.to_string(), name.to_string()))
            .cloned()
    }
}

#[async_trait]
impl OrchestrationApi for InMemoryOrchestrator {
    async fn describe_task_definition(&self, family: &str) -> ApiResult<TaskDefinition> {
        let mut state = self.state.lock().await;
        take_failure(&mut state, Operation::DescribeTaskDefinition)?;
        state
            .task_definitions
            .get(family)
            .and_then(|revs| revs.last())
            .cloned()
            .ok_or_else(|| ApiError::TaskDefinitionNotFound(family.to_string()))
    }

    async fn register_task_definition(
        &self,
        request: RegistrationRequest,
    ) -> ApiResult<TaskDefinition> {
        let mut state = self.state.lock().await;
        take_failure(&mut state, Operation::RegisterTaskDefinition)?;
        state.registrations.push(request.clone());
        let RegistrationRequest {
            family,
            containers,
            attributes,
        } = request;
        Ok(store_revision(&mut state, &family, containers, attributes))
    }

    async fn update_service(&self, update: &ServiceUpdate) -> ApiResult<()> {
        let mut state = self.state.lock().await;
        take_failure(&mut state, Operation::UpdateService)?;
        state.updates.push(update.clone());

        if let Some(arn) = &update.task_definition {
            let known = state
                .task_definitions
                .values()
                .flatten()
                .any(|td| &td.arn == arn);
            if !known {
                return Err(ApiError::remote(
                    Operation::UpdateService.name(),
                    format!("unknown task definition {arn}"),
                ));
            }
        }

        let key = (update.cluster.clone(), update.service.clone());
        if !state.services.contains_key(&key) {
            return Err(ApiError::ServiceNotFound(update.service.clone()));
        }
        let id = next_deployment_id(&mut state);
        let Some(svc) = state.services.get_mut(&key) else {
            return Err(ApiError::ServiceNotFound(update.service.clone()));
        };

        if let Some(desired) = update.desired_count {
            svc.counts.desired = desired;
        }

        match &update.task_definition {
            Some(arn) if svc.task_definition.as_ref() != Some(arn) => {
                for d in &mut svc.deployments {
                    d.status = "ACTIVE".to_string();
                    d.counts.desired = 0;
                }
                svc.deployments.insert(
                    0,
                    Deployment {
                        id,
                        status: "PRIMARY".to_string(),
                        task_definition: arn.clone(),
                        counts: DeploymentCounts::new(svc.counts.desired, 0, 0),
                    },
                );
                svc.task_definition = Some(arn.clone());
            }
            _ => {
                let desired = svc.counts.desired;
                if let Some(primary) = svc.deployments.iter_mut().find(|d| d.status == "PRIMARY") {
                    primary.counts.desired = desired;
                }
            }
        }

        debug!(cluster = %update.cluster, service = %update.service, "service updated");
        Ok(())
    }

    async fn describe_service(&self, cluster: &str, service: &str) -> ApiResult<Service> {
        let mut state = self.state.lock().await;
        take_failure(&mut state, Operation::DescribeServices)?;
        state.describe_calls += 1;

        let step = self.step;
        let svc = state
            .services
            .get_mut(&(cluster.to_string(), service.to_string()))
            .ok_or_else(|| ApiError::ServiceNotFound(service.to_string()))?;

        for d in &mut svc.deployments {
            advance(&mut d.counts, step);
        }
        svc.deployments
            .retain(|d| d.status == "PRIMARY" || d.counts.running > 0);
        svc.counts.running = svc.deployments.iter().map(|d| d.counts.running).sum();
        svc.counts.pending = svc.deployments.iter().map(|d| d.counts.pending).sum();

        Ok(svc.clone())
    }
}

fn take_failure(state: &mut State, op: Operation) -> ApiResult<()> {
    if state.failures.remove(&op) {
        return Err(ApiError::remote(op.name(), "injected failure"));
    }
    Ok(())
}

fn store_revision(
    state: &mut State,
    family: &str,
    containers: Vec<ContainerDefinition>,
    attributes: TaskAttributes,
) -> TaskDefinition {
    let revisions = state.task_definitions.entry(family.to_string()).or_default();
    let revision = revisions.last().map_or(1, |td| td.revision + 1);
    let td = TaskDefinition {
        family: family.to_string(),
        revision,
        arn: InMemoryOrchestrator::revision_arn(family, revision),
        containers,
        attributes,
    };
    revisions.push(td.clone());
    td
}

fn next_deployment_id(state: &mut State) -> String {
    state.next_deployment += 1;
    format!("ecs-svc/{:016}", state.next_deployment)
}

/// Move running toward desired by up to `step`, reporting the rest as pending.
fn advance(counts: &mut DeploymentCounts, step: i32) {
    if counts.running < counts.desired {
        counts.running = (counts.running + step).min(counts.desired);
    } else if counts.running > counts.desired {
        counts.running = (counts.running - step).max(counts.desired);
    }
    counts.pending = (counts.desired - counts.running).max(0);
}
