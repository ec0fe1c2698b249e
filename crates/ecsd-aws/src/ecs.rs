//! `OrchestrationApi` backed by Amazon ECS.
//!
//! SDK shapes are converted into core types on the way in. The original SDK
//! container and task definitions ride along in `RawAttributes`, so fields
//! the core never looks at (port mappings, log configuration, volumes,
//! placement constraints) survive into the next revision untouched.

use async_trait::async_trait;
use aws_sdk_ecs::Client;
use aws_sdk_ecs::error::DisplayErrorContext;
use aws_sdk_ecs::operation::describe_task_definition::DescribeTaskDefinitionError;
use aws_sdk_ecs::operation::register_task_definition::builders::RegisterTaskDefinitionFluentBuilder;
use aws_sdk_ecs::operation::update_service::builders::UpdateServiceFluentBuilder;
use aws_sdk_ecs::types as ecs;
use ecsd_core::{
    ApiError, ApiResult, ContainerDefinition, Deployment, DeploymentCounts, EnvironmentVariable,
    OrchestrationApi, RawAttributes, RegistrationRequest, Service, ServiceUpdate, TaskAttributes,
    TaskDefinition,
};
use tracing::debug;

use crate::session::{SessionConfig, ecs_client};

/// ECS responds with this client error for unknown families and revisions.
const UNKNOWN_TASK_DEFINITION: &str = "Unable to describe task definition";

#[derive(Debug, Clone)]
pub struct EcsOrchestrator {
    client: Client,
}

impl EcsOrchestrator {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn connect(session: &SessionConfig) -> Self {
        Self::new(ecs_client(session).await)
    }
}

#[async_trait]
impl OrchestrationApi for EcsOrchestrator {
    async fn describe_task_definition(&self, family: &str) -> ApiResult<TaskDefinition> {
        let output = self
            .client
            .describe_task_definition()
            .task_definition(family)
            .send()
            .await
            .map_err(|e| {
                let not_found = matches!(
                    e.as_service_error(),
                    Some(DescribeTaskDefinitionError::ClientException(ex))
                        if ex.message().is_some_and(|m| m.contains(UNKNOWN_TASK_DEFINITION))
                );
                if not_found {
                    ApiError::TaskDefinitionNotFound(family.to_string())
                } else {
                    remote("DescribeTaskDefinition", e)
                }
            })?;

        let definition = output
            .task_definition()
            .ok_or_else(|| ApiError::TaskDefinitionNotFound(family.to_string()))?;
        debug!(
            %family,
            revision = definition.revision(),
            containers = definition.container_definitions().len(),
            "described task definition"
        );
        Ok(task_definition_from_sdk(definition))
    }

    async fn register_task_definition(
        &self,
        request: RegistrationRequest,
    ) -> ApiResult<TaskDefinition> {
        let output = register_request(&self.client, request)
            .send()
            .await
            .map_err(|e| remote("RegisterTaskDefinition", e))?;
        output
            .task_definition()
            .map(task_definition_from_sdk)
            .ok_or_else(|| {
                ApiError::remote("RegisterTaskDefinition", "response has no task definition")
            })
    }

    async fn update_service(&self, update: &ServiceUpdate) -> ApiResult<()> {
        update_service_request(&self.client, update)
            .send()
            .await
            .map_err(|e| remote("UpdateService", e))?;
        Ok(())
    }

    async fn describe_service(&self, cluster: &str, service: &str) -> ApiResult<Service> {
        let output = self
            .client
            .describe_services()
            .cluster(cluster)
            .services(service)
            .send()
            .await
            .map_err(|e| remote("DescribeServices", e))?;

        match output.services().first() {
            Some(svc) if svc.status() != Some("INACTIVE") => Ok(service_from_sdk(cluster, svc)),
            Some(_) => Err(ApiError::ServiceNotFound(format!("{service} (INACTIVE)"))),
            None => {
                let reason = output
                    .failures()
                    .first()
                    .and_then(|f| f.reason())
                    .unwrap_or("MISSING");
                Err(ApiError::ServiceNotFound(format!("{service} ({reason})")))
            }
        }
    }
}

fn remote<E: std::error::Error>(operation: &'static str, err: E) -> ApiError {
    ApiError::remote(operation, DisplayErrorContext(err).to_string())
}

fn non_empty<T: Clone>(items: &[T]) -> Option<Vec<T>> {
    (!items.is_empty()).then(|| items.to_vec())
}

// ── SDK → core ─────────────────────────────────────────────────────

fn task_definition_from_sdk(td: &ecs::TaskDefinition) -> TaskDefinition {
    TaskDefinition {
        family: td.family().unwrap_or_default().to_string(),
        revision: td.revision(),
        arn: td.task_definition_arn().unwrap_or_default().to_string(),
        containers: td
            .container_definitions()
            .iter()
            .map(container_from_sdk)
            .collect(),
        attributes: TaskAttributes {
            task_role_arn: td.task_role_arn().map(str::to_string),
            execution_role_arn: td.execution_role_arn().map(str::to_string),
            network_mode: td.network_mode().map(|m| m.as_str().to_string()),
            raw: RawAttributes::new(td.clone()),
        },
    }
}

fn container_from_sdk(container: &ecs::ContainerDefinition) -> ContainerDefinition {
    ContainerDefinition {
        name: container.name().unwrap_or_default().to_string(),
        image: container.image().unwrap_or_default().to_string(),
        environment: container
            .environment()
            .iter()
            .map(|kv| {
                EnvironmentVariable::new(
                    kv.name().unwrap_or_default(),
                    kv.value().unwrap_or_default(),
                )
            })
            .collect(),
        raw: RawAttributes::new(container.clone()),
    }
}

fn service_from_sdk(cluster: &str, svc: &ecs::Service) -> Service {
    Service {
        cluster: cluster.to_string(),
        name: svc.service_name().unwrap_or_default().to_string(),
        task_definition: svc.task_definition().map(str::to_string),
        counts: DeploymentCounts::new(svc.desired_count(), svc.pending_count(), svc.running_count()),
        deployments: svc
            .deployments()
            .iter()
            .map(|d| Deployment {
                id: d.id().unwrap_or_default().to_string(),
                status: d.status().unwrap_or_default().to_string(),
                task_definition: d.task_definition().unwrap_or_default().to_string(),
                counts: DeploymentCounts::new(d.desired_count(), d.pending_count(), d.running_count()),
            })
            .collect(),
    }
}

// ── core → SDK ─────────────────────────────────────────────────────

/// Write image and environment back onto the SDK container it came from.
fn container_to_sdk(container: ContainerDefinition) -> ecs::ContainerDefinition {
    let environment: Vec<ecs::KeyValuePair> = container
        .environment
        .into_iter()
        .map(|var| {
            ecs::KeyValuePair::builder()
                .name(var.name)
                .value(var.value)
                .build()
        })
        .collect();

    match container.raw.downcast_ref::<ecs::ContainerDefinition>() {
        Some(raw) => {
            let mut def = raw.clone();
            def.image = Some(container.image);
            def.environment = Some(environment);
            def
        }
        None => ecs::ContainerDefinition::builder()
            .name(container.name)
            .image(container.image)
            .set_environment(Some(environment))
            .build(),
    }
}

fn register_request(
    client: &Client,
    request: RegistrationRequest,
) -> RegisterTaskDefinitionFluentBuilder {
    let RegistrationRequest {
        family,
        containers,
        attributes,
    } = request;
    let containers: Vec<_> = containers.into_iter().map(container_to_sdk).collect();

    let mut call = client
        .register_task_definition()
        .family(family)
        .set_task_role_arn(attributes.task_role_arn.clone())
        .set_execution_role_arn(attributes.execution_role_arn.clone())
        .set_network_mode(attributes.network_mode.as_deref().map(ecs::NetworkMode::from))
        .set_container_definitions(Some(containers));

    if let Some(raw) = attributes.raw.downcast_ref::<ecs::TaskDefinition>() {
        call = call
            .set_volumes(non_empty(raw.volumes()))
            .set_placement_constraints(non_empty(raw.placement_constraints()))
            .set_requires_compatibilities(non_empty(raw.requires_compatibilities()))
            .set_cpu(raw.cpu().map(str::to_string))
            .set_memory(raw.memory().map(str::to_string))
            .set_runtime_platform(raw.runtime_platform().cloned())
            .set_ephemeral_storage(raw.ephemeral_storage().cloned())
            .set_proxy_configuration(raw.proxy_configuration().cloned());
    }
    call
}

fn update_service_request(client: &Client, update: &ServiceUpdate) -> UpdateServiceFluentBuilder {
    client
        .update_service()
        .cluster(&update.cluster)
        .service(&update.service)
        .set_desired_count(update.desired_count)
        .set_task_definition(update.task_definition.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_ecs::config::{BehaviorVersion, Region};

    fn client() -> Client {
        let config = aws_sdk_ecs::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .build();
        Client::from_conf(config)
    }

    fn sdk_container() -> ecs::ContainerDefinition {
        ecs::ContainerDefinition::builder()
            .name("app")
            .image("123.dkr.ecr.us-east-1.amazonaws.com/api:v1")
            .memory(512)
            .essential(true)
            .environment(ecs::KeyValuePair::builder().name("MODE").value("old").build())
            .build()
    }

    fn sdk_task_definition() -> ecs::TaskDefinition {
        ecs::TaskDefinition::builder()
            .family("api")
            .revision(4)
            .task_definition_arn("arn:aws:ecs:us-east-1:123:task-definition/api:4")
            .task_role_arn("arn:aws:iam::123:role/api")
            .network_mode(ecs::NetworkMode::Awsvpc)
            .cpu("256")
            .memory("512")
            .container_definitions(sdk_container())
            .build()
    }

    #[test]
    fn task_definition_converts_to_core() {
        let td = task_definition_from_sdk(&sdk_task_definition());
        assert_eq!(td.family, "api");
        assert_eq!(td.revision, 4);
        assert_eq!(td.attributes.network_mode.as_deref(), Some("awsvpc"));
        assert_eq!(td.attributes.execution_role_arn, None);
        assert_eq!(td.containers.len(), 1);
        assert_eq!(td.containers[0].environment, vec![EnvironmentVariable::new("MODE", "old")]);
        assert!(td.attributes.raw.downcast_ref::<ecs::TaskDefinition>().is_some());
    }

    #[test]
    fn container_keeps_untouched_fields() {
        let mut container = container_from_sdk(&sdk_container());
        container.image = "123.dkr.ecr.us-east-1.amazonaws.com/api:v2".to_string();
        container.environment.push(EnvironmentVariable::new("RELEASE", "42"));

        let def = container_to_sdk(container);
        assert_eq!(def.image(), Some("123.dkr.ecr.us-east-1.amazonaws.com/api:v2"));
        assert_eq!(def.memory(), Some(512));
        assert_eq!(def.essential(), Some(true));
        let names: Vec<_> = def.environment().iter().filter_map(|kv| kv.name()).collect();
        assert_eq!(names, vec!["MODE", "RELEASE"]);
    }

    #[test]
    fn container_without_raw_is_built_fresh() {
        let def = container_to_sdk(ContainerDefinition::new("app", "nginx:1").with_env("A", "1"));
        assert_eq!(def.name(), Some("app"));
        assert_eq!(def.image(), Some("nginx:1"));
        assert_eq!(def.environment().len(), 1);
    }

    #[test]
    fn register_request_carries_task_attributes() {
        let td = task_definition_from_sdk(&sdk_task_definition());
        let request = RegistrationRequest {
            family: td.family,
            containers: td.containers,
            attributes: td.attributes,
        };
        let call = register_request(&client(), request);
        let input = call.as_input();
        assert_eq!(input.get_family().as_deref(), Some("api"));
        assert_eq!(input.get_cpu().as_deref(), Some("256"));
        assert_eq!(input.get_memory().as_deref(), Some("512"));
        assert_eq!(input.get_network_mode(), &Some(ecs::NetworkMode::Awsvpc));
        assert_eq!(input.get_volumes(), &None);
        assert_eq!(input.get_container_definitions().as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn update_request_omits_unset_fields() {
        let client = client();

        let count_only = ServiceUpdate::new("default", "api").with_desired_count(Some(3));
        let call = update_service_request(&client, &count_only);
        assert_eq!(call.as_input().get_desired_count(), &Some(3));
        assert_eq!(call.as_input().get_task_definition(), &None);

        let revision_only = ServiceUpdate::new("default", "api")
            .with_desired_count(None)
            .with_revision(Some("arn:aws:ecs:us-east-1:123:task-definition/api:5"));
        let call = update_service_request(&client, &revision_only);
        assert_eq!(call.as_input().get_desired_count(), &None);
        assert_eq!(
            call.as_input().get_task_definition().as_deref(),
            Some("arn:aws:ecs:us-east-1:123:task-definition/api:5")
        );
    }

    #[test]
    fn service_converts_deployments() {
        let svc = ecs::Service::builder()
            .service_name("api")
            .task_definition("arn:td/api:5")
            .desired_count(2)
            .running_count(1)
            .pending_count(1)
            .deployments(
                ecs::Deployment::builder()
                    .id("ecs-svc/1")
                    .status("PRIMARY")
                    .task_definition("arn:td/api:5")
                    .desired_count(2)
                    .pending_count(1)
                    .running_count(1)
                    .build(),
            )
            .build();

        let service = service_from_sdk("default", &svc);
        assert_eq!(service.cluster, "default");
        assert_eq!(service.counts, DeploymentCounts::new(2, 1, 1));
        let deployment = service.deployment_for("arn:td/api:5").unwrap();
        assert_eq!(deployment.status, "PRIMARY");
        assert!(!deployment.counts.is_converged());
    }
}
