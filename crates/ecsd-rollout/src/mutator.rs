//! Task definition mutation — retag images, merge environment, register.
//!
//! [`build_registration`] is a pure value transformation: it consumes the
//! fetched revision and returns the request for the next one together with a
//! record of what changed. [`TaskDefinitionMutator`] wraps it with the fetch
//! and the registration call.

use ecsd_core::{
    ApiResult, EnvironmentOverrides, ImageOverride, MergeReport, OrchestrationApi,
    RegistrationRequest, RevisionArn, TaskDefinition, merge_environment,
};
use serde::Serialize;
use tracing::{debug, info};

/// What happened to one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerChange {
    pub container: String,
    /// `(old, new)` image reference, when retagged.
    pub image: Option<(String, String)>,
    pub env: MergeReport,
}

/// Per-container record of a mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MutationReport {
    pub containers: Vec<ContainerChange>,
}

impl MutationReport {
    pub fn retagged(&self) -> impl Iterator<Item = &ContainerChange> {
        self.containers.iter().filter(|c| c.image.is_some())
    }
}

/// A newly registered revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredRevision {
    pub family: String,
    pub revision: i32,
    pub arn: RevisionArn,
    /// The revision it was derived from.
    pub previous_arn: RevisionArn,
    pub changes: MutationReport,
}

/// Turn a fetched revision into the request for the next one.
///
/// Containers whose image starts with the override prefix get
/// `prefix:tag`; all others keep their image. Environment overrides apply to
/// every container. Task-level attributes are carried over unchanged.
pub fn build_registration(
    definition: TaskDefinition,
    image: Option<&ImageOverride>,
    env: &EnvironmentOverrides,
) -> (RegistrationRequest, MutationReport) {
    let TaskDefinition {
        family,
        containers,
        attributes,
        ..
    } = definition;

    let mut report = MutationReport::default();
    let containers = containers
        .into_iter()
        .map(|mut container| {
            let retag = image
                .filter(|img| img.matches(&container.image))
                .map(|img| {
                    let new_image = img.reference();
                    debug!(container = %container.name, from = %container.image, to = %new_image, "updating image");
                    (std::mem::replace(&mut container.image, new_image.clone()), new_image)
                });
            let env_report = merge_environment(&mut container.environment, env);
            report.containers.push(ContainerChange {
                container: container.name.clone(),
                image: retag,
                env: env_report,
            });
            container
        })
        .collect();

    (
        RegistrationRequest {
            family,
            containers,
            attributes,
        },
        report,
    )
}

/// Fetches the active revision of a family and registers a mutated copy.
pub struct TaskDefinitionMutator<'a, A: ?Sized> {
    api: &'a A,
}

impl<'a, A: OrchestrationApi + ?Sized> TaskDefinitionMutator<'a, A> {
    pub fn new(api: &'a A) -> Self {
        Self { api }
    }

    /// Register the next revision of `family`.
    ///
    /// Fails with `TaskDefinitionNotFound` when the family has no active
    /// revision, and with the remote error for anything else.
    pub async fn mutate(
        &self,
        family: &str,
        image: Option<&ImageOverride>,
        env: &EnvironmentOverrides,
    ) -> ApiResult<RegisteredRevision> {
        let current = self.api.describe_task_definition(family).await?;
        let previous_arn = current.arn.clone();
        debug!(%family, revision = current.revision, "fetched task definition");

        let (request, changes) = build_registration(current, image, env);
        if image.is_some() && changes.retagged().next().is_none() {
            info!(
                %family,
                prefix = image.map(|i| i.prefix.as_str()).unwrap_or_default(),
                "no container image matched the prefix"
            );
        }

        let registered = self.api.register_task_definition(request).await?;
        info!(
            family = %registered.family,
            revision = registered.revision,
            arn = %registered.arn,
            "registered task definition"
        );

        Ok(RegisteredRevision {
            family: registered.family,
            revision: registered.revision,
            arn: registered.arn,
            previous_arn,
            changes,
        })
    }
}
