//! The deploy run: register → update service → wait.

use ecsd_core::{ApiError, DeployConfig, OrchestrationApi, RevisionArn, ServiceUpdate};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{Instrument, info, info_span};

use crate::error::{RolloutError, RolloutResult};
use crate::mutator::{RegisteredRevision, TaskDefinitionMutator};
use crate::updater::ServiceUpdater;
use crate::watcher::{DeploymentWatcher, WaitOutcome, WatchPhase};

/// Everything a successful run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployReport {
    pub cluster: String,
    pub service: String,
    /// Set when a new revision was registered.
    pub registered: Option<RegisteredRevision>,
    pub update: ServiceUpdate,
    /// Set unless waiting was disabled.
    pub wait: Option<WaitOutcome>,
}

/// Run one deploy.
///
/// A new revision is registered only when the config asks for an image
/// retag or environment overrides. The wait targets the new revision, or
/// the service's current one when nothing was registered. Returns an error
/// naming the failed stage; earlier steps are not rolled back.
pub async fn deploy<A: OrchestrationApi + ?Sized>(
    api: &A,
    config: &DeployConfig,
    cancel: watch::Receiver<bool>,
) -> RolloutResult<DeployReport> {
    let span = info_span!("deploy", cluster = %config.cluster, service = %config.service);
    run(api, config, cancel).instrument(span).await
}

async fn run<A: OrchestrationApi + ?Sized>(
    api: &A,
    config: &DeployConfig,
    cancel: watch::Receiver<bool>,
) -> RolloutResult<DeployReport> {
    let registered = if config.needs_registration() {
        let revision = TaskDefinitionMutator::new(api)
            .mutate(&config.family, config.image.as_ref(), &config.env)
            .await
            .map_err(RolloutError::Register)?;
        Some(revision)
    } else {
        info!(family = %config.family, "no image or environment changes, keeping current revision");
        None
    };
    let registered_arn = registered.as_ref().map(|r| r.arn.clone());

    let update = ServiceUpdater::new(api)
        .update(
            &config.cluster,
            &config.service,
            config.desired_count,
            registered_arn.as_deref(),
        )
        .await
        .map_err(|source| RolloutError::UpdateService {
            registered: registered_arn.clone(),
            source,
        })?;

    let wait = if config.nowait {
        info!("not waiting for deployment");
        None
    } else {
        let target = match registered_arn {
            Some(arn) => arn,
            None => current_revision(api, config)
                .await
                .map_err(RolloutError::Wait)?,
        };
        let outcome = DeploymentWatcher::new(api, config.wait)
            .wait(&config.cluster, &config.service, &target, cancel)
            .await
            .map_err(RolloutError::Wait)?;
        match outcome.phase() {
            WatchPhase::TimedOut => {
                return Err(RolloutError::TimedOut {
                    elapsed_ms: outcome.elapsed_ms,
                    last: outcome.state.last(),
                });
            }
            WatchPhase::Cancelled => {
                return Err(RolloutError::Cancelled {
                    last: outcome.state.last(),
                });
            }
            WatchPhase::Converged | WatchPhase::Polling => {}
        }
        Some(outcome)
    };

    info!("update service success");
    Ok(DeployReport {
        cluster: config.cluster.clone(),
        service: config.service.clone(),
        registered,
        update,
        wait,
    })
}

/// The revision a service is currently assigned.
async fn current_revision<A: OrchestrationApi + ?Sized>(
    api: &A,
    config: &DeployConfig,
) -> Result<RevisionArn, ApiError> {
    let svc = api
        .describe_service(&config.cluster, &config.service)
        .await?;
    svc.task_definition.ok_or_else(|| {
        ApiError::remote(
            "DescribeServices",
            format!("service {} has no task definition", config.service),
        )
    })
}
