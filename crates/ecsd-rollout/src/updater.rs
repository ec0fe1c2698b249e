//! Service updater — point a service at a revision and/or desired count.

use ecsd_core::{ApiResult, OrchestrationApi, ServiceUpdate};
use tracing::info;

pub struct ServiceUpdater<'a, A: ?Sized> {
    api: &'a A,
}

impl<'a, A: OrchestrationApi + ?Sized> ServiceUpdater<'a, A> {
    pub fn new(api: &'a A) -> Self {
        Self { api }
    }

    /// Send the update and return it as sent.
    ///
    /// `desired_count: None` and an absent or empty `revision` are omitted
    /// from the request, leaving the orchestrator's current values in place.
    /// Returns as soon as the orchestrator accepts the change.
    pub async fn update(
        &self,
        cluster: &str,
        service: &str,
        desired_count: Option<i32>,
        revision: Option<&str>,
    ) -> ApiResult<ServiceUpdate> {
        let update = ServiceUpdate::new(cluster, service)
            .with_desired_count(desired_count)
            .with_revision(revision);

        self.api.update_service(&update).await?;
        info!(
            desired_count = ?update.desired_count,
            task_definition = update.task_definition.as_deref().unwrap_or("unchanged"),
            "service updated"
        );
        Ok(update)
    }
}
