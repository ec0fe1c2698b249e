//! Deployment watcher — polls a service until a revision has converged.
//!
//! The watch progresses `Polling → Converged | TimedOut | Cancelled`. Remote
//! errors end the wait immediately and are returned as errors rather than as
//! a phase.

use std::time::Instant;

use ecsd_core::{ApiResult, DeploymentCounts, OrchestrationApi, WaitPolicy};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Current phase of a watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchPhase {
    /// Waiting for the target deployment to catch up.
    Polling,
    /// Running count equals desired count for the target revision.
    Converged,
    /// The wait exceeded its deadline.
    TimedOut,
    /// The caller asked the wait to stop.
    Cancelled,
}

impl WatchPhase {
    pub fn is_terminal(self) -> bool {
        self != WatchPhase::Polling
    }
}

/// State of a watch on one revision, advanced by each poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchState {
    pub target: String,
    pub phase: WatchPhase,
    pub polls: u32,
    /// Counters of the target deployment at every poll that found it.
    pub progress: Vec<DeploymentCounts>,
}

impl WatchState {
    pub fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            phase: WatchPhase::Polling,
            polls: 0,
            progress: Vec::new(),
        }
    }

    /// Record one poll. `counts` are those of the deployment targeting this
    /// revision, or `None` if the orchestrator has not created it yet.
    pub fn observe(&mut self, counts: Option<DeploymentCounts>) -> WatchPhase {
        if self.phase.is_terminal() {
            return self.phase;
        }
        self.polls += 1;

        if let Some(counts) = counts {
            self.progress.push(counts);
            if counts.is_converged() {
                self.phase = WatchPhase::Converged;
            }
        }
        self.phase
    }

    pub fn last(&self) -> Option<DeploymentCounts> {
        self.progress.last().copied()
    }
}

/// Final result of [`DeploymentWatcher::wait`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaitOutcome {
    pub state: WatchState,
    pub elapsed_ms: u64,
}

impl WaitOutcome {
    pub fn phase(&self) -> WatchPhase {
        self.state.phase
    }

    pub fn is_converged(&self) -> bool {
        self.state.phase == WatchPhase::Converged
    }
}

/// Polls `DescribeServices` on a fixed interval.
pub struct DeploymentWatcher<'a, A: ?Sized> {
    api: &'a A,
    policy: WaitPolicy,
}

impl<'a, A: OrchestrationApi + ?Sized> DeploymentWatcher<'a, A> {
    pub fn new(api: &'a A, policy: WaitPolicy) -> Self {
        Self { api, policy }
    }

    /// Block until the deployment targeting `target` has as many running
    /// instances as desired, the policy's timeout passes, or `cancel` flips to
    /// `true`.
    ///
    /// Cancellation and the deadline are checked before every sleep; a
    /// cancellation arriving mid-sleep ends the wait without waiting for the
    /// next tick. If the sender side of `cancel` is dropped the wait simply
    /// becomes uncancellable.
    pub async fn wait(
        &self,
        cluster: &str,
        service: &str,
        target: &str,
        mut cancel: watch::Receiver<bool>,
    ) -> ApiResult<WaitOutcome> {
        let started = Instant::now();
        // A deadline past what `Instant` can represent never arrives.
        let deadline = self.policy.timeout.and_then(|t| started.checked_add(t));
        let mut state = WatchState::new(target);
        let mut cancellable = true;

        info!(
            %target,
            interval_ms = self.policy.poll_interval.as_millis() as u64,
            "waiting for deployment"
        );

        while !state.phase.is_terminal() {
            if *cancel.borrow() {
                state.phase = WatchPhase::Cancelled;
                break;
            }

            let now = Instant::now();
            let nap = match deadline {
                Some(deadline) if now >= deadline => {
                    state.phase = WatchPhase::TimedOut;
                    break;
                }
                Some(deadline) => self.policy.poll_interval.min(deadline - now),
                None => self.policy.poll_interval,
            };

            if cancellable {
                tokio::select! {
                    _ = tokio::time::sleep(nap) => {}
                    changed = cancel.changed() => {
                        if changed.is_err() {
                            cancellable = false;
                        }
                        continue;
                    }
                }
            } else {
                tokio::time::sleep(nap).await;
            }

            let svc = self.api.describe_service(cluster, service).await?;
            let counts = svc.deployment_for(target).map(|d| d.counts);
            match counts {
                Some(c) => info!(
                    desired = c.desired,
                    pending = c.pending,
                    running = c.running,
                    "--> deployment progress"
                ),
                None => debug!(%target, "deployment not created yet"),
            }
            state.observe(counts);
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match state.phase {
            WatchPhase::Converged => info!(polls = state.polls, elapsed_ms, "deployment converged"),
            phase => warn!(?phase, polls = state.polls, elapsed_ms, "stopped waiting"),
        }

        Ok(WaitOutcome { state, elapsed_ms })
    }
}
