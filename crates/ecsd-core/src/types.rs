//! Domain types shared across ecs-deploy crates.
//!
//! These mirror the subset of the orchestrator's task definition and service
//! model that the rollout logic reads or rewrites. Everything else the
//! orchestrator stores rides along in [`RawAttributes`] and is handed back
//! untouched on registration.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Full revision identifier (ARN) of a registered task definition.
pub type RevisionArn = String;

// ── Opaque pass-through ────────────────────────────────────────────

/// Orchestrator attributes carried verbatim from a fetched definition into a
/// new registration.
///
/// The adapter that produced the value is the only one able to read it back
/// (via [`RawAttributes::downcast_ref`]). Cloning shares the same allocation,
/// and equality is identity: two values are equal when they point at the same
/// fetched payload.
#[derive(Clone, Default)]
pub struct RawAttributes(Option<Arc<dyn Any + Send + Sync>>);

impl RawAttributes {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Some(Arc::new(value)))
    }

    pub fn empty() -> Self {
        Self(None)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_deref().and_then(|v| v.downcast_ref::<T>())
    }
}

impl PartialEq for RawAttributes {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for RawAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => f.write_str("RawAttributes(..)"),
            None => f.write_str("RawAttributes(empty)"),
        }
    }
}

// ── Task definitions ───────────────────────────────────────────────

/// One `name=value` entry of a container's environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentVariable {
    pub name: String,
    pub value: String,
}

impl EnvironmentVariable {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A single container inside a task definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerDefinition {
    pub name: String,
    /// Image reference, conventionally `repository[:tag]`.
    pub image: String,
    pub environment: Vec<EnvironmentVariable>,
    /// Every other container attribute (ports, cpu, log config, ...).
    pub raw: RawAttributes,
}

impl ContainerDefinition {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            environment: Vec::new(),
            raw: RawAttributes::empty(),
        }
    }

    pub fn with_env(mut self, name: &str, value: &str) -> Self {
        self.environment.push(EnvironmentVariable::new(name, value));
        self
    }
}

/// Task-level attributes copied unchanged into every new revision.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskAttributes {
    pub task_role_arn: Option<String>,
    pub execution_role_arn: Option<String>,
    pub network_mode: Option<String>,
    /// Volumes, placement constraints, compatibilities, task cpu/memory.
    pub raw: RawAttributes,
}

/// A registered (immutable) task definition revision.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDefinition {
    pub family: String,
    pub revision: i32,
    pub arn: RevisionArn,
    pub containers: Vec<ContainerDefinition>,
    pub attributes: TaskAttributes,
}

/// Request to register a new revision of a task definition family.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationRequest {
    pub family: String,
    pub containers: Vec<ContainerDefinition>,
    pub attributes: TaskAttributes,
}

// ── Services and deployments ───────────────────────────────────────

/// Desired/pending/running counters reported by the orchestrator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentCounts {
    pub desired: i32,
    pub pending: i32,
    pub running: i32,
}

impl DeploymentCounts {
    pub fn new(desired: i32, pending: i32, running: i32) -> Self {
        Self {
            desired,
            pending,
            running,
        }
    }

    /// Running instances have caught up with the desired count.
    pub fn is_converged(&self) -> bool {
        self.running == self.desired
    }
}

impl fmt::Display for DeploymentCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "desired: {}, pending: {}, running: {}",
            self.desired, self.pending, self.running
        )
    }
}

/// One in-flight rollout record of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: String,
    /// `PRIMARY`, `ACTIVE` or `INACTIVE`.
    pub status: String,
    pub task_definition: RevisionArn,
    pub counts: DeploymentCounts,
}

/// A long-running service and its current deployments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub cluster: String,
    pub name: String,
    pub task_definition: Option<RevisionArn>,
    pub counts: DeploymentCounts,
    pub deployments: Vec<Deployment>,
}

impl Service {
    /// The deployment rolling out the given revision, if the orchestrator has
    /// created one yet.
    pub fn deployment_for(&self, revision: &str) -> Option<&Deployment> {
        self.deployments
            .iter()
            .find(|d| d.task_definition == revision)
    }
}

/// Update sent to a service. `None` fields are left as they are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceUpdate {
    pub cluster: String,
    pub service: String,
    pub desired_count: Option<i32>,
    pub task_definition: Option<RevisionArn>,
}

impl ServiceUpdate {
    pub fn new(cluster: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            service: service.into(),
            desired_count: None,
            task_definition: None,
        }
    }

    pub fn with_desired_count(mut self, count: Option<i32>) -> Self {
        self.desired_count = count;
        self
    }

    /// Target a revision. An empty reference keeps the current one.
    pub fn with_revision(mut self, revision: Option<&str>) -> Self {
        self.task_definition = revision
            .filter(|r| !r.is_empty())
            .map(str::to_string);
        self
    }

    /// Neither field set: the remote call changes nothing.
    pub fn is_noop(&self) -> bool {
        self.desired_count.is_none() && self.task_definition.is_none()
    }
}

/// Translate a count flag into the wire value.
///
/// Any negative value means "keep the orchestrator's desired count". Values
/// the orchestrator cannot represent are rejected.
pub fn desired_count_from_flag(count: i64) -> Result<Option<i32>, ConfigError> {
    if count < 0 {
        return Ok(None);
    }
    i32::try_from(count)
        .map(Some)
        .map_err(|_| ConfigError::InvalidCount(count))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service_with(deployments: Vec<Deployment>) -> Service {
        Service {
            cluster: "default".to_string(),
            name: "api".to_string(),
            task_definition: None,
            counts: DeploymentCounts::default(),
            deployments,
        }
    }

    fn deployment(id: &str, revision: &str, counts: DeploymentCounts) -> Deployment {
        Deployment {
            id: id.to_string(),
            status: "PRIMARY".to_string(),
            task_definition: revision.to_string(),
            counts,
        }
    }

    #[test]
    fn count_flag_sentinel() {
        assert_eq!(desired_count_from_flag(-1).unwrap(), None);
        assert_eq!(desired_count_from_flag(-42).unwrap(), None);
        assert_eq!(desired_count_from_flag(0).unwrap(), Some(0));
        assert_eq!(desired_count_from_flag(3).unwrap(), Some(3));
        assert_eq!(
            desired_count_from_flag(i64::from(i32::MAX)).unwrap(),
            Some(i32::MAX)
        );
        assert!(matches!(
            desired_count_from_flag(i64::MAX),
            Err(ConfigError::InvalidCount(i64::MAX))
        ));
    }

    #[test]
    fn service_update_omits_unset_fields() {
        let update = ServiceUpdate::new("default", "api")
            .with_desired_count(None)
            .with_revision(Some(""));
        assert_eq!(update.desired_count, None);
        assert_eq!(update.task_definition, None);
        assert!(update.is_noop());

        let update = ServiceUpdate::new("default", "api")
            .with_desired_count(Some(2))
            .with_revision(Some("arn:task/api:7"));
        assert_eq!(update.desired_count, Some(2));
        assert_eq!(update.task_definition.as_deref(), Some("arn:task/api:7"));
    }

    #[test]
    fn deployment_lookup_matches_revision_only() {
        let svc = service_with(vec![
            deployment("old", "arn:task/api:1", DeploymentCounts::new(2, 0, 2)),
            deployment("new", "arn:task/api:2", DeploymentCounts::new(2, 1, 1)),
        ]);
        assert_eq!(svc.deployment_for("arn:task/api:2").unwrap().id, "new");
        assert!(svc.deployment_for("arn:task/api:3").is_none());
    }

    #[test]
    fn raw_attributes_equality_is_identity() {
        let a = RawAttributes::new(String::from("payload"));
        let b = a.clone();
        let c = RawAttributes::new(String::from("payload"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(RawAttributes::empty(), RawAttributes::default());
        assert_eq!(a.downcast_ref::<String>().map(String::as_str), Some("payload"));
        assert!(a.downcast_ref::<u32>().is_none());
    }

    #[test]
    fn counts_display() {
        let counts = DeploymentCounts::new(3, 1, 2);
        assert_eq!(counts.to_string(), "desired: 3, pending: 1, running: 2");
        assert!(!counts.is_converged());
        assert!(DeploymentCounts::new(0, 0, 0).is_converged());
    }
}
