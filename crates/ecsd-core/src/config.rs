//! Deploy configuration: `deploy.toml` parsing, layering, and resolution.
//!
//! Settings come from three places, highest precedence first: command-line
//! flags (which also pick up `AWS_DEFAULT_REGION`), an optional TOML file, and
//! built-in defaults. Flags and file share the [`DeploySettings`] shape so they
//! can be layered with [`DeploySettings::overlay`] before being resolved once
//! into a [`DeployConfig`].

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::env::EnvironmentOverrides;
use crate::error::ConfigError;
use crate::types::desired_count_from_flag;

pub const DEFAULT_CLUSTER: &str = "default";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Partially specified deploy settings, as found in a file or on the command
/// line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeploySettings {
    pub service: Option<String>,
    pub cluster: Option<String>,
    /// Task definition family. Defaults to the service name.
    pub task: Option<String>,
    pub image: Option<String>,
    pub tag: Option<String>,
    pub region: Option<String>,
    /// Desired count; negative leaves the service's count unchanged.
    pub count: Option<i64>,
    pub nowait: Option<bool>,
    pub profile: Option<String>,
    /// Role ARN to assume before calling the orchestrator.
    pub assume_role: Option<String>,
    pub env: EnvironmentOverrides,
    pub wait: WaitSettings,
}

/// `[wait]` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WaitSettings {
    /// e.g. `"5s"`.
    pub poll_interval: Option<String>,
    /// e.g. `"15m"`; `"0"` waits without a deadline.
    pub timeout: Option<String>,
}

impl DeploySettings {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Layer `top` over `self`. Fields set in `top` win; environment
    /// overrides are merged key by key.
    pub fn overlay(self, top: DeploySettings) -> DeploySettings {
        let mut env = self.env;
        env.extend(top.env);
        DeploySettings {
            service: top.service.or(self.service),
            cluster: top.cluster.or(self.cluster),
            task: top.task.or(self.task),
            image: top.image.or(self.image),
            tag: top.tag.or(self.tag),
            region: top.region.or(self.region),
            count: top.count.or(self.count),
            nowait: top.nowait.or(self.nowait),
            profile: top.profile.or(self.profile),
            assume_role: top.assume_role.or(self.assume_role),
            env,
            wait: WaitSettings {
                poll_interval: top.wait.poll_interval.or(self.wait.poll_interval),
                timeout: top.wait.timeout.or(self.wait.timeout),
            },
        }
    }

    /// Apply defaults and validate.
    pub fn resolve(self) -> Result<DeployConfig, ConfigError> {
        let service = non_empty(self.service).ok_or(ConfigError::MissingService)?;
        let family = non_empty(self.task).unwrap_or_else(|| service.clone());

        let image = match (non_empty(self.image), non_empty(self.tag)) {
            (Some(prefix), Some(tag)) => Some(ImageOverride { prefix, tag }),
            (Some(_), None) => return Err(ConfigError::ImageWithoutTag),
            (None, _) => None,
        };

        let poll_interval = match self.wait.poll_interval.as_deref() {
            Some(s) => parse_duration(s)?,
            None => DEFAULT_POLL_INTERVAL,
        };
        if poll_interval.is_zero() {
            return Err(ConfigError::InvalidDuration(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        let desired_count = match self.count {
            Some(count) => desired_count_from_flag(count)?,
            None => None,
        };
        let timeout = match self.wait.timeout.as_deref() {
            Some(s) => Some(parse_duration(s)?).filter(|d| !d.is_zero()),
            None => Some(DEFAULT_WAIT_TIMEOUT),
        };

        Ok(DeployConfig {
            service,
            cluster: non_empty(self.cluster).unwrap_or_else(|| DEFAULT_CLUSTER.to_string()),
            family,
            image,
            region: non_empty(self.region).unwrap_or_else(|| DEFAULT_REGION.to_string()),
            desired_count,
            nowait: self.nowait.unwrap_or(false),
            profile: non_empty(self.profile),
            role_arn: non_empty(self.assume_role),
            env: self.env,
            wait: WaitPolicy {
                poll_interval,
                timeout,
            },
        })
    }
}

/// Image retag request: containers whose image starts with `prefix` are
/// moved to `prefix:tag`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageOverride {
    pub prefix: String,
    pub tag: String,
}

impl ImageOverride {
    pub fn new(prefix: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            tag: tag.into(),
        }
    }

    /// The image reference written into matching containers.
    pub fn reference(&self) -> String {
        format!("{}:{}", self.prefix, self.tag)
    }

    pub fn matches(&self, image: &str) -> bool {
        !self.prefix.is_empty() && image.starts_with(&self.prefix)
    }
}

/// How long and how often to poll for convergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub poll_interval: Duration,
    /// `None` waits until converged or cancelled.
    pub timeout: Option<Duration>,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: Some(DEFAULT_WAIT_TIMEOUT),
        }
    }
}

/// Fully resolved settings for one deploy run.
#[derive(Debug, Clone, PartialEq)]
pub struct DeployConfig {
    pub service: String,
    pub cluster: String,
    /// Task definition family to revise.
    pub family: String,
    pub image: Option<ImageOverride>,
    pub region: String,
    /// `None` keeps the service's current desired count.
    pub desired_count: Option<i32>,
    pub nowait: bool,
    pub profile: Option<String>,
    pub role_arn: Option<String>,
    pub env: EnvironmentOverrides,
    pub wait: WaitPolicy,
}

impl DeployConfig {
    /// A new revision is only registered when something in it changes.
    pub fn needs_registration(&self) -> bool {
        self.image.is_some() || !self.env.is_empty()
    }
}

/// Parse `"500ms"`, `"5s"`, `"2m"` or a bare number of seconds.
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim();
    let invalid = || ConfigError::InvalidDuration(s.to_string());

    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().map(Duration::from_millis).map_err(|_| invalid())
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().map(Duration::from_secs).map_err(|_| invalid())
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
            .ok_or_else(invalid)
    } else {
        s.parse::<u64>().map(Duration::from_secs).map_err(|_| invalid())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
