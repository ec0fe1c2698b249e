//! Session setup — region, named profile, and role assumption.

use aws_config::BehaviorVersion;
use aws_config::sts::AssumeRoleProvider;
use aws_sdk_ecs::config::Region;
use ecsd_core::DeployConfig;
use tracing::info;

/// Session name recorded by STS when assuming a role.
pub const SESSION_NAME: &str = "ecs-deploy";

/// Inputs for building an authenticated ECS client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub region: String,
    /// Shared-config profile; otherwise the default credential chain.
    pub profile: Option<String>,
    /// Role to assume on top of the base credentials.
    pub role_arn: Option<String>,
}

impl SessionConfig {
    pub fn from_deploy(config: &DeployConfig) -> Self {
        Self {
            region: config.region.clone(),
            profile: config.profile.clone(),
            role_arn: config.role_arn.clone(),
        }
    }
}

/// Build an ECS client for the session.
///
/// Credentials are resolved lazily by the SDK, so a bad profile or role only
/// surfaces on the first remote call.
pub async fn ecs_client(session: &SessionConfig) -> aws_sdk_ecs::Client {
    let mut loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(session.region.clone()));
    if let Some(profile) = &session.profile {
        info!(%profile, "adding profile");
        loader = loader.profile_name(profile);
    }
    let sdk_config = loader.load().await;

    let mut builder = aws_sdk_ecs::config::Builder::from(&sdk_config);
    if let Some(role_arn) = &session.role_arn {
        info!(%role_arn, "assuming role");
        let provider = AssumeRoleProvider::builder(role_arn.clone())
            .session_name(SESSION_NAME)
            .configure(&sdk_config)
            .build()
            .await;
        builder = builder.credentials_provider(provider);
    }

    aws_sdk_ecs::Client::from_conf(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecsd_core::DeploySettings;

    #[test]
    fn session_from_deploy_config() {
        let config = DeploySettings {
            service: Some("api".to_string()),
            region: Some("eu-central-1".to_string()),
            profile: Some("deploy".to_string()),
            assume_role: Some(String::new()),
            ..Default::default()
        }
        .resolve()
        .unwrap();

        let session = SessionConfig::from_deploy(&config);
        assert_eq!(session.region, "eu-central-1");
        assert_eq!(session.profile.as_deref(), Some("deploy"));
        // Empty role means no assumption.
        assert_eq!(session.role_arn, None);
    }
}
