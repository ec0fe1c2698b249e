use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use ecsd_core::{DeploySettings, EnvAssignment, WaitSettings};

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "ecs-deploy",
    about = "Roll a new image or environment out to an ECS service",
    version
)]
struct Cli {
    /// Name of the service to update (required unless set in --config)
    #[arg(short, long)]
    service: Option<String>,

    /// Image prefix to retag, e.g. 123.dkr.ecr.us-east-1.amazonaws.com/api.
    /// Containers whose image starts with it get `<image>:<tag>`.
    #[arg(short, long, requires = "tag")]
    image: Option<String>,

    /// Tag to deploy
    #[arg(short, long)]
    tag: Option<String>,

    /// Cluster the service runs in [default: default]
    #[arg(short, long)]
    cluster: Option<String>,

    /// Task definition family [default: the service name]
    #[arg(long)]
    task: Option<String>,

    /// AWS region [default: us-east-1]
    #[arg(short, long, env = "AWS_DEFAULT_REGION")]
    region: Option<String>,

    /// Desired count; negative leaves it unchanged
    #[arg(long, allow_negative_numbers = true)]
    count: Option<i64>,

    /// Return once the service update is accepted
    #[arg(long)]
    nowait: bool,

    /// Shared-config profile to load credentials from
    #[arg(long)]
    profile: Option<String>,

    /// Role ARN to assume before calling ECS
    #[arg(long, value_name = "ROLE_ARN")]
    assume: Option<String>,

    /// Environment variable to set in every container (repeatable)
    #[arg(short, long = "env", value_name = "KEY=VALUE")]
    env: Vec<EnvAssignment>,

    /// TOML file with deploy settings; flags take precedence
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Give up waiting after this long (e.g. 90s, 15m); 0 waits forever
    #[arg(long)]
    timeout: Option<String>,

    /// Time between deployment polls (e.g. 5s)
    #[arg(long)]
    poll_interval: Option<String>,

    /// Report format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

impl Cli {
    /// Settings given on the command line, to be layered over the file.
    fn settings(&self) -> DeploySettings {
        DeploySettings {
            service: self.service.clone(),
            cluster: self.cluster.clone(),
            task: self.task.clone(),
            image: self.image.clone(),
            tag: self.tag.clone(),
            region: self.region.clone(),
            count: self.count,
            nowait: self.nowait.then_some(true),
            profile: self.profile.clone(),
            assume_role: self.assume.clone(),
            env: self
                .env
                .iter()
                .map(|a| (a.name.clone(), a.value.clone()))
                .collect(),
            wait: WaitSettings {
                poll_interval: self.poll_interval.clone(),
                timeout: self.timeout.clone(),
            },
        }
    }

    /// File settings (if any) with the command line layered on top.
    fn load_settings(&self) -> anyhow::Result<DeploySettings> {
        let base = match &self.config {
            Some(path) => DeploySettings::from_file(path)?,
            None => DeploySettings::default(),
        };
        Ok(base.overlay(self.settings()))
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = cli.load_settings()?.resolve()?;
    commands::deploy::run(&config, cli.format).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["ecs-deploy"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn minimal_flags_resolve_to_defaults() {
        let cli = parse(&["--service", "api", "--region", "us-east-1"]);
        let config = cli.settings().resolve().unwrap();
        assert_eq!(config.service, "api");
        assert_eq!(config.family, "api");
        assert_eq!(config.cluster, "default");
        assert_eq!(config.desired_count, None);
        assert!(!config.nowait);
        assert!(!config.needs_registration());
        assert_eq!(cli.format, OutputFormat::Text);
    }

    #[test]
    fn full_flag_set() {
        let cli = parse(&[
            "--service", "api",
            "--image", "123.dkr.ecr.us-east-1.amazonaws.com/api",
            "--tag", "v2",
            "--cluster", "prod",
            "--task", "api-task",
            "--region", "eu-west-1",
            "--count", "3",
            "--nowait",
            "--profile", "deploy",
            "--assume", "arn:aws:iam::123:role/deployer",
            "-e", "MODE=blue",
            "--env", "DSN=postgres://h/db?x=1",
            "--timeout", "2m",
            "--poll-interval", "500ms",
            "--format", "json",
        ]);
        assert_eq!(cli.format, OutputFormat::Json);

        let config = cli.settings().resolve().unwrap();
        assert_eq!(config.cluster, "prod");
        assert_eq!(config.family, "api-task");
        assert_eq!(config.region, "eu-west-1");
        assert_eq!(config.desired_count, Some(3));
        assert!(config.nowait);
        assert_eq!(config.profile.as_deref(), Some("deploy"));
        assert_eq!(config.role_arn.as_deref(), Some("arn:aws:iam::123:role/deployer"));
        assert_eq!(
            config.image.as_ref().map(|i| i.reference()),
            Some("123.dkr.ecr.us-east-1.amazonaws.com/api:v2".to_string())
        );
        assert_eq!(config.env.get("MODE"), Some("blue"));
        assert_eq!(config.env.get("DSN"), Some("postgres://h/db?x=1"));
        assert_eq!(config.wait.timeout, Some(std::time::Duration::from_secs(120)));
        assert_eq!(config.wait.poll_interval, std::time::Duration::from_millis(500));
    }

    #[test]
    fn negative_count_is_accepted_and_means_unchanged() {
        let cli = parse(&["--service", "api", "--region", "us-east-1", "--count", "-1"]);
        assert_eq!(cli.count, Some(-1));
        assert_eq!(cli.settings().resolve().unwrap().desired_count, None);
    }

    #[test]
    fn image_without_tag_is_rejected() {
        let err = Cli::try_parse_from(["ecs-deploy", "--service", "api", "--image", "repo"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn malformed_env_is_rejected() {
        let err = Cli::try_parse_from(["ecs-deploy", "--service", "api", "--env", "NOEQUALS"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
service = "api"
cluster = "staging"
count = 2

[env]
MODE = "file"
LEVEL = "debug"

[wait]
timeout = "0"
"#
        )
        .unwrap();
        let path = file.path().to_str().unwrap();

        let cli = parse(&[
            "--config", path,
            "--cluster", "prod",
            "--region", "us-east-1",
            "--env", "MODE=flag",
        ]);
        let config = cli.load_settings().unwrap().resolve().unwrap();
        assert_eq!(config.service, "api");
        assert_eq!(config.cluster, "prod");
        assert_eq!(config.desired_count, Some(2));
        assert_eq!(config.env.get("MODE"), Some("flag"));
        assert_eq!(config.env.get("LEVEL"), Some("debug"));
        assert_eq!(config.wait.timeout, None);
    }

    #[test]
    fn missing_service_fails_resolution() {
        let cli = parse(&["--region", "us-east-1"]);
        assert!(cli.settings().resolve().is_err());
    }
}
