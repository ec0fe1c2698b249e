use std::fmt::Write as _;
use std::process::ExitCode;

use ecsd_aws::{EcsOrchestrator, SessionConfig};
use ecsd_core::{DeployConfig, OrchestrationApi};
use ecsd_rollout::{DeployReport, deploy};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::OutputFormat;

/// Run a deploy against ECS and print the report.
///
/// Stage failures are logged on one line and turned into a failing exit
/// code. Only output errors propagate.
pub async fn run(config: &DeployConfig, format: OutputFormat) -> anyhow::Result<ExitCode> {
    let session = SessionConfig::from_deploy(config);
    info!(region = %session.region, "connecting to ECS");
    let api = EcsOrchestrator::connect(&session).await;
    if execute(&api, config, format).await? {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// Returns whether the deploy succeeded.
async fn execute<A: OrchestrationApi + ?Sized>(
    api: &A,
    config: &DeployConfig,
    format: OutputFormat,
) -> anyhow::Result<bool> {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling wait");
            let _ = cancel_tx.send(true);
        }
    });

    let result = deploy(api, config, cancel_rx).await;
    interrupt.abort();

    match result {
        Ok(report) => {
            println!("{}", render(&report, format)?);
            Ok(true)
        }
        Err(e) => {
            error!(stage = %e.stage(), error = %e, "deploy failed");
            if let Some(arn) = e.orphaned_revision() {
                warn!(%arn, "registered revision is not in use by the service");
            }
            Ok(false)
        }
    }
}

fn render(report: &DeployReport, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        OutputFormat::Text => Ok(render_text(report)),
    }
}

fn render_text(report: &DeployReport) -> String {
    let mut out = format!("✓ Updated {}/{}", report.cluster, report.service);

    if let Some(registered) = &report.registered {
        let _ = write!(
            out,
            "\n  Revision:  {}:{} ({})",
            registered.family, registered.revision, registered.arn
        );
        for change in registered.changes.retagged() {
            if let Some((from, to)) = &change.image {
                let _ = write!(out, "\n  Image:     {} {from} → {to}", change.container);
            }
        }
        let env_changes = registered
            .changes
            .containers
            .iter()
            .filter(|c| !c.env.is_empty())
            .count();
        if env_changes > 0 {
            let _ = write!(out, "\n  Env:       {env_changes} container(s) changed");
        }
    }

    match report.update.desired_count {
        Some(count) => {
            let _ = write!(out, "\n  Count:     {count}");
        }
        None => out.push_str("\n  Count:     unchanged"),
    }

    match &report.wait {
        Some(wait) => {
            let last = wait
                .state
                .last()
                .map(|c| c.to_string())
                .unwrap_or_default();
            let _ = write!(
                out,
                "\n  Converged: {} polls, {:.1}s ({last})",
                wait.state.polls,
                wait.elapsed_ms as f64 / 1000.0
            );
        }
        None => out.push_str("\n  Converged: not waited"),
    }
    out
}
