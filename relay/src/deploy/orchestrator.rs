//! Drives one deployment from trigger to terminal state

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::deploy::config::DeployConfig;
use crate::errors::RelayError;
use crate::http::github::StatusReporter;
use crate::models::deployment::{DeploymentRecord, DeploymentState, LifecycleEvent};
use crate::platform::client::PlatformClient;
use crate::trigger::TriggerContext;

/// Run one deployment end to end: resolve the configuration, open a
/// deployment record, submit the build, and mirror every lifecycle event
/// back through the reporter. Returns the platform's result payload on
/// success; a build failure is reported first and then surfaced as
/// `DeploymentFailed`.
pub async fn run<R: StatusReporter + ?Sized>(
    reporter: &R,
    platform: &PlatformClient,
    settings: &Settings,
    ctx: &TriggerContext,
) -> Result<Value, RelayError> {
    let config = DeployConfig::resolve(settings, ctx, platform).await?;
    info!(
        project = %config.project,
        environment = %ctx.environment,
        branch = %ctx.branch,
        "Resolved deployment configuration"
    );

    let deployment_id = reporter.create_deployment().await?;
    let mut record = DeploymentRecord::new(deployment_id, Some(config.alias.clone()));
    advance(reporter, &mut record, DeploymentState::Pending).await?;

    let events = platform.submit_deployment(&config).await?;
    drive(
        reporter,
        ctx,
        &config,
        settings.run_url.as_deref(),
        &mut record,
        events,
    )
    .await
}

/// Consume the lifecycle stream in arrival order, posting one status
/// transition per event. Transitions are never reordered or batched.
pub async fn drive<R: StatusReporter + ?Sized>(
    reporter: &R,
    ctx: &TriggerContext,
    config: &DeployConfig,
    run_url: Option<&str>,
    record: &mut DeploymentRecord,
    mut events: mpsc::Receiver<LifecycleEvent>,
) -> Result<Value, RelayError> {
    let mut result = None;
    let mut failure = None;

    while let Some(event) = events.recv().await {
        match event {
            LifecycleEvent::Created => {
                advance(reporter, record, DeploymentState::Queued).await?;
            }
            LifecycleEvent::BuildStateChanged => {
                advance(reporter, record, DeploymentState::InProgress).await?;
            }
            LifecycleEvent::Ready(payload) => {
                advance(reporter, record, DeploymentState::Success).await?;
                reporter
                    .create_comment(&success_comment(ctx, config))
                    .await?;
                result = Some(payload);
                break;
            }
            LifecycleEvent::Warning(payload) => {
                warn!(payload = %payload, "Deployment warning");
            }
            LifecycleEvent::Error(payload) => {
                advance(reporter, record, DeploymentState::Failure).await?;
                reporter
                    .create_comment(&failure_comment(ctx, config, run_url, &payload))
                    .await?;
                error!(payload = %payload, "Deployment errored");
                failure = Some(payload);
                break;
            }
            LifecycleEvent::Unknown => {
                debug!("Ignoring unknown lifecycle event");
            }
        }
    }

    if let Some(payload) = failure {
        return Err(RelayError::DeploymentFailed(payload));
    }

    match result {
        Some(payload) => Ok(payload),
        // Stream ended with neither ready nor error; the deployment may
        // still be running remotely, so the run must not pass silently
        None => Err(RelayError::IncompleteRun),
    }
}

/// Move the record forward and post the transition
pub async fn advance<R: StatusReporter + ?Sized>(
    reporter: &R,
    record: &mut DeploymentRecord,
    state: DeploymentState,
) -> Result<(), RelayError> {
    record.transition(state)?;
    reporter
        .create_deployment_status(record.id, state.as_str(), record.environment_url.as_deref())
        .await?;
    info!(deployment_id = record.id, state = %state, "Posted deployment status");
    Ok(())
}

fn success_comment(ctx: &TriggerContext, config: &DeployConfig) -> String {
    format!(
        "🎈 `{}` was deployed for the project [{}]({}) and is available at\n🌍 <{}>.",
        ctx.short_sha(),
        config.project,
        config.project_url,
        config.alias
    )
}

fn failure_comment(
    ctx: &TriggerContext,
    config: &DeployConfig,
    run_url: Option<&str>,
    payload: &Value,
) -> String {
    let run_url = run_url.unwrap_or("#");
    let deployment_url = payload
        .get("url")
        .and_then(|v| v.as_str())
        .map(|host| format!("https://{}", host))
        .unwrap_or_else(|| config.project_url.clone());

    format!(
        "❌ `{}` failed to deploy for the project [{}]({}).\n\n\
         Check the [run logs]({}) and the [deployment logs]({}) to see what might have happened.",
        ctx.short_sha(),
        config.project,
        config.project_url,
        run_url,
        deployment_url
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PlatformSettings, ProjectManifest};
    use crate::logs::LogLevel;
    use crate::trigger::Environment;
    use serde_json::json;
    use std::path::PathBuf;

    fn test_context() -> TriggerContext {
        TriggerContext {
            sha: "1234567890abcdef".to_string(),
            branch: "feature-foo".to_string(),
            environment: Environment::Preview,
            owner: "acme".to_string(),
            repo: "widgets".to_string(),
        }
    }

    fn test_config() -> DeployConfig {
        let settings = Settings {
            github_token: "gh".to_string(),
            platform_token: "pt".to_string(),
            workspace: PathBuf::from("/work"),
            event_path: PathBuf::from("/work/event.json"),
            repository: Some("acme/widgets".to_string()),
            run_url: None,
            trunk_branch: "master".to_string(),
            force: true,
            debug: false,
            log_level: LogLevel::Info,
            platform: PlatformSettings::default(),
            manifest: ProjectManifest {
                name: "widgets".to_string(),
                version: None,
                scope: Some("acme".to_string()),
            },
        };
        DeployConfig::assemble(&settings, &test_context(), "jane")
    }

    #[test]
    fn test_success_comment_names_project_and_alias() {
        let comment = success_comment(&test_context(), &test_config());
        assert!(comment.contains("`1234567`"));
        assert!(comment.contains("[widgets](https://zeit.co/acme/widgets)"));
        assert!(comment.contains("<https://widgets-git-feature-foo.acme.now.sh>"));
    }

    #[test]
    fn test_failure_comment_links_both_logs() {
        let payload = json!({ "url": "widgets-abc123.now.sh" });
        let comment = failure_comment(
            &test_context(),
            &test_config(),
            Some("https://github.com/acme/widgets/actions/runs/7"),
            &payload,
        );
        assert!(comment.contains("[run logs](https://github.com/acme/widgets/actions/runs/7)"));
        assert!(comment.contains("[deployment logs](https://widgets-abc123.now.sh)"));
    }

    #[test]
    fn test_failure_comment_without_run_or_deployment_url() {
        let comment =
            failure_comment(&test_context(), &test_config(), None, &json!({}));
        assert!(comment.contains("[run logs](#)"));
        assert!(comment.contains("[deployment logs](https://zeit.co/acme/widgets)"));
    }
}
