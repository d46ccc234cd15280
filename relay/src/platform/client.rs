//! Deployment platform API client and lifecycle event stream

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::deploy::config::DeployConfig;
use crate::errors::RelayError;
use crate::http::client::HttpClient;
use crate::models::deployment::LifecycleEvent;
use crate::utils::{calc_exp_backoff, CooldownOptions};

/// Consecutive poll failures tolerated before the stream gives up
const MAX_FAILED_POLLS: u32 = 5;

/// Channel capacity for the lifecycle event stream
const EVENT_BUFFER: usize = 16;

#[derive(Debug, Clone, Deserialize)]
struct CurrentUserResponse {
    user: CurrentUser,
}

#[derive(Debug, Clone, Deserialize)]
struct CurrentUser {
    username: String,
}

/// Deployment resource as the platform reports it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformDeployment {
    #[serde(alias = "uid")]
    pub id: String,

    #[serde(rename = "readyState", default)]
    pub ready_state: Option<String>,

    /// Host the deployment is reachable at, without scheme
    #[serde(default)]
    pub url: Option<String>,
}

/// Client for the hosted deployment platform
#[derive(Debug, Clone)]
pub struct PlatformClient {
    http: HttpClient,
    poll_interval: Duration,
}

impl PlatformClient {
    pub fn new(settings: &Settings) -> Result<Self, RelayError> {
        let http = HttpClient::new(
            &settings.platform.api_base,
            &settings.platform_token,
            settings.debug,
        )?;
        Ok(Self {
            http,
            poll_interval: Duration::from_secs(settings.platform.poll_interval_secs),
        })
    }

    /// Username of the authenticated platform user
    pub async fn current_user(&self) -> Result<String, RelayError> {
        let response: CurrentUserResponse = self.http.get("/www/user").await?;
        Ok(response.user.username)
    }

    /// Submit a deployment and return its lifecycle event stream. The
    /// stream is finite, single-consumer and ends on `ready`, `error`, or
    /// after the poll retry budget is exhausted.
    pub async fn submit_deployment(
        &self,
        config: &DeployConfig,
    ) -> Result<mpsc::Receiver<LifecycleEvent>, RelayError> {
        // The working tree being deployed must exist before anything is
        // submitted
        if !config.client.path.exists() {
            return Err(RelayError::ConfigError(format!(
                "deploy path {} does not exist",
                config.client.path.display()
            )));
        }

        let mut path = "/v13/deployments".to_string();
        if config.client.force {
            path.push_str("?forceNew=1");
        }

        let body = json!({
            "name": config.project,
            "env": config.env,
            "build": { "env": config.env },
        });

        info!(
            "Deploying {} from {}",
            config.project,
            config.client.path.display()
        );
        let created: PlatformDeployment = self.http.post(&path, &body).await?;
        debug!("Deployment {} submitted", created.id);

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let poller = Poller {
            http: self.http.clone(),
            deployment_id: created.id,
            poll_interval: self.poll_interval,
            cooldown: CooldownOptions::default(),
            debug: config.client.debug,
        };
        tokio::spawn(poller.run(tx));

        Ok(rx)
    }
}

/// Watches one deployment and translates its state into lifecycle events
struct Poller {
    http: HttpClient,
    deployment_id: String,
    poll_interval: Duration,
    cooldown: CooldownOptions,
    debug: bool,
}

impl Poller {
    async fn run(self, tx: mpsc::Sender<LifecycleEvent>) {
        if tx.send(LifecycleEvent::Created).await.is_err() {
            return;
        }

        let path = format!("/v13/deployments/{}", self.deployment_id);
        let mut failed_polls = 0u32;
        let mut building_seen = false;
        let mut delay = self.poll_interval;

        loop {
            tokio::time::sleep(delay).await;

            match self.http.get::<PlatformDeployment>(&path).await {
                Ok(deployment) => {
                    failed_polls = 0;
                    delay = self.poll_interval;

                    let state = deployment.ready_state.as_deref().unwrap_or("");
                    if self.debug {
                        debug!("Deployment {} is {}", self.deployment_id, state);
                    }

                    match state {
                        "BUILDING" | "DEPLOYING" if !building_seen => {
                            building_seen = true;
                            if tx.send(LifecycleEvent::BuildStateChanged).await.is_err() {
                                return;
                            }
                        }
                        "READY" => {
                            let payload =
                                serde_json::to_value(&deployment).unwrap_or_default();
                            let _ = tx.send(LifecycleEvent::Ready(payload)).await;
                            return;
                        }
                        "ERROR" | "CANCELED" => {
                            let payload =
                                serde_json::to_value(&deployment).unwrap_or_default();
                            let _ = tx.send(LifecycleEvent::Error(payload)).await;
                            return;
                        }
                        _ => {}
                    }
                }
                Err(e) => {
                    failed_polls += 1;
                    warn!(
                        "Poll {}/{} for deployment {} failed: {}",
                        failed_polls, MAX_FAILED_POLLS, self.deployment_id, e
                    );

                    if failed_polls >= MAX_FAILED_POLLS {
                        let payload = json!({
                            "message": format!(
                                "lost contact with deployment {}: {}",
                                self.deployment_id, e
                            ),
                        });
                        let _ = tx.send(LifecycleEvent::Error(payload)).await;
                        return;
                    }

                    let payload = json!({ "message": e.to_string() });
                    if tx.send(LifecycleEvent::Warning(payload)).await.is_err() {
                        return;
                    }
                    delay = calc_exp_backoff(&self.cooldown, failed_polls);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PlatformSettings, ProjectManifest};
    use crate::deploy::config::DeployConfig;
    use crate::logs::LogLevel;
    use crate::trigger::{Environment, TriggerContext};
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_submit_rejects_missing_deploy_path() {
        let settings = Settings {
            github_token: "gh-token".to_string(),
            platform_token: "platform-token".to_string(),
            workspace: PathBuf::from("/definitely/not/here"),
            event_path: PathBuf::from("/definitely/not/here/event.json"),
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
        let ctx = TriggerContext {
            sha: "1234567890abcdef".to_string(),
            branch: "feature-foo".to_string(),
            environment: Environment::Preview,
            owner: "acme".to_string(),
            repo: "widgets".to_string(),
        };
        let config = DeployConfig::assemble(&settings, &ctx, "jane");
        let client = PlatformClient::new(&settings).unwrap();

        // Fails on the path check, before any request is made
        let result = client.submit_deployment(&config).await;
        assert!(matches!(result, Err(RelayError::ConfigError(_))));
    }

    #[test]
    fn test_platform_deployment_accepts_uid_alias() {
        let deployment: PlatformDeployment = serde_json::from_str(
            r#"{"uid": "dpl_123", "readyState": "BUILDING", "url": "my-app.now.sh"}"#,
        )
        .unwrap();
        assert_eq!(deployment.id, "dpl_123");
        assert_eq!(deployment.ready_state.as_deref(), Some("BUILDING"));
        assert_eq!(deployment.url.as_deref(), Some("my-app.now.sh"));
    }
}
