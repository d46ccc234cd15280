//! Code-hosting API client: commit comments and deployment statuses

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::errors::RelayError;
use crate::http::client::HttpClient;
use crate::models::deployment::DeploymentState;
use crate::trigger::TriggerContext;

/// Accept header for the deployment status API; `in_progress`/`queued`
/// states and `environment_url` sit behind these preview media types
const DEPLOYMENT_STATUS_ACCEPT: &str =
    "application/vnd.github.flash-preview+json, application/vnd.github.ant-man-preview+json";

/// A commit comment resource
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommitComment {
    #[serde(default)]
    pub id: u64,

    #[serde(default)]
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct DeploymentResource {
    id: u64,
}

/// Outbound channel to the code-hosting platform. The orchestrator writes
/// every status transition and comment through this seam.
#[async_trait]
pub trait StatusReporter: Send + Sync {
    /// Post a comment on the triggering commit
    async fn create_comment(&self, body: &str) -> Result<CommitComment, RelayError>;

    /// Create a deployment for the triggering commit and environment,
    /// returning its id
    async fn create_deployment(&self) -> Result<u64, RelayError>;

    /// Post a status transition for a deployment. `state` must be one of
    /// the six valid deployment states; anything else fails before any
    /// network call is made.
    async fn create_deployment_status(
        &self,
        deployment_id: u64,
        state: &str,
        environment_url: Option<&str>,
    ) -> Result<(), RelayError>;
}

/// GitHub-backed reporter
pub struct GithubReporter {
    http: HttpClient,
    ctx: TriggerContext,
}

impl GithubReporter {
    pub fn new(http: HttpClient, ctx: TriggerContext) -> Self {
        Self { http, ctx }
    }

    /// Identity facts about the triggering event
    pub fn context(&self) -> &TriggerContext {
        &self.ctx
    }
}

#[async_trait]
impl StatusReporter for GithubReporter {
    async fn create_comment(&self, body: &str) -> Result<CommitComment, RelayError> {
        let path = format!(
            "/repos/{}/{}/commits/{}/comments",
            self.ctx.owner, self.ctx.repo, self.ctx.sha
        );
        let comment: CommitComment = self.http.post(&path, &json!({ "body": body })).await?;
        Ok(comment)
    }

    async fn create_deployment(&self) -> Result<u64, RelayError> {
        let path = format!("/repos/{}/{}/deployments", self.ctx.owner, self.ctx.repo);
        let body = json!({
            "ref": self.ctx.sha,
            "environment": self.ctx.environment.as_str(),
            "required_contexts": [],
            "auto_merge": false,
        });
        let deployment: DeploymentResource = self.http.post(&path, &body).await?;
        Ok(deployment.id)
    }

    async fn create_deployment_status(
        &self,
        deployment_id: u64,
        state: &str,
        environment_url: Option<&str>,
    ) -> Result<(), RelayError> {
        // Membership check happens before the request is built
        let state: DeploymentState = state.parse()?;

        let path = format!(
            "/repos/{}/{}/deployments/{}/statuses",
            self.ctx.owner, self.ctx.repo, deployment_id
        );
        let body = json!({
            "state": state.as_str(),
            "environment_url": environment_url,
        });
        let _: serde_json::Value = self
            .http
            .post_with_accept(&path, DEPLOYMENT_STATUS_ACCEPT, &body)
            .await?;
        Ok(())
    }
}
