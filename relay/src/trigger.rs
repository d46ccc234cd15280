//! Trigger context derived from the inbound webhook payload

use serde::{Deserialize, Serialize};

use crate::errors::RelayError;

/// Inbound webhook payload, push or pull-request shaped. Only the fields
/// the relay reads are modeled.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    /// Commit SHA after the push
    pub after: Option<String>,

    /// Push ref, e.g. `refs/heads/feature/foo`
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,

    /// Present on pull-request events
    pub pull_request: Option<PullRequest>,

    /// Repository block
    pub repository: Option<Repository>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub head: PullRequestHead,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestHead {
    #[serde(rename = "ref")]
    pub git_ref: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub name: String,
    pub owner: RepositoryOwner,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryOwner {
    pub login: String,
}

/// Target environment for a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Preview,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Preview => "preview",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable facts about the triggering event, derived once at startup and
/// passed by reference into the reporter and the orchestrator.
#[derive(Debug, Clone)]
pub struct TriggerContext {
    /// Full commit SHA of the push
    pub sha: String,

    /// Branch being deployed
    pub branch: String,

    /// Target environment
    pub environment: Environment,

    /// Repository owner login
    pub owner: String,

    /// Repository name
    pub repo: String,
}

impl TriggerContext {
    /// Derive the context from the webhook payload. `fallback_repository`
    /// is the `owner/name` pair from the environment, used when the payload
    /// carries no repository block.
    pub fn derive(
        payload: &WebhookPayload,
        fallback_repository: Option<&str>,
        trunk_branch: &str,
    ) -> Result<Self, RelayError> {
        let sha = payload
            .after
            .clone()
            .ok_or_else(|| RelayError::ConfigError("payload has no `after` commit".to_string()))?;

        let branch = derive_branch(payload)?;
        let environment = derive_environment(&branch, trunk_branch);
        let (owner, repo) = derive_repository(payload, fallback_repository)?;

        Ok(Self {
            sha,
            branch,
            environment,
            owner,
            repo,
        })
    }

    /// Abbreviated commit SHA used in comments. Truncation is by character
    /// so a malformed payload can never slice mid-codepoint.
    pub fn short_sha(&self) -> &str {
        match self.sha.char_indices().nth(7) {
            Some((end, _)) => &self.sha[..end],
            None => &self.sha,
        }
    }
}

/// Branch name: the pull-request head ref verbatim, or the push ref with
/// the leading `refs/<kind>/` stripped, remaining segments joined with `-`
/// and lower-cased.
fn derive_branch(payload: &WebhookPayload) -> Result<String, RelayError> {
    if let Some(pull_request) = &payload.pull_request {
        return Ok(pull_request.head.git_ref.clone());
    }

    let git_ref = payload
        .git_ref
        .as_deref()
        .ok_or_else(|| RelayError::ConfigError("payload has no `ref`".to_string()))?;

    // The first two segments are not the branch
    let branch = git_ref
        .split('/')
        .skip(2)
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase();

    if branch.is_empty() {
        return Err(RelayError::ConfigError(format!(
            "cannot derive a branch from ref `{}`",
            git_ref
        )));
    }

    Ok(branch)
}

fn derive_environment(branch: &str, trunk_branch: &str) -> Environment {
    if branch == trunk_branch {
        Environment::Production
    } else {
        Environment::Preview
    }
}

fn derive_repository(
    payload: &WebhookPayload,
    fallback_repository: Option<&str>,
) -> Result<(String, String), RelayError> {
    if let Some(repository) = &payload.repository {
        return Ok((repository.owner.login.clone(), repository.name.clone()));
    }

    if let Some(pair) = fallback_repository {
        if let Some((owner, repo)) = pair.split_once('/') {
            return Ok((owner.to_string(), repo.to_string()));
        }
    }

    Err(RelayError::ConfigError(
        "cannot determine repository owner and name".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_payload(git_ref: &str) -> WebhookPayload {
        WebhookPayload {
            after: Some("1234567890abcdef1234567890abcdef12345678".to_string()),
            git_ref: Some(git_ref.to_string()),
            pull_request: None,
            repository: None,
        }
    }

    #[test]
    fn test_branch_from_push_ref() {
        let payload = push_payload("refs/heads/feature/foo-bar");
        let ctx = TriggerContext::derive(&payload, Some("acme/widgets"), "master").unwrap();
        assert_eq!(ctx.branch, "feature-foo-bar");
    }

    #[test]
    fn test_branch_from_push_ref_is_lowercased() {
        let payload = push_payload("refs/heads/Feature/FOO");
        let ctx = TriggerContext::derive(&payload, Some("acme/widgets"), "master").unwrap();
        assert_eq!(ctx.branch, "feature-foo");
    }

    #[test]
    fn test_branch_from_pull_request_is_verbatim() {
        let mut payload = push_payload("refs/pull/1/merge");
        payload.pull_request = Some(PullRequest {
            head: PullRequestHead {
                git_ref: "fix/1".to_string(),
            },
        });
        let ctx = TriggerContext::derive(&payload, Some("acme/widgets"), "master").unwrap();
        // The pull-request path bypasses ref-splitting and lower-casing
        assert_eq!(ctx.branch, "fix/1");
    }

    #[test]
    fn test_environment_from_branch() {
        let payload = push_payload("refs/heads/master");
        let ctx = TriggerContext::derive(&payload, Some("acme/widgets"), "master").unwrap();
        assert_eq!(ctx.environment, Environment::Production);

        let payload = push_payload("refs/heads/feature/foo");
        let ctx = TriggerContext::derive(&payload, Some("acme/widgets"), "master").unwrap();
        assert_eq!(ctx.environment, Environment::Preview);
    }

    #[test]
    fn test_sha_comes_from_after() {
        let payload = push_payload("refs/heads/master");
        let ctx = TriggerContext::derive(&payload, Some("acme/widgets"), "master").unwrap();
        assert_eq!(ctx.sha, "1234567890abcdef1234567890abcdef12345678");
        assert_eq!(ctx.short_sha(), "1234567");
    }

    #[test]
    fn test_short_sha_tolerates_malformed_after_values() {
        let mut payload = push_payload("refs/heads/master");
        payload.after = Some("déjà-vu-not-a-sha".to_string());
        let ctx = TriggerContext::derive(&payload, Some("acme/widgets"), "master").unwrap();
        assert_eq!(ctx.short_sha(), "déjà-vu");

        payload.after = Some("abc".to_string());
        let ctx = TriggerContext::derive(&payload, Some("acme/widgets"), "master").unwrap();
        assert_eq!(ctx.short_sha(), "abc");
    }

    #[test]
    fn test_repository_from_payload_wins_over_fallback() {
        let mut payload = push_payload("refs/heads/master");
        payload.repository = Some(Repository {
            name: "widgets".to_string(),
            owner: RepositoryOwner {
                login: "acme".to_string(),
            },
        });
        let ctx = TriggerContext::derive(&payload, Some("other/repo"), "master").unwrap();
        assert_eq!(ctx.owner, "acme");
        assert_eq!(ctx.repo, "widgets");
    }

    #[test]
    fn test_missing_after_is_an_error() {
        let mut payload = push_payload("refs/heads/master");
        payload.after = None;
        let result = TriggerContext::derive(&payload, Some("acme/widgets"), "master");
        assert!(matches!(result, Err(RelayError::ConfigError(_))));
    }

    #[test]
    fn test_payload_deserializes_from_event_json() {
        let raw = r#"{
            "after": "abc123",
            "ref": "refs/heads/main",
            "repository": {"name": "widgets", "owner": {"login": "acme"}}
        }"#;
        let payload: WebhookPayload = serde_json::from_str(raw).unwrap();
        assert_eq!(payload.after.as_deref(), Some("abc123"));
        assert_eq!(payload.git_ref.as_deref(), Some("refs/heads/main"));
    }
}
