//! Settings and project manifest loading

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::RelayError;
use crate::logs::LogLevel;

/// Relay settings, assembled from the environment at startup
#[derive(Debug, Clone)]
pub struct Settings {
    /// Token for the code-hosting API
    pub github_token: String,

    /// Token for the deployment platform API
    pub platform_token: String,

    /// Working path of the checked-out repository
    pub workspace: PathBuf,

    /// Path to the webhook payload JSON file
    pub event_path: PathBuf,

    /// `owner/name` fallback when the payload carries no repository block
    pub repository: Option<String>,

    /// URL of this run's own logs, linked from failure comments
    pub run_url: Option<String>,

    /// Primary integration branch, deployed to `production`
    pub trunk_branch: String,

    /// Force a redeploy even when the platform considers it unchanged
    pub force: bool,

    /// Verbose request logging
    pub debug: bool,

    /// Log level
    pub log_level: LogLevel,

    /// Deployment platform endpoints
    pub platform: PlatformSettings,

    /// Project manifest of the repository being deployed
    pub manifest: ProjectManifest,
}

impl Settings {
    /// Assemble settings from the process environment and the workspace
    /// manifest. `GITHUB_TOKEN`, `PLATFORM_TOKEN` and `GITHUB_EVENT_PATH`
    /// are required; everything else has a default.
    pub async fn from_env() -> Result<Self, RelayError> {
        let github_token = require_env("GITHUB_TOKEN")?;
        let platform_token = require_env("PLATFORM_TOKEN")?;
        let event_path = PathBuf::from(require_env("GITHUB_EVENT_PATH")?);

        let workspace = env::var("GITHUB_WORKSPACE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        let repository = env::var("GITHUB_REPOSITORY").ok();

        let run_url = match (env::var("GITHUB_RUN_ID").ok(), &repository) {
            (Some(run_id), Some(repo)) => {
                Some(format!("https://github.com/{}/actions/runs/{}", repo, run_id))
            }
            _ => None,
        };

        let trunk_branch =
            env::var("TRUNK_BRANCH").unwrap_or_else(|_| "master".to_string());

        let debug = env::var("DEBUG")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let log_level = match env::var("LOG_LEVEL") {
            Ok(level) => level
                .parse()
                .map_err(RelayError::ConfigError)?,
            Err(_) if debug => LogLevel::Debug,
            Err(_) => LogLevel::Info,
        };

        let manifest = ProjectManifest::load(&workspace).await?;

        Ok(Self {
            github_token,
            platform_token,
            workspace,
            event_path,
            repository,
            run_url,
            trunk_branch,
            force: true,
            debug,
            log_level,
            platform: PlatformSettings::default(),
            manifest,
        })
    }
}

fn require_env(key: &str) -> Result<String, RelayError> {
    env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| RelayError::ConfigError(format!("{} is not set", key)))
}

/// Deployment platform endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformSettings {
    /// Base URL for the platform API
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Domain that preview aliases live under
    #[serde(default = "default_alias_domain")]
    pub alias_domain: String,

    /// Base URL of the platform dashboard
    #[serde(default = "default_dashboard_base")]
    pub dashboard_base: String,

    /// Base URL for the code-hosting API
    #[serde(default = "default_github_api_base")]
    pub github_api_base: String,

    /// Interval between deployment state polls, in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_api_base() -> String {
    "https://api.zeit.co".to_string()
}

fn default_alias_domain() -> String {
    "now.sh".to_string()
}

fn default_dashboard_base() -> String {
    "https://zeit.co".to_string()
}

fn default_github_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_poll_interval() -> u64 {
    3
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            alias_domain: default_alias_domain(),
            dashboard_base: default_dashboard_base(),
            github_api_base: default_github_api_base(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

/// Project manifest of the repository being deployed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectManifest {
    /// Project name
    pub name: String,

    /// Project version
    #[serde(default)]
    pub version: Option<String>,

    /// Explicit platform scope; falls back to the authenticated user
    #[serde(default)]
    pub scope: Option<String>,
}

/// Manifest files checked in order; the platform manifest wins over the
/// package manifest when both exist.
const MANIFEST_CANDIDATES: &[&str] = &["now.json", "package.json"];

impl ProjectManifest {
    /// Read the project manifest from the workspace
    pub async fn load(workspace: &Path) -> Result<Self, RelayError> {
        for candidate in MANIFEST_CANDIDATES {
            let path = workspace.join(candidate);
            if path.exists() {
                let raw = tokio::fs::read(&path).await?;
                let manifest: ProjectManifest = serde_json::from_slice(&raw)?;
                return Ok(manifest);
            }
        }

        Err(RelayError::ConfigError(format!(
            "no project manifest found in {} (looked for {})",
            workspace.display(),
            MANIFEST_CANDIDATES.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_parses_optional_fields() {
        let manifest: ProjectManifest =
            serde_json::from_str(r#"{"name": "my-app"}"#).unwrap();
        assert_eq!(manifest.name, "my-app");
        assert!(manifest.version.is_none());
        assert!(manifest.scope.is_none());

        let manifest: ProjectManifest = serde_json::from_str(
            r#"{"name": "my-app", "version": "1.2.3", "scope": "acme"}"#,
        )
        .unwrap();
        assert_eq!(manifest.version.as_deref(), Some("1.2.3"));
        assert_eq!(manifest.scope.as_deref(), Some("acme"));
    }

    #[test]
    fn test_platform_settings_defaults() {
        let settings = PlatformSettings::default();
        assert_eq!(settings.api_base, "https://api.zeit.co");
        assert_eq!(settings.alias_domain, "now.sh");
        assert_eq!(settings.github_api_base, "https://api.github.com");
    }
}
