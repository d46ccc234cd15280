//! Deployment configuration resolution

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::config::Settings;
use crate::errors::RelayError;
use crate::platform::client::PlatformClient;
use crate::trigger::TriggerContext;

/// Per-submission options for the deployment client. The auth tokens stay
/// in `Settings` and the constructed HTTP clients; they are never copied
/// into the run configuration.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Working path of the project being deployed; submission refuses to
    /// run when it does not exist
    pub path: PathBuf,

    /// Force a redeploy even when nothing changed
    pub force: bool,

    /// Verbose per-request logging in the deployment poller
    pub debug: bool,
}

/// Everything one deployment run needs, built once from the trigger
/// context, the project manifest and the authenticated platform user.
#[derive(Debug, Clone)]
pub struct DeployConfig {
    /// Sanitized project name
    pub project: String,

    /// Dashboard URL of the project
    pub project_url: String,

    /// Authenticated platform user
    pub user: String,

    /// Scope the deployment lands in
    pub scope: String,

    /// Deterministic URL the preview will be reachable at
    pub alias: String,

    /// Client options
    pub client: ClientOptions,

    /// Environment variables forwarded into the remote build
    pub env: BTreeMap<String, String>,
}

impl DeployConfig {
    /// Resolve the full configuration; the only remote call is the
    /// current-user lookup backing the scope fallback.
    pub async fn resolve(
        settings: &Settings,
        ctx: &TriggerContext,
        platform: &PlatformClient,
    ) -> Result<Self, RelayError> {
        let user = platform.current_user().await?;
        Ok(Self::assemble(settings, ctx, &user))
    }

    /// Assemble the configuration from already-known inputs. Pure:
    /// identical inputs produce byte-identical output.
    pub fn assemble(settings: &Settings, ctx: &TriggerContext, user: &str) -> Self {
        let project = sanitize_project_name(&settings.manifest.name);
        let scope = settings
            .manifest
            .scope
            .clone()
            .unwrap_or_else(|| user.to_string());

        let alias = format!(
            "https://{}-git-{}.{}.{}",
            project, ctx.branch, scope, settings.platform.alias_domain
        );
        let project_url = format!(
            "{}/{}/{}",
            settings.platform.dashboard_base, scope, project
        );

        let mut env = BTreeMap::new();
        env.insert("GITHUB_REPO".to_string(), ctx.repo.clone());
        env.insert("GITHUB_OWNER".to_string(), ctx.owner.clone());
        env.insert("GITHUB_BRANCH".to_string(), ctx.branch.clone());
        env.insert("PREVIEW_ALIAS".to_string(), alias.clone());

        Self {
            project,
            project_url,
            user: user.to_string(),
            scope,
            alias,
            client: ClientOptions {
                path: settings.workspace.clone(),
                force: settings.force,
                debug: settings.debug,
            },
            env,
        }
    }
}

/// Project names feed into hostnames: path separators become dashes and
/// dots are dropped entirely.
pub fn sanitize_project_name(name: &str) -> String {
    name.replace('/', "-").replace('.', "")
}
