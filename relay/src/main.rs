//! Deploy Relay - Entry Point
//!
//! Runs once per repository event: derives the trigger context from the
//! webhook payload, submits a deployment to the hosted platform and
//! mirrors its lifecycle back as deployment statuses and commit comments.

use std::env;

use deploy_relay::config::Settings;
use deploy_relay::deploy::orchestrator;
use deploy_relay::errors::RelayError;
use deploy_relay::http::client::HttpClient;
use deploy_relay::http::github::GithubReporter;
use deploy_relay::logs::{init_logging, LogOptions};
use deploy_relay::platform::client::PlatformClient;
use deploy_relay::trigger::{TriggerContext, WebhookPayload};
use deploy_relay::utils::version_info;

use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Print version and exit
    if env::args().skip(1).any(|arg| arg == "--version") {
        let version = version_info();
        println!("{}", serde_json::to_string_pretty(&version).unwrap());
        return;
    }

    let settings = match Settings::from_env().await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        ..Default::default()
    };
    if let Err(e) = init_logging(log_options) {
        println!("Failed to initialize logging: {e}");
    }

    match run_relay(&settings).await {
        Ok(result) => {
            info!("Deployment run succeeded");
            println!(
                "{}",
                serde_json::to_string_pretty(&result).unwrap_or_default()
            );
        }
        Err(e) => {
            error!("Deployment run failed: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_relay(settings: &Settings) -> Result<serde_json::Value, RelayError> {
    let raw = tokio::fs::read(&settings.event_path).await?;
    let payload: WebhookPayload = serde_json::from_slice(&raw)?;

    let ctx = TriggerContext::derive(
        &payload,
        settings.repository.as_deref(),
        &settings.trunk_branch,
    )?;
    info!(
        sha = %ctx.sha,
        branch = %ctx.branch,
        environment = %ctx.environment,
        "Trigger context derived"
    );

    let github_http = HttpClient::new(
        &settings.platform.github_api_base,
        &settings.github_token,
        settings.debug,
    )?;
    let reporter = GithubReporter::new(github_http, ctx.clone());
    let platform = PlatformClient::new(settings)?;

    orchestrator::run(&reporter, &platform, settings, &ctx).await
}
