//! Error types for the deploy relay

use thiserror::Error;

/// Main error type for the deploy relay
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Remote API error: {status} - {body}")]
    RemoteApi { status: u16, body: String },

    #[error("Invalid deployment state: {0}")]
    InvalidState(String),

    #[error("Deployment failed: {0}")]
    DeploymentFailed(serde_json::Value),

    #[error("Deployment event stream ended without a terminal event")]
    IncompleteRun,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for RelayError {
    fn from(err: anyhow::Error) -> Self {
        RelayError::Internal(err.to_string())
    }
}
