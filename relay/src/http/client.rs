//! HTTP client implementation

use std::time::Instant;

use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error};

use crate::errors::RelayError;
use crate::utils::user_agent;

/// Authenticated JSON client for one remote API. Every request carries a
/// bearer token, an `accept: application/json` header and the relay's
/// user-agent; in debug mode each call logs its method, URL and elapsed
/// milliseconds.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
    token: String,
    debug: bool,
}

impl HttpClient {
    /// Create a new HTTP client for the given API base URL
    pub fn new(base_url: &str, token: &str, debug: bool) -> Result<Self, RelayError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent(user_agent())
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            debug,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, RelayError> {
        let url = format!("{}{}", self.base_url, path);
        if self.debug {
            debug!("GET {}", url);
        }
        let start = Instant::now();

        let response = self
            .client
            .get(&url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;

        if self.debug {
            debug!("DONE in {}ms: GET {}", start.elapsed().as_millis(), url);
        }
        Self::read_json(response, "GET", &url).await
    }

    /// Make a POST request with a JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, RelayError> {
        self.post_with_accept(path, "application/json", body).await
    }

    /// Make a POST request with a JSON body and an explicit accept header,
    /// for endpoints that require a preview media type
    pub async fn post_with_accept<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        accept: &str,
        body: &B,
    ) -> Result<T, RelayError> {
        let url = format!("{}{}", self.base_url, path);
        if self.debug {
            debug!("POST {}", url);
        }
        let start = Instant::now();

        let response = self
            .client
            .post(&url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .header(header::ACCEPT, accept)
            .json(body)
            .send()
            .await?;

        if self.debug {
            debug!("DONE in {}ms: POST {}", start.elapsed().as_millis(), url);
        }
        Self::read_json(response, "POST", &url).await
    }

    async fn read_json<T: DeserializeOwned>(
        response: reqwest::Response,
        method: &str,
        url: &str,
    ) -> Result<T, RelayError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("HTTP {} failed: {} {} - {}", method, url, status, body);
            return Err(RelayError::RemoteApi {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.json().await?;
        Ok(body)
    }
}
