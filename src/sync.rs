//! Remote Sync Module
//!
//! HTTP access to the hub's status document, version string and release
//! artifact.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::Endpoints;

/// Read-only source of remote hub data.
///
/// Each call is a single attempt; callers treat any error as "skip this cycle".
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Raw body of the status document
    async fn fetch_status(&self) -> Result<String, NetworkError>;

    /// Raw body of the version document
    async fn fetch_version(&self) -> Result<String, NetworkError>;

    /// Complete bytes of the replacement program
    async fn fetch_artifact(&self) -> Result<Vec<u8>, NetworkError>;
}

/// HTTP client for the hub's static endpoints
pub struct HubClient {
    endpoints: Endpoints,
    client: reqwest::Client,
    download_timeout: Duration,
}

impl HubClient {
    /// Create a new client.
    ///
    /// `timeout` bounds the status and version requests; `download_timeout`
    /// bounds the artifact download.
    pub fn new(
        endpoints: Endpoints,
        timeout: Duration,
        download_timeout: Duration,
    ) -> Result<Self, NetworkError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("bloxpiece-hub/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| NetworkError::Client(e.to_string()))?;

        Ok(Self {
            endpoints,
            client,
            download_timeout,
        })
    }

    async fn get(&self, url: &str, timeout: Option<Duration>) -> Result<reqwest::Response, NetworkError> {
        debug!("GET {}", url);

        let mut request = self.client.get(url);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NetworkError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NetworkError::Status(response.status().as_u16()));
        }

        Ok(response)
    }

    async fn get_text(&self, url: &str) -> Result<String, NetworkError> {
        self.get(url, None)
            .await?
            .text()
            .await
            .map_err(|e| NetworkError::Transport(e.to_string()))
    }
}

#[async_trait]
impl RemoteSource for HubClient {
    async fn fetch_status(&self) -> Result<String, NetworkError> {
        self.get_text(&self.endpoints.status_url).await
    }

    async fn fetch_version(&self) -> Result<String, NetworkError> {
        self.get_text(&self.endpoints.version_url).await
    }

    async fn fetch_artifact(&self) -> Result<Vec<u8>, NetworkError> {
        let response = self
            .get(&self.endpoints.artifact_url, Some(self.download_timeout))
            .await?;
        let expected = response.content_length();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| NetworkError::Transport(e.to_string()))?;

        if let Some(expected) = expected {
            if bytes.len() as u64 != expected {
                return Err(NetworkError::Truncated {
                    expected,
                    received: bytes.len() as u64,
                });
            }
        }

        info!("Downloaded release artifact: {} bytes", bytes.len());
        Ok(bytes.to_vec())
    }
}

/// Network errors
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("Network error: {0}")]
    Transport(String),

    #[error("Server returned status {0}")]
    Status(u16),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Download truncated: expected {expected} bytes, received {received}")]
    Truncated { expected: u64, received: u64 },

    #[error("HTTP client error: {0}")]
    Client(String),
}
