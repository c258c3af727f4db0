use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

use livetrader_core::config::RuntimeConfig;

pub type SharedSink = Arc<dyn TelemetrySink>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TelemetryError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Unexpected HTTP status {code}: {body}")]
    Status { code: u16, body: String },

    #[error("Invalid payload: {0}")]
    Payload(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl TelemetryError {
    /// Whether another attempt may succeed: connection problems, timeouts,
    /// HTTP 429 and 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            TelemetryError::Transport(_) | TelemetryError::Timeout(_) => true,
            TelemetryError::Status { code, .. } => *code == 429 || *code >= 500,
            TelemetryError::Payload(_) | TelemetryError::InvalidUrl(_) => false,
        }
    }
}

impl From<reqwest::Error> for TelemetryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TelemetryError::Timeout(e.to_string())
        } else if e.is_builder() || e.is_decode() {
            TelemetryError::Payload(e.to_string())
        } else if let Some(status) = e.status() {
            TelemetryError::Status {
                code: status.as_u16(),
                body: e.to_string(),
            }
        } else {
            TelemetryError::Transport(e.to_string())
        }
    }
}

/// Monitoring endpoint accepting JSON documents.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn post(&self, path: &str, body: &Value) -> Result<(), TelemetryError>;

    async fn patch(&self, path: &str, body: &Value) -> Result<(), TelemetryError>;
}

/// `reqwest` client authenticating with the `X-API-Key` header.
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: Client,
    base_url: String,
}

impl HttpSink {
    pub fn new(config: &RuntimeConfig, timeout: Duration) -> Result<Self, TelemetryError> {
        Url::parse(&config.api_base_url)
            .map_err(|e| TelemetryError::InvalidUrl(format!("{}: {}", config.api_base_url, e)))?;

        let mut api_key = HeaderValue::from_str(&config.api_key)
            .map_err(|e| TelemetryError::Payload(format!("Invalid API key header: {}", e)))?;
        api_key.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert("X-API-Key", api_key);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn build_url(&self, path: &str) -> Result<Url, TelemetryError> {
        Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| TelemetryError::InvalidUrl(format!("{}{}: {}", self.base_url, path, e)))
    }

    async fn send(&self, method: Method, path: &str, body: &Value) -> Result<(), TelemetryError> {
        let url = self.build_url(path)?;
        debug!("Sending {} {}", method, url);

        let response = self.client.request(method, url).json(body).send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(TelemetryError::Status {
            code: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl TelemetrySink for HttpSink {
    async fn post(&self, path: &str, body: &Value) -> Result<(), TelemetryError> {
        self.send(Method::POST, path, body).await
    }

    async fn patch(&self, path: &str, body: &Value) -> Result<(), TelemetryError> {
        self.send(Method::PATCH, path, body).await
    }
}
