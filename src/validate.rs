use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::context::RunStatus;
use crate::error::ReachabilityError;
use crate::providers::sanitize_url;

/// Fetches a page body.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, ReachabilityError>;
}

/// `reqwest`-backed fetcher with a hard per-request timeout.
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });
        Self { client, timeout }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, ReachabilityError> {
        let parsed = reqwest::Url::parse(url).map_err(|e| ReachabilityError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                ReachabilityError::Timeout {
                    url: url.to_string(),
                    timeout: self.timeout,
                }
            } else if e.is_connect() {
                ReachabilityError::Connect {
                    url: url.to_string(),
                    message: format!("{:#}", anyhow::Error::from(e)),
                }
            } else {
                ReachabilityError::Request {
                    url: url.to_string(),
                    message: format!("{:#}", anyhow::Error::from(e)),
                }
            }
        };

        // The client timeout covers the body read too.
        let resp = self
            .client
            .get(parsed)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(classify)?;
        tracing::debug!("Fetched {} -> HTTP {}", url, resp.status());
        resp.text().await.map_err(classify)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub markup: Option<String>,
    pub status: RunStatus,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ValidatorSettings {
    pub fetch_timeout: Duration,
}

impl Default for ValidatorSettings {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(5),
        }
    }
}

/// Confirms a target is fetchable before any browser work happens.
pub struct Validator {
    fetcher: Arc<dyn Fetcher>,
}

impl Validator {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    pub fn http(settings: &ValidatorSettings) -> Self {
        Self::new(Arc::new(HttpFetcher::new(settings.fetch_timeout)))
    }

    /// Fetch `url`; failures come back as data, never as an error.
    pub async fn validate(&self, url: &str) -> ValidationOutcome {
        let url = sanitize_url(url);
        match self.fetcher.fetch(&url).await {
            Ok(markup) => {
                tracing::info!("Validated {} ({} bytes)", url, markup.len());
                ValidationOutcome {
                    markup: Some(markup),
                    status: RunStatus::Validated,
                    error_message: None,
                }
            }
            Err(e) => {
                tracing::warn!("Validation failed: {}", e);
                ValidationOutcome {
                    markup: None,
                    status: RunStatus::Failed,
                    error_message: Some(e.to_string()),
                }
            }
        }
    }
}
