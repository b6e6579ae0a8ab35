//! Health-Check Probe
//!
//! A probe is a lightweight request used only to measure round-trip time and
//! loss. It carries no application data.

use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, PRAGMA};
use std::time::Duration;
use tracing::trace;

use crate::error::{RealtimeError, Result};

/// One round trip to the health-check endpoint
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Resolve `Ok(())` when the endpoint answered healthy within `timeout`
    async fn probe(&self, timeout: Duration) -> Result<()>;
}

/// `HEAD` request with caching disabled
pub struct HttpHealthProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpHealthProbe {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, timeout: Duration) -> Result<()> {
        let response = self
            .client
            .head(&self.url)
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache")
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RealtimeError::timeout("health probe", timeout.as_millis() as u64)
                } else {
                    RealtimeError::from(e)
                }
            })?;

        let status = response.status();
        trace!("Health probe {} -> {}", self.url, status);

        if status.is_success() {
            Ok(())
        } else {
            Err(RealtimeError::probe(format!(
                "health endpoint {} returned {}",
                self.url, status
            )))
        }
    }
}
