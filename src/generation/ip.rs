//! External IP probing for the mid-run address check.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Reports the caller's current external IP.
#[async_trait]
pub trait IpProbe: Send + Sync {
    /// `None` when the address could not be determined.
    async fn current_ip(&self) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpCheckConfig {
    /// Probe the IP before every generation attempt
    pub enabled: bool,
    pub url: String,
    /// Stop the queue when the address changes; otherwise only record it
    pub enforce: bool,
    pub timeout_ms: u64,
}

impl Default for IpCheckConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "https://api.ipify.org".to_string(),
            enforce: true,
            timeout_ms: 5_000,
        }
    }
}

/// Plain-text "what is my IP" endpoint.
#[derive(Debug, Clone)]
pub struct HttpIpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpIpProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url: url.into() })
    }

    pub fn from_config(config: &IpCheckConfig) -> Result<Self> {
        Self::new(config.url.clone(), Duration::from_millis(config.timeout_ms))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> Result<String> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body.trim().to_string())
    }
}

#[async_trait]
impl IpProbe for HttpIpProbe {
    async fn current_ip(&self) -> Option<String> {
        match self.fetch().await {
            Ok(ip) if !ip.is_empty() => Some(ip),
            Ok(_) => {
                tracing::debug!(url = %self.url, "IP probe returned an empty body");
                None
            }
            Err(e) => {
                tracing::debug!(url = %self.url, error = %e, "IP probe failed");
                None
            }
        }
    }
}
