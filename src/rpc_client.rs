//! Blocking client for the cache service's fetch protocol.
//!
//! Used from the completion process, which is synchronous and short-lived.
//! The transport timeout is deliberately small: a wedged or missing service
//! must never stall the launcher.

use anyhow::{bail, Context, Result};
use std::time::Duration;

use crate::config::Config;
use crate::models::{FetchKind, FetchResponse};

/// Anything that can answer a fetch request. Implemented by [`RpcClient`]
/// and by test doubles.
pub trait FetchClient {
    fn fetch(&self, kind: FetchKind, query: &str) -> Result<FetchResponse>;
}

pub struct RpcClient {
    base_url: String,
    http: reqwest::blocking::Client,
}

impl RpcClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .context("Failed to build cache service client")?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.service_url(),
            Duration::from_millis(config.client.timeout_ms),
        )
    }
}

impl FetchClient for RpcClient {
    fn fetch(&self, kind: FetchKind, query: &str) -> Result<FetchResponse> {
        let url = format!("{}/{}", self.base_url, kind);
        let response = self
            .http
            .get(&url)
            .query(&[("q", query)])
            .send()
            .with_context(|| format!("cache service unreachable at {}", self.base_url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            bail!("cache service error {}: {}", status, body);
        }

        response
            .json::<FetchResponse>()
            .context("invalid cache service response")
    }
}
