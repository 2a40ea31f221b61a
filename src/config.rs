//! TOML configuration: shorthand dictionaries, service address, cache TTLs.
//!
//! ```toml
//! default_repo = "zerowidth/gh-shorthand"
//!
//! [repos]
//! df = "zerowidth/dotfiles"
//!
//! [users]
//! z = "zerowidth"
//!
//! [server]
//! bind = "127.0.0.1:6789"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::parser::is_shorthand_key;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub default_repo: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub repos: HashMap<String, String>,
    #[serde(default)]
    pub users: HashMap<String, String>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:6789".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_success_ttl")]
    pub success_ttl_secs: u64,
    #[serde(default = "default_error_ttl")]
    pub error_ttl_secs: u64,
    #[serde(default = "default_remote_timeout")]
    pub remote_timeout_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            success_ttl_secs: default_success_ttl(),
            error_ttl_secs: default_error_ttl(),
            remote_timeout_secs: default_remote_timeout(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_success_ttl() -> u64 {
    300
}
fn default_error_ttl() -> u64 {
    10
}
fn default_remote_timeout() -> u64 {
    10
}
fn default_sweep_interval() -> u64 {
    60
}

impl CacheConfig {
    pub fn success_ttl(&self) -> Duration {
        Duration::from_secs(self.success_ttl_secs)
    }

    pub fn error_ttl(&self) -> Duration {
        Duration::from_secs(self.error_ttl_secs)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    #[serde(default = "default_client_timeout")]
    pub timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_client_timeout(),
        }
    }
}

fn default_client_timeout() -> u64 {
    100
}

impl Config {
    /// Config used when no file exists: empty dictionaries, default service settings.
    pub fn minimal() -> Self {
        Self::default()
    }

    /// Token from the config file, else `GITHUB_TOKEN`.
    pub fn api_token(&self) -> Option<String> {
        self.api_token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()))
    }

    /// Base URL the completion client uses to reach the cache service.
    pub fn service_url(&self) -> String {
        format!("http://{}", self.server.bind)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if let Some(default_repo) = &config.default_repo {
        if !is_owner_name(default_repo) {
            anyhow::bail!("default_repo must be owner/name, got '{}'", default_repo);
        }
    }

    for key in config.repos.keys().chain(config.users.keys()) {
        if !is_shorthand_key(key) {
            anyhow::bail!(
                "shorthand '{}' can never match: start with a letter or digit, \
                 then use letters, digits, '_', '.' or '-', ending on a letter, digit or '_'",
                key
            );
        }
    }

    for (key, repo) in &config.repos {
        if !is_owner_name(repo) {
            anyhow::bail!("repos.{} must be owner/name, got '{}'", key, repo);
        }
    }

    for (key, user) in &config.users {
        if user.is_empty() || user.contains('/') {
            anyhow::bail!("users.{} must be a bare owner name, got '{}'", key, user);
        }
    }

    if config.cache.success_ttl_secs == 0 || config.cache.error_ttl_secs == 0 {
        anyhow::bail!("cache TTLs must be > 0");
    }

    if config.cache.error_ttl_secs > config.cache.success_ttl_secs {
        anyhow::bail!("cache.error_ttl_secs must not exceed cache.success_ttl_secs");
    }

    if config.cache.remote_timeout_secs == 0
        || config.cache.sweep_interval_secs == 0
        || config.client.timeout_ms == 0
    {
        anyhow::bail!("timeouts must be > 0");
    }

    Ok(config)
}

fn is_owner_name(s: &str) -> bool {
    match s.split_once('/') {
        Some((owner, name)) => !owner.is_empty() && !name.is_empty() && !name.contains('/'),
        None => false,
    }
}
