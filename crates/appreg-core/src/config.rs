//! Tool configuration (`config.toml`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::api::RetryPolicy;

pub const DEFAULT_API_BASE_URL: &str = "https://api.bitrise.io/v0.1/";
pub const API_TOKEN_ENV: &str = "APPREG_API_TOKEN";
pub const API_BASE_URL_ENV: &str = "APPREG_API_BASE_URL";

const CONFIG_FILE_NAME: &str = "config.toml";

/// Settings read from `<config dir>/appreg/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppregConfig {
    pub api_base_url: String,
    pub api_token: Option<String>,
    /// Upper bound for a single reachability probe.
    pub probe_timeout_secs: Option<u64>,
    pub request_attempts: u32,
    pub request_retry_wait_secs: u64,
    /// Upper bound for a single API request attempt.
    pub request_timeout_secs: Option<u64>,
}

impl Default for AppregConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_token: None,
            probe_timeout_secs: None,
            request_attempts: 3,
            request_retry_wait_secs: 5,
            request_timeout_secs: None,
        }
    }
}

impl AppregConfig {
    /// Default location of the config file.
    pub fn default_path() -> anyhow::Result<PathBuf> {
        let dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Ok(dir.join("appreg").join(CONFIG_FILE_NAME))
    }

    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Apply `APPREG_*` environment overrides.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(token) = lookup(API_TOKEN_ENV).filter(|v| !v.trim().is_empty()) {
            self.api_token = Some(token);
        }
        if let Some(base) = lookup(API_BASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.api_base_url = base;
        }
        self
    }

    pub fn api_base_url(&self) -> anyhow::Result<Url> {
        // Url::join drops the last segment unless the base ends with '/'
        let raw = if self.api_base_url.ends_with('/') {
            self.api_base_url.clone()
        } else {
            format!("{}/", self.api_base_url)
        };
        Url::parse(&raw).with_context(|| format!("Invalid API base URL: {}", self.api_base_url))
    }

    pub fn probe_timeout(&self) -> Option<Duration> {
        self.probe_timeout_secs.map(Duration::from_secs)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn retry_wait(&self) -> Duration {
        Duration::from_secs(self.request_retry_wait_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.request_attempts.max(1),
            wait: self.retry_wait(),
        }
    }
}
