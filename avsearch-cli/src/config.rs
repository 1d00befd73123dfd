use crate::error::{CliError, Result};
use avsearch_client::ClientConfig;
use avsearch_client::config::DEFAULT_POLL_INTERVAL_SECS;
use avsearch_client::poller::BackoffConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Persistent CLI settings, stored as TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Processing API endpoint
    pub endpoint: Option<String>,
    /// Identity token. Prefer `AVSEARCH_TOKEN` over storing it here.
    pub token: Option<String>,
    pub namespace: String,
    pub bucket: Option<String>,
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub listing_concurrency: usize,
    pub colored_output: bool,
    pub backoff: BackoffConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            token: None,
            namespace: "private".to_string(),
            bucket: None,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            request_timeout_secs: 30,
            listing_concurrency: 4,
            colored_output: true,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Values given on the command line or through the environment.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub namespace: Option<String>,
    pub bucket: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl AppConfig {
    /// Default configuration file path.
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("avsearch").join("config.toml"))
            .ok_or_else(|| CliError::config("could not determine the configuration directory"))
    }

    fn resolve_path(path: Option<&Path>) -> Result<PathBuf> {
        match path {
            Some(path) => Ok(path.to_path_buf()),
            None => Self::default_path(),
        }
    }

    /// Load the configuration, falling back to defaults when the file does not exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_path(path)?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let path = Self::resolve_path(path)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Overwrite the configuration file with defaults.
    pub fn reset(path: Option<&Path>) -> Result<()> {
        Self::default().save(path)
    }

    /// TOML rendering with the token masked.
    pub fn show(&self) -> Result<String> {
        let mut shown = self.clone();
        if shown.token.is_some() {
            shown.token = Some("********".to_string());
        }
        Ok(toml::to_string_pretty(&shown)?)
    }

    /// Token from the command line or environment, else from the file.
    pub fn token(&self, overrides: &Overrides) -> Option<String> {
        overrides
            .token
            .clone()
            .or_else(|| self.token.clone())
            .filter(|t| !t.trim().is_empty())
    }

    /// Build the client configuration, applying overrides.
    pub fn client_config(&self, overrides: &Overrides) -> Result<ClientConfig> {
        let endpoint = overrides
            .endpoint
            .as_deref()
            .or(self.endpoint.as_deref())
            .ok_or_else(|| {
                CliError::config("no endpoint configured; pass --endpoint or set AVSEARCH_ENDPOINT")
            })?;

        let mut config = ClientConfig::new(endpoint)?
            .with_poll_interval(self.poll_interval_secs)
            .with_namespace(
                overrides
                    .namespace
                    .clone()
                    .unwrap_or_else(|| self.namespace.clone()),
            )
            .with_request_timeout(Duration::from_secs(
                overrides.timeout_secs.unwrap_or(self.request_timeout_secs),
            ))
            .with_backoff(self.backoff.clone());
        if let Some(bucket) = overrides.bucket.as_ref().or(self.bucket.as_ref()) {
            config = config.with_bucket(bucket.clone());
        }
        config.listing_concurrency = self.listing_concurrency;

        config.validate()?;
        Ok(config)
    }
}
