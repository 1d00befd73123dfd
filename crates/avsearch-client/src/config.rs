//! Client configuration.
//!
//! All settings are passed in explicitly at construction time. Nothing in this
//! crate reads the process environment.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::poller::BackoffConfig;
use crate::{Error, Result};

/// Default poll interval in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Poll intervals offered by interactive front ends.
pub const POLL_INTERVAL_PRESETS: &[u64] = &[5, 10, 30, 60];

/// Default upload size limit (500 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 500 * 1024 * 1024;

/// Default HTTP request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration shared by the API client, the storage client and the poller.
///
/// Only the endpoint is required; every other field has a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the processing API.
    pub endpoint: Url,
    /// Seconds between status polls.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Private per-user storage namespace.
    #[serde(default = "default_namespace")]
    pub artifact_namespace: String,
    /// Bucket name used when building `s3://` URIs for the processing API.
    #[serde(default)]
    pub bucket: String,
    /// HTTP request timeout.
    #[serde(with = "duration_secs", default = "default_request_timeout")]
    pub request_timeout: Duration,
    /// Upload size limit in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    /// Concurrent status queries when listing videos.
    #[serde(default = "default_listing_concurrency")]
    pub listing_concurrency: usize,
    /// Poller retry policy.
    #[serde(default)]
    pub backoff: BackoffConfig,
    /// Stop polling once the job reaches a final status.
    #[serde(default)]
    pub stop_when_terminal: bool,
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_namespace() -> String {
    "private".to_string()
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

fn default_max_upload_bytes() -> u64 {
    DEFAULT_MAX_UPLOAD_BYTES
}

fn default_listing_concurrency() -> usize {
    4
}

impl ClientConfig {
    /// Create a configuration for the given endpoint with defaults elsewhere.
    pub fn new(endpoint: &str) -> Result<Self> {
        Ok(Self {
            endpoint: parse_endpoint(endpoint)?,
            poll_interval_secs: default_poll_interval_secs(),
            artifact_namespace: default_namespace(),
            bucket: String::new(),
            request_timeout: default_request_timeout(),
            max_upload_bytes: default_max_upload_bytes(),
            listing_concurrency: default_listing_concurrency(),
            backoff: BackoffConfig::default(),
            stop_when_terminal: false,
        })
    }

    pub fn with_poll_interval(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.artifact_namespace = namespace.into();
        self
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_stop_when_terminal(mut self, stop: bool) -> Self {
        self.stop_when_terminal = stop;
        self
    }

    /// Poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Check the configuration for values that can never work.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.endpoint.scheme(), "http" | "https") {
            return Err(Error::validation(format!(
                "endpoint must be http or https, got {}",
                self.endpoint.scheme()
            )));
        }
        validate_poll_interval(self.poll_interval_secs)?;
        if self.artifact_namespace.trim().is_empty() {
            return Err(Error::validation("artifact namespace must not be empty"));
        }
        if self.artifact_namespace.contains('/') {
            return Err(Error::validation(
                "artifact namespace must be a single path segment",
            ));
        }
        if self.max_upload_bytes == 0 {
            return Err(Error::validation("upload size limit must be positive"));
        }
        if self.listing_concurrency == 0 {
            return Err(Error::validation("listing concurrency must be positive"));
        }
        self.backoff.validate()
    }

    /// Join a path onto the endpoint.
    pub fn url(&self, path: &str) -> Result<Url> {
        Ok(self.endpoint.join(path.trim_start_matches('/'))?)
    }
}

/// Poll intervals must be positive.
pub fn validate_poll_interval(secs: u64) -> Result<()> {
    if secs == 0 {
        return Err(Error::validation("poll interval must be at least 1 second"));
    }
    Ok(())
}

/// Parse an endpoint URL, making sure it ends with `/` so that relative joins
/// keep any base path.
pub fn parse_endpoint(endpoint: &str) -> Result<Url> {
    let trimmed = endpoint.trim();
    if trimmed.ends_with('/') {
        Ok(Url::parse(trimmed)?)
    } else {
        Ok(Url::parse(&format!("{}/", trimmed))?)
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
