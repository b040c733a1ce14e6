//! Client configuration.
//!
//! Settings are read from environment variables through a reader closure so
//! tests can supply values without touching the process environment.

use std::time::Duration;

use crate::error::{ApiError, ApiResult};
use crate::retry::RetryPolicy;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_PAGE_SIZE: u32 = 100;
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Connection settings for a Dependency-Track API server.
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL of the API server (e.g. `https://deptrack.example.com`).
    pub base_url: String,
    /// API key sent in the `X-Api-Key` header.
    pub api_key: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// TCP connect timeout.
    pub connect_timeout_secs: u64,
    /// Whether TLS certificates are verified.
    pub tls_verify: bool,
    /// Page size for paginated listings.
    pub page_size: u32,
    /// Retry policy for read requests.
    pub retry: RetryPolicy,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("timeout_secs", &self.timeout_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("tls_verify", &self.tls_verify)
            .field("page_size", &self.page_size)
            .field("retry", &self.retry)
            .finish()
    }
}

impl ClientConfig {
    /// Create a configuration with default timeouts.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: normalize_base_url(&base_url.into()),
            api_key: api_key.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            tls_verify: true,
            page_size: DEFAULT_PAGE_SIZE,
            retry: RetryPolicy::new(DEFAULT_MAX_RETRIES, 500),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> ApiResult<Self> {
        Self::from_reader(|key| std::env::var(key))
    }

    /// Load configuration from a custom variable reader.
    ///
    /// Recognized variables: `DTRACK_URL` and `DTRACK_API_KEY` (required),
    /// `DTRACK_TIMEOUT_SECS`, `DTRACK_CONNECT_TIMEOUT_SECS`,
    /// `DTRACK_TLS_VERIFY`, `DTRACK_PAGE_SIZE`, `DTRACK_MAX_RETRIES`.
    pub fn from_reader<F>(reader: F) -> ApiResult<Self>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let base_url = reader("DTRACK_URL")
            .map_err(|_| ApiError::InvalidConfig("missing DTRACK_URL".into()))?;
        let api_key = reader("DTRACK_API_KEY")
            .map_err(|_| ApiError::InvalidConfig("missing DTRACK_API_KEY".into()))?;

        let mut config = Self::new(base_url, api_key);

        config.timeout_secs = parse_var(&reader, "DTRACK_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;
        config.connect_timeout_secs = parse_var(
            &reader,
            "DTRACK_CONNECT_TIMEOUT_SECS",
            DEFAULT_CONNECT_TIMEOUT_SECS,
        )?;
        config.tls_verify = parse_var(&reader, "DTRACK_TLS_VERIFY", true)?;
        config.page_size = parse_var(&reader, "DTRACK_PAGE_SIZE", DEFAULT_PAGE_SIZE)?;
        config.retry.max_retries = parse_var(&reader, "DTRACK_MAX_RETRIES", DEFAULT_MAX_RETRIES)?;

        config.validate()?;
        Ok(config)
    }

    /// Override the base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = normalize_base_url(&base_url.into());
        self
    }

    /// Override the API key.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Check that the configuration can be used to build a client.
    pub fn validate(&self) -> ApiResult<()> {
        let parsed = url::Url::parse(&self.base_url).map_err(|e| {
            ApiError::InvalidConfig(format!("invalid base URL '{}': {e}", self.base_url))
        })?;

        match parsed.scheme() {
            "http" | "https" => {}
            other => {
                return Err(ApiError::InvalidConfig(format!(
                    "unsupported URL scheme '{other}'"
                )))
            }
        }

        if self.api_key.trim().is_empty() {
            return Err(ApiError::InvalidConfig("API key must not be empty".into()));
        }

        if self.page_size == 0 {
            return Err(ApiError::InvalidConfig("page size must be positive".into()));
        }

        Ok(())
    }

    /// Request timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Connect timeout as a [`Duration`].
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn parse_var<F, T>(reader: &F, key: &str, default: T) -> ApiResult<T>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match reader(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ApiError::InvalidConfig(format!("invalid value for {key}: {e}"))),
        Err(_) => Ok(default),
    }
}
