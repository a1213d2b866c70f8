//! Runtime configuration
//!
//! The backend origin is injected at startup. Sources, highest priority first:
//!
//! 1. `--backend` on the command line (see `main.rs`)
//! 2. `CHARTRAG_BACKEND_URL` in the environment
//! 3. a `.env` file in the working directory (loaded by the binary)
//! 4. [`DEFAULT_BACKEND_URL`]

use crate::error::ClientError;
use crate::poll::PollPolicy;
use std::time::Duration;
use url::Url;

pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_CHART_LIBRARY_URL: &str = "https://cdn.plot.ly/plotly-3.0.1.min.js";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL, always ending in `/` so endpoint joins keep any path prefix
    pub backend_url: Url,
    /// `None` waits forever
    pub request_timeout: Option<Duration>,
    pub chart_library_url: String,
    pub details: PollPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: Url::parse(DEFAULT_BACKEND_URL).expect("default backend URL is valid"),
            request_timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            chart_library_url: DEFAULT_CHART_LIBRARY_URL.to_string(),
            details: PollPolicy::default(),
        }
    }
}

impl Config {
    /// Build a config for the given backend with default settings
    pub fn new(backend_url: &str) -> Result<Self, ClientError> {
        Ok(Self {
            backend_url: parse_backend_url(backend_url)?,
            ..Self::default()
        })
    }

    /// Load from environment variables.
    /// ENV vars: CHARTRAG_BACKEND_URL, CHARTRAG_TIMEOUT_SECS, CHARTRAG_CHART_LIBRARY_URL,
    /// CHARTRAG_DETAILS_DELAY_MS, CHARTRAG_DETAILS_MAX_ATTEMPTS, CHARTRAG_DETAILS_MAX_BACKOFF_MS
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ClientError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let backend = lookup("CHARTRAG_BACKEND_URL")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());

        let timeout_secs = parse_or(lookup("CHARTRAG_TIMEOUT_SECS"), DEFAULT_TIMEOUT_SECS);
        let request_timeout = if timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(timeout_secs))
        };

        let details = PollPolicy {
            initial_delay: Duration::from_millis(parse_or(
                lookup("CHARTRAG_DETAILS_DELAY_MS"),
                defaults.details.initial_delay.as_millis() as u64,
            )),
            max_attempts: parse_or(
                lookup("CHARTRAG_DETAILS_MAX_ATTEMPTS"),
                defaults.details.max_attempts,
            )
            .max(1),
            max_backoff: Duration::from_millis(parse_or(
                lookup("CHARTRAG_DETAILS_MAX_BACKOFF_MS"),
                defaults.details.max_backoff.as_millis() as u64,
            )),
        };

        Ok(Self {
            backend_url: parse_backend_url(&backend)?,
            request_timeout,
            chart_library_url: lookup("CHARTRAG_CHART_LIBRARY_URL")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.chart_library_url),
            details,
        })
    }

    pub fn with_backend_url(mut self, backend_url: &str) -> Result<Self, ClientError> {
        self.backend_url = parse_backend_url(backend_url)?;
        Ok(self)
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.details = policy;
        self
    }

    /// Full URL for a backend endpoint such as `upload` or `/details`
    pub fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.backend_url.join(path.trim_start_matches('/'))?)
    }
}

fn parse_backend_url(raw: &str) -> Result<Url, ClientError> {
    let trimmed = raw.trim();
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    };

    let url = Url::parse(&with_slash)
        .map_err(|e| ClientError::Config(format!("backend URL '{}': {}", trimmed, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ClientError::Config(format!(
            "backend URL '{}' must use http or https, not {}",
            trimmed, other
        ))),
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}
