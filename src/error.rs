//! Error types shared across discovery, fetching and configuration.

use thiserror::Error;

/// Failure to resolve the auto-discovery root. Fatal at startup.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("discovery fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("discovery document is not valid JSON: {0}")]
    Json(String),
    #[error("discovery document has unexpected shape: {0}")]
    Shape(String),
    #[error("discovery document lists no languages")]
    NoLanguages,
    #[error("language {0:?} not present in discovery document")]
    LanguageNotFound(String),
}

/// Errors from a single feed fetch.
///
/// All variants are transient from the scheduler's point of view: they are
/// retried with backoff and then count toward the feed's degraded threshold.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Connection, DNS, TLS or body transfer failure
    #[error("network error: {0}")]
    Network(String),
    /// Request or body read exceeded the per-request timeout
    #[error("request timed out")]
    Timeout,
    /// Non-2xx response
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Body is not JSON or does not match the `{last_updated, ttl, data}` envelope
    #[error("parse error: {0}")]
    Parse(String),
}

impl FetchError {
    /// Whether another attempt may succeed. 4xx responses other than 429 are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network(_) | FetchError::Timeout | FetchError::Parse(_) => true,
            FetchError::HttpStatus(code) => *code == 429 || (500..600).contains(code),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON in config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Failure to bring the engine up.
#[derive(Debug, Error)]
pub enum StartError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to build HTTP client: {0}")]
    Client(String),
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}
