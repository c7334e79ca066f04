//! Engine configuration.
//!
//! Every field has a default, so a config file may name any subset of keys.
//! Keys are camelCase to match the documented option names
//! (`discoveryUrl`, `retryPolicy.maxAttempts`, ...). Environment variables
//! overlay the file; the CLI overlays both.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// What to do when the preferred language is absent from auto-discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageFallback {
    /// Use the first language listed in the discovery document.
    #[default]
    First,
    /// Refuse to start.
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Total attempts per fetch, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 500,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.backoff_ms.saturating_mul(factor))
    }
}

/// Credentials some operators require on every feed request.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthConfig {
    /// Sent as an HTTP header, e.g. `Authorization: Bearer <key>`.
    Header { name: String, key: String },
    /// Appended as a URL query parameter.
    Query { param: String, key: String },
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthConfig::Header { name, .. } => f
                .debug_struct("Header")
                .field("name", name)
                .field("key", &"***")
                .finish(),
            AuthConfig::Query { param, .. } => f
                .debug_struct("Query")
                .field("param", param)
                .field("key", &"***")
                .finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub discovery_url: String,
    pub preferred_language: Option<String>,
    pub language_fallback: LanguageFallback,
    pub max_concurrent_fetches: usize,
    pub per_feed_timeout_ms: u64,
    pub retry_policy: RetryPolicy,
    /// Consecutive failed cycles before a feed is flagged degraded.
    pub degraded_threshold: u32,
    /// Minimum wait after a failed cycle before the next attempt.
    pub failure_wait_ms: u64,
    pub auth: Option<AuthConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discovery_url: String::new(),
            preferred_language: None,
            language_fallback: LanguageFallback::First,
            max_concurrent_fetches: 4,
            per_feed_timeout_ms: 10_000,
            retry_policy: RetryPolicy::default(),
            degraded_threshold: 3,
            failure_wait_ms: 30_000,
            auth: None,
        }
    }
}

impl Config {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Overlays `GBFS_*` environment variables onto `self`.
    pub fn with_env(self) -> Result<Self, ConfigError> {
        self.with_vars(|name| std::env::var(name).ok())
    }

    fn with_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(url) = var("GBFS_DISCOVERY_URL") {
            self.discovery_url = url;
        }
        if let Some(lang) = var("GBFS_LANGUAGE") {
            self.preferred_language = Some(lang);
        }
        if let Some(n) = var("GBFS_MAX_CONCURRENT_FETCHES") {
            self.max_concurrent_fetches = parse_var("GBFS_MAX_CONCURRENT_FETCHES", &n)?;
        }
        if let Some(ms) = var("GBFS_TIMEOUT_MS") {
            self.per_feed_timeout_ms = parse_var("GBFS_TIMEOUT_MS", &ms)?;
        }
        if let Some(key) = var("GBFS_API_KEY") {
            self.auth = Some(AuthConfig::Header {
                name: "Authorization".to_string(),
                key: format!("Bearer {key}"),
            });
        }
        Ok(self)
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason: &str| {
            Err(ConfigError::Invalid {
                field,
                reason: reason.to_string(),
            })
        };

        if self.discovery_url.trim().is_empty() {
            return invalid("discoveryUrl", "must not be empty");
        }
        if !self.discovery_url.starts_with("http://") && !self.discovery_url.starts_with("https://")
        {
            return invalid("discoveryUrl", "must be an http(s) URL");
        }
        if self.max_concurrent_fetches == 0 {
            return invalid("maxConcurrentFetches", "must be at least 1");
        }
        if self.per_feed_timeout_ms == 0 {
            return invalid("perFeedTimeoutMs", "must be positive");
        }
        if self.retry_policy.max_attempts == 0 {
            return invalid("retryPolicy.maxAttempts", "must be at least 1");
        }
        if self.degraded_threshold == 0 {
            return invalid("degradedThreshold", "must be at least 1");
        }
        Ok(())
    }

    pub fn per_feed_timeout(&self) -> Duration {
        Duration::from_millis(self.per_feed_timeout_ms)
    }

    pub fn failure_wait(&self) -> Duration {
        Duration::from_millis(self.failure_wait_ms)
    }
}

fn parse_var<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        field,
        reason: format!("not a number: {value:?}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"discoveryUrl": "https://gbfs.example.com/gbfs.json", "retryPolicy": {"maxAttempts": 5}}"#,
        )
        .unwrap();

        assert_eq!(config.discovery_url, "https://gbfs.example.com/gbfs.json");
        assert_eq!(config.retry_policy.max_attempts, 5);
        assert_eq!(config.retry_policy.backoff_ms, 500);
        assert_eq!(config.max_concurrent_fetches, 4);
        assert_eq!(config.language_fallback, LanguageFallback::First);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_auth_config_tagged() {
        let config: Config = serde_json::from_str(
            r#"{"auth": {"type": "query", "param": "api_key", "key": "s3cret"}}"#,
        )
        .unwrap();
        assert_eq!(
            config.auth,
            Some(AuthConfig::Query {
                param: "api_key".into(),
                key: "s3cret".into()
            })
        );
        assert!(!format!("{:?}", config.auth).contains("s3cret"));
    }

    #[test]
    fn test_env_overlay() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("GBFS_DISCOVERY_URL", "https://x.example/gbfs.json"),
            ("GBFS_LANGUAGE", "fr"),
            ("GBFS_MAX_CONCURRENT_FETCHES", "8"),
        ]);
        let config = Config::default()
            .with_vars(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.discovery_url, "https://x.example/gbfs.json");
        assert_eq!(config.preferred_language.as_deref(), Some("fr"));
        assert_eq!(config.max_concurrent_fetches, 8);
    }

    #[test]
    fn test_env_overlay_rejects_garbage() {
        let result = Config::default().with_vars(|k| {
            (k == "GBFS_TIMEOUT_MS").then(|| "soon".to_string())
        });
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                field: "GBFS_TIMEOUT_MS",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = Config {
            discovery_url: "https://x.example/gbfs.json".into(),
            max_concurrent_fetches: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(Config::default().validate().is_err());
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 4,
            backoff_ms: 100,
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
    }
}
