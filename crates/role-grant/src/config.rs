//! Role grant job configuration.
//!
//! Configuration is loaded from environment variables. The fallback access
//! token is redacted in Debug output.

use crate::services::base_url::{normalize_base_url, DEFAULT_GRAPH_BASE_URL};
use common::config::{ObservabilityConfig, ObservabilityConfigError};
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default transport request timeout in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 30;

/// Upper bound of the local delay applied before requesting a retry.
pub const MAX_RETRY_DELAY_MS: u64 = 60_000;

/// Role grant job configuration.
#[derive(Clone)]
pub struct Config {
    /// Directory root used when neither params nor context name one.
    pub default_base_url: String,

    /// Token used when the job context carries no credential.
    pub access_token: Option<SecretString>,

    /// Request timeout for directory calls.
    pub http_timeout: Duration,

    /// Fixed delay applied by `error` before signalling a retry.
    pub retry_delay: Duration,

    pub observability: ObservabilityConfig,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("default_base_url", &self.default_base_url)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("http_timeout", &self.http_timeout)
            .field("retry_delay", &self.retry_delay)
            .field("observability", &self.observability)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_base_url: DEFAULT_GRAPH_BASE_URL.to_string(),
            access_token: None,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECONDS),
            retry_delay: Duration::ZERO,
            observability: ObservabilityConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid directory base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("Invalid HTTP timeout configuration: {0}")]
    InvalidHttpTimeout(String),

    #[error("Invalid retry delay configuration: {0}")]
    InvalidRetryDelay(String),

    #[error(transparent)]
    Observability(#[from] ObservabilityConfigError),
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// See [`Config::from_vars`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` naming the offending variable.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let default_base_url = match vars.get("DIRECTORY_BASE_URL") {
            Some(raw) if !raw.trim().is_empty() => normalize_base_url(raw)
                .map_err(|e| ConfigError::InvalidBaseUrl(format!("DIRECTORY_BASE_URL: {e}")))?,
            _ => DEFAULT_GRAPH_BASE_URL.to_string(),
        };

        let access_token = vars
            .get("DIRECTORY_ACCESS_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .map(|t| SecretString::from(t.trim().to_string()));

        let http_timeout = if let Some(value_str) = vars.get("DIRECTORY_HTTP_TIMEOUT_SECONDS") {
            let value: u64 = value_str.trim().parse().map_err(|e| {
                ConfigError::InvalidHttpTimeout(format!(
                    "DIRECTORY_HTTP_TIMEOUT_SECONDS must be a positive integer, got '{value_str}': {e}"
                ))
            })?;
            if value == 0 {
                return Err(ConfigError::InvalidHttpTimeout(
                    "DIRECTORY_HTTP_TIMEOUT_SECONDS must be greater than 0".to_string(),
                ));
            }
            Duration::from_secs(value)
        } else {
            Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECONDS)
        };

        let retry_delay = if let Some(value_str) = vars.get("RETRY_DELAY_MS") {
            let value: u64 = value_str.trim().parse().map_err(|e| {
                ConfigError::InvalidRetryDelay(format!(
                    "RETRY_DELAY_MS must be a non-negative integer, got '{value_str}': {e}"
                ))
            })?;
            if value > MAX_RETRY_DELAY_MS {
                return Err(ConfigError::InvalidRetryDelay(format!(
                    "RETRY_DELAY_MS must be at most {MAX_RETRY_DELAY_MS}, got {value}"
                )));
            }
            Duration::from_millis(value)
        } else {
            Duration::ZERO
        };

        let observability = ObservabilityConfig::from_vars(vars)?;

        Ok(Config {
            default_base_url,
            access_token,
            http_timeout,
            retry_delay,
            observability,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::config::LogFormat;
    use common::secret::ExposeSecret;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_from_vars_defaults() {
        let config = Config::from_vars(&HashMap::new()).unwrap();

        assert_eq!(config.default_base_url, DEFAULT_GRAPH_BASE_URL);
        assert!(config.access_token.is_none());
        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert_eq!(config.retry_delay, Duration::ZERO);
        assert_eq!(config.observability.log_format, LogFormat::Text);
    }

    #[test]
    fn test_from_vars_custom_values() {
        let config = Config::from_vars(&vars(&[
            ("DIRECTORY_BASE_URL", "graph.microsoft.us/"),
            ("DIRECTORY_ACCESS_TOKEN", "token-123"),
            ("DIRECTORY_HTTP_TIMEOUT_SECONDS", "10"),
            ("RETRY_DELAY_MS", "250"),
            ("LOG_FORMAT", "json"),
        ]))
        .unwrap();

        assert_eq!(config.default_base_url, "https://graph.microsoft.us");
        assert_eq!(
            config.access_token.as_ref().unwrap().expose_secret(),
            "token-123"
        );
        assert_eq!(config.http_timeout, Duration::from_secs(10));
        assert_eq!(config.retry_delay, Duration::from_millis(250));
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }

    #[test]
    fn test_http_timeout_rejects_zero() {
        let result = Config::from_vars(&vars(&[("DIRECTORY_HTTP_TIMEOUT_SECONDS", "0")]));
        assert!(matches!(result, Err(ConfigError::InvalidHttpTimeout(_))));
    }

    #[test]
    fn test_http_timeout_rejects_non_numeric() {
        let result = Config::from_vars(&vars(&[("DIRECTORY_HTTP_TIMEOUT_SECONDS", "soon")]));
        assert!(matches!(result, Err(ConfigError::InvalidHttpTimeout(_))));
    }

    #[test]
    fn test_retry_delay_rejects_non_numeric() {
        let result = Config::from_vars(&vars(&[("RETRY_DELAY_MS", "-5")]));
        assert!(matches!(result, Err(ConfigError::InvalidRetryDelay(_))));
    }

    #[test]
    fn test_retry_delay_rejects_too_large() {
        let result = Config::from_vars(&vars(&[("RETRY_DELAY_MS", "60001")]));
        assert!(matches!(result, Err(ConfigError::InvalidRetryDelay(_))));

        let config = Config::from_vars(&vars(&[("RETRY_DELAY_MS", "60000")])).unwrap();
        assert_eq!(config.retry_delay, Duration::from_secs(60));
    }

    #[test]
    fn test_invalid_base_url() {
        let result = Config::from_vars(&vars(&[("DIRECTORY_BASE_URL", "ftp://example.com")]));
        assert!(matches!(result, Err(ConfigError::InvalidBaseUrl(_))));
    }

    #[test]
    fn test_invalid_log_format() {
        let result = Config::from_vars(&vars(&[("LOG_FORMAT", "xml")]));
        assert!(matches!(result, Err(ConfigError::Observability(_))));
    }

    #[test]
    fn test_debug_redacts_access_token() {
        let config =
            Config::from_vars(&vars(&[("DIRECTORY_ACCESS_TOKEN", "very-secret-token")])).unwrap();
        let debug = format!("{config:?}");

        assert!(!debug.contains("very-secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }
}
