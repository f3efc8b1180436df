//! Common configuration types shared by role grant binaries.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Default log filter when neither `RUST_LOG` nor `LOG_LEVEL` is set.
pub const DEFAULT_LOG_FILTER: &str = "role_grant=info,common=info";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable single-line output.
    Text,
    /// One JSON object per line.
    Json,
}

/// Errors raised while reading observability settings.
#[derive(Debug, Error)]
pub enum ObservabilityConfigError {
    #[error("Invalid LOG_FORMAT '{0}', expected 'text' or 'json'")]
    InvalidLogFormat(String),
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log filter directive (`EnvFilter` syntax, e.g. `role_grant=debug`)
    pub log_filter: String,
    /// Log output format
    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            log_format: LogFormat::Text,
        }
    }
}

impl ObservabilityConfig {
    /// Read settings from a variable map.
    ///
    /// `RUST_LOG` takes precedence over `LOG_LEVEL`; a bare level such as
    /// `debug` is applied to the role grant crates only.
    ///
    /// # Errors
    ///
    /// Returns `ObservabilityConfigError::InvalidLogFormat` for an unknown
    /// `LOG_FORMAT`.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ObservabilityConfigError> {
        let log_filter = match (vars.get("RUST_LOG"), vars.get("LOG_LEVEL")) {
            (Some(filter), _) if !filter.trim().is_empty() => filter.trim().to_string(),
            (_, Some(level)) if !level.trim().is_empty() => {
                let level = level.trim().to_ascii_lowercase();
                format!("role_grant={level},common={level}")
            }
            _ => DEFAULT_LOG_FILTER.to_string(),
        };

        let log_format = match vars.get("LOG_FORMAT").map(|v| v.trim().to_ascii_lowercase()) {
            None => LogFormat::Text,
            Some(v) if v.is_empty() || v == "text" => LogFormat::Text,
            Some(v) if v == "json" => LogFormat::Json,
            Some(other) => return Err(ObservabilityConfigError::InvalidLogFormat(other)),
        };

        Ok(Self {
            log_filter,
            log_format,
        })
    }
}
