//! Directory base URL resolution.

use crate::errors::RoleGrantError;
use crate::models::{JobContext, JobParams};
use reqwest::Url;

/// Default Microsoft Graph root.
pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com";

/// Context config key holding a per-environment base URL.
pub const CONTEXT_ADDRESS_KEY: &str = "address";

/// Picks the directory root URL for an invocation.
pub trait BaseUrlResolver: Send + Sync {
    /// # Errors
    ///
    /// `RoleGrantError::Configuration` if no usable URL can be determined.
    fn resolve(&self, params: &JobParams, context: &JobContext) -> Result<String, RoleGrantError>;
}

/// Resolution order: `params.address`, `context.config["address"]`, default.
#[derive(Debug, Clone)]
pub struct DefaultBaseUrlResolver {
    default_base_url: String,
}

impl DefaultBaseUrlResolver {
    #[must_use]
    pub fn new(default_base_url: impl Into<String>) -> Self {
        Self {
            default_base_url: default_base_url.into(),
        }
    }
}

impl Default for DefaultBaseUrlResolver {
    fn default() -> Self {
        Self::new(DEFAULT_GRAPH_BASE_URL)
    }
}

impl BaseUrlResolver for DefaultBaseUrlResolver {
    fn resolve(&self, params: &JobParams, context: &JobContext) -> Result<String, RoleGrantError> {
        let candidate = params
            .address
            .as_deref()
            .or_else(|| context.config.get(CONTEXT_ADDRESS_KEY).map(String::as_str))
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or(&self.default_base_url);

        normalize_base_url(candidate)
    }
}

/// Add `https://` to bare hosts, drop trailing slashes, and require http(s).
///
/// # Errors
///
/// `RoleGrantError::Configuration` for empty or unparseable URLs.
pub fn normalize_base_url(raw: &str) -> Result<String, RoleGrantError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(RoleGrantError::Configuration(
            "directory base URL is empty".to_string(),
        ));
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let url = Url::parse(&with_scheme).map_err(|e| {
        RoleGrantError::Configuration(format!("invalid directory base URL '{trimmed}': {e}"))
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(RoleGrantError::Configuration(format!(
            "directory base URL must use http or https, got '{}'",
            url.scheme()
        )));
    }

    Ok(with_scheme.trim_end_matches('/').to_string())
}
