//! Secret types for protecting sensitive values from accidental logging.
//!
//! This module re-exports types from the [`secrecy`] crate and adds
//! [`SecretHeaders`], the header map handed to outbound directory calls.
//! Bearer tokens and other credential headers are wrapped in
//! `SecretString`, so deriving `Debug` on anything holding them is safe.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretHeaders, SecretString};
//!
//! let mut headers = SecretHeaders::new();
//! headers.insert("Authorization", SecretString::from("Bearer eyJ0eXAi"));
//!
//! // Only header names are printed
//! let debug = format!("{headers:?}");
//! assert!(debug.contains("Authorization"));
//! assert!(!debug.contains("eyJ0eXAi"));
//!
//! // Values must be exposed explicitly when building the request
//! for (name, value) in headers.iter() {
//!     let _ = (name, value.expose_secret());
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;

// Re-export the main types from secrecy
pub use secrecy::{ExposeSecret, SecretBox, SecretString};

/// HTTP header map whose values are treated as secrets.
///
/// Header names are compared case-insensitively; the most recent insert
/// for a name wins. Iteration order is stable (sorted by lowercase name).
#[derive(Clone, Default)]
pub struct SecretHeaders {
    entries: BTreeMap<String, (String, SecretString)>,
}

impl SecretHeaders {
    /// Create an empty header map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header, replacing any existing value with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: SecretString) {
        let name = name.into();
        self.entries
            .insert(name.to_ascii_lowercase(), (name, value));
    }

    /// Look up a header value by name (case-insensitive).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SecretString> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|(_, value)| value)
    }

    /// Whether a header with this name is present (case-insensitive).
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    /// Number of headers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(name, value)` pairs using the originally inserted names.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SecretString)> {
        self.entries
            .values()
            .map(|(name, value)| (name.as_str(), value))
    }
}

impl fmt::Debug for SecretHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.values().map(|(name, _)| (name, "[REDACTED]")))
            .finish()
    }
}

impl<K: Into<String>> FromIterator<(K, SecretString)> for SecretHeaders {
    fn from_iter<I: IntoIterator<Item = (K, SecretString)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("hunter2");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("hunter2"));
    }

    #[test]
    fn test_headers_debug_shows_names_only() {
        let mut headers = SecretHeaders::new();
        headers.insert("Authorization", SecretString::from("Bearer top-secret"));
        headers.insert("X-Request-Source", SecretString::from("pipeline"));

        let debug_str = format!("{headers:?}");
        assert!(debug_str.contains("Authorization"));
        assert!(debug_str.contains("X-Request-Source"));
        assert!(!debug_str.contains("top-secret"));
        assert!(!debug_str.contains("pipeline"));
    }

    #[test]
    fn test_headers_are_case_insensitive() {
        let mut headers = SecretHeaders::new();
        headers.insert("authorization", SecretString::from("Bearer one"));
        headers.insert("Authorization", SecretString::from("Bearer two"));

        assert_eq!(headers.len(), 1);
        assert!(headers.contains("AUTHORIZATION"));
        assert_eq!(
            headers.get("authorization").map(|v| v.expose_secret()),
            Some("Bearer two")
        );

        let names: Vec<&str> = headers.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["Authorization"]);
    }

    #[test]
    fn test_headers_from_iterator() {
        let headers: SecretHeaders = [
            ("Accept", SecretString::from("application/json")),
            ("Authorization", SecretString::from("Bearer abc")),
        ]
        .into_iter()
        .collect();

        assert_eq!(headers.len(), 2);
        assert!(!headers.is_empty());
        assert!(headers.get("missing").is_none());
    }

    #[test]
    fn test_deserialize() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct Credentials {
            token: SecretString,
        }

        let json = r#"{"token": "my-secret-value"}"#;
        let creds: Credentials = serde_json::from_str(json).expect("deserialize");

        assert_eq!(creds.token.expose_secret(), "my-secret-value");

        let debug = format!("{creds:?}");
        assert!(!debug.contains("my-secret-value"));
        assert!(debug.contains("REDACTED"));
    }
}
