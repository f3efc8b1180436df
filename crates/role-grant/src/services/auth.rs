//! Authorization headers for directory calls.

use crate::errors::RoleGrantError;
use crate::models::JobContext;
use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretHeaders, SecretString};
use tracing::debug;

/// Secret key holding the directory access token.
pub const BEARER_TOKEN_SECRET: &str = "BEARER_AUTH_TOKEN";

/// Secret key holding a complete `Authorization` header value.
pub const AUTHORIZATION_SECRET: &str = "authorization";

const BEARER_PREFIX: &str = "Bearer ";

/// Produces the headers attached to every directory call.
#[async_trait]
pub trait AuthHeaderProvider: Send + Sync {
    /// # Errors
    ///
    /// `RoleGrantError::Configuration` if no credential is available.
    async fn headers(&self, context: &JobContext) -> Result<SecretHeaders, RoleGrantError>;
}

/// Bearer token from the job secrets, falling back to a configured token.
///
/// An `authorization` secret is sent as-is and takes precedence.
#[derive(Debug, Clone, Default)]
pub struct BearerTokenAuth {
    fallback_token: Option<SecretString>,
}

impl BearerTokenAuth {
    #[must_use]
    pub fn new(fallback_token: Option<SecretString>) -> Self {
        Self { fallback_token }
    }
}

#[async_trait]
impl AuthHeaderProvider for BearerTokenAuth {
    async fn headers(&self, context: &JobContext) -> Result<SecretHeaders, RoleGrantError> {
        let mut headers = SecretHeaders::new();

        if let Some(value) = context
            .secrets
            .get(AUTHORIZATION_SECRET)
            .filter(|v| !v.expose_secret().trim().is_empty())
        {
            headers.insert("Authorization", value.clone());
            return Ok(headers);
        }

        let token = context
            .secrets
            .get(BEARER_TOKEN_SECRET)
            .filter(|t| !t.expose_secret().trim().is_empty())
            .or_else(|| {
                debug!(target: "role_grant.auth", "No job token, using configured token");
                self.fallback_token.as_ref()
            })
            .filter(|t| !t.expose_secret().trim().is_empty())
            .ok_or_else(|| {
                RoleGrantError::Configuration(format!(
                    "missing directory credential: {BEARER_TOKEN_SECRET} not provided"
                ))
            })?;

        headers.insert("Authorization", authorization_value(token));
        Ok(headers)
    }
}

fn authorization_value(token: &SecretString) -> SecretString {
    let raw = token.expose_secret().trim();
    if raw.starts_with(BEARER_PREFIX) {
        SecretString::from(raw.to_string())
    } else {
        SecretString::from(format!("{BEARER_PREFIX}{raw}"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn context_with_token(token: &str) -> JobContext {
        let mut context = JobContext::default();
        context
            .secrets
            .insert(BEARER_TOKEN_SECRET.to_string(), SecretString::from(token));
        context
    }

    fn authorization(headers: &SecretHeaders) -> String {
        headers
            .get("authorization")
            .map(|v| v.expose_secret().to_string())
            .unwrap()
    }

    #[tokio::test]
    async fn test_prefixes_bearer() {
        let headers = BearerTokenAuth::default()
            .headers(&context_with_token("abc123"))
            .await
            .unwrap();
        assert_eq!(authorization(&headers), "Bearer abc123");
    }

    #[tokio::test]
    async fn test_keeps_existing_prefix() {
        let headers = BearerTokenAuth::default()
            .headers(&context_with_token("Bearer abc123"))
            .await
            .unwrap();
        assert_eq!(authorization(&headers), "Bearer abc123");
    }

    #[tokio::test]
    async fn test_fallback_token() {
        let auth = BearerTokenAuth::new(Some(SecretString::from("configured")));
        let headers = auth.headers(&JobContext::default()).await.unwrap();
        assert_eq!(authorization(&headers), "Bearer configured");
    }

    #[tokio::test]
    async fn test_authorization_secret_passes_through() {
        let mut context = context_with_token("ignored");
        context.secrets.insert(
            AUTHORIZATION_SECRET.to_string(),
            SecretString::from("Basic dXNlcjpwYXNz"),
        );
        let headers = BearerTokenAuth::default().headers(&context).await.unwrap();
        assert_eq!(authorization(&headers), "Basic dXNlcjpwYXNz");
    }

    #[tokio::test]
    async fn test_missing_token_is_configuration_error() {
        let err = BearerTokenAuth::default()
            .headers(&context_with_token("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, RoleGrantError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_debug_does_not_leak_token() {
        let auth = BearerTokenAuth::new(Some(SecretString::from("super-secret")));
        assert!(!format!("{auth:?}").contains("super-secret"));

        let headers = auth.headers(&JobContext::default()).await.unwrap();
        assert!(!format!("{headers:?}").contains("super-secret"));
    }
}
