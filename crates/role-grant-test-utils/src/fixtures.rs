//! Pre-configured params, contexts and handlers for role grant tests.

use common::secret::SecretString;
use role_grant::config::Config;
use role_grant::handlers::JobHandler;
use role_grant::models::{JobContext, JobParams};

/// Token placed in test contexts.
pub const TEST_TOKEN: &str = "test-token";

/// Params with the two required fields set.
#[must_use]
pub fn job_params(principal_name: &str, role_id: &str) -> JobParams {
    JobParams {
        user_principal_name: Some(principal_name.to_string()),
        role_id: Some(role_id.to_string()),
        ..JobParams::default()
    }
}

/// Params for `halt`.
#[must_use]
pub fn halt_params(reason: Option<&str>) -> JobParams {
    JobParams {
        reason: reason.map(String::from),
        ..JobParams::default()
    }
}

/// Context pointing at `base_url` with a bearer token.
#[must_use]
pub fn job_context(base_url: &str) -> JobContext {
    let mut context = JobContext::default();
    context
        .secrets
        .insert("BEARER_AUTH_TOKEN".to_string(), SecretString::from(TEST_TOKEN));
    context
        .config
        .insert("address".to_string(), base_url.to_string());
    context
}

/// Handler backed by the real Graph client and default configuration.
#[must_use]
pub fn graph_handler() -> JobHandler {
    JobHandler::new(&Config::default()).expect("default handler builds")
}
