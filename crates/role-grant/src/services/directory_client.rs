//! Directory (Microsoft Graph) HTTP client.
//!
//! Two calls are made against the directory:
//!
//! - `GET {base}/v1.0/users/{upn}` resolves a principal name to an object id
//! - `POST {base}/v1.0/roleManagement/directory/roleAssignmentScheduleRequests`
//!   creates the role assignment schedule request
//!
//! Neither call is retried here; non-2xx responses are returned as
//! structured errors and the job framework decides what to do with them.
//!
//! # Security
//!
//! - Header values (bearer token) are only exposed when building the request
//! - Response bodies of failed calls are logged at debug level only
//! - Timeouts prevent hanging connections

use crate::errors::{AssignmentPhase, RoleGrantError};
use crate::models::{GrantRequest, ResolvedIdentity, ScheduleRequestCreated};
use crate::observability::metrics::record_directory_request;
use common::secret::{ExposeSecret, SecretHeaders};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, error, instrument, warn};

/// Graph API version segment.
pub const GRAPH_API_VERSION: &str = "v1.0";

/// Resource path of role assignment schedule requests (below the version).
pub const SCHEDULE_REQUESTS_PATH: &str = "roleManagement/directory/roleAssignmentScheduleRequests";

/// Default request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connect timeout for the HTTP client.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum length of an error body kept for diagnostics.
const MAX_ERROR_DETAIL_LEN: usize = 256;

const OP_GET_USER: &str = "get_user";
const OP_CREATE_SCHEDULE_REQUEST: &str = "create_schedule_request";

/// Where and how to reach the directory for one invocation.
#[derive(Debug, Clone)]
pub struct DirectoryTarget {
    /// Root URL without the API version, e.g. `https://graph.microsoft.com`.
    pub base_url: String,

    /// Headers sent with every call (authorization included).
    pub headers: SecretHeaders,
}

impl DirectoryTarget {
    #[must_use]
    pub fn new(base_url: impl Into<String>, headers: SecretHeaders) -> Self {
        Self {
            base_url: base_url.into(),
            headers,
        }
    }

    /// URL of the user resource for `principal_name` (percent-encoded).
    #[must_use]
    pub fn user_url(&self, principal_name: &str) -> String {
        format!(
            "{}/{}/users/{}",
            self.base_url.trim_end_matches('/'),
            GRAPH_API_VERSION,
            urlencoding::encode(principal_name)
        )
    }

    /// URL of the schedule request collection.
    #[must_use]
    pub fn schedule_requests_url(&self) -> String {
        format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            GRAPH_API_VERSION,
            SCHEDULE_REQUESTS_PATH
        )
    }
}

/// `OData` error response returned by Graph on failures.
#[derive(Debug, Deserialize)]
struct ODataError {
    error: ODataErrorBody,
}

#[derive(Debug, Deserialize)]
struct ODataErrorBody {
    code: String,
    message: String,
}

/// Directory operations used by the orchestrator.
#[async_trait::async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Resolve a user principal name to its object id.
    async fn get_user(
        &self,
        target: &DirectoryTarget,
        principal_name: &str,
    ) -> Result<ResolvedIdentity, RoleGrantError>;

    /// Create a role assignment schedule request.
    ///
    /// `principal_name` is only used for error reporting.
    async fn create_schedule_request(
        &self,
        target: &DirectoryTarget,
        principal_name: &str,
        grant: &GrantRequest,
    ) -> Result<ScheduleRequestCreated, RoleGrantError>;
}

/// `reqwest`-backed directory client.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct GraphDirectoryClient {
    client: Client,
}

impl GraphDirectoryClient {
    /// Create a client with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns `RoleGrantError::Configuration` if the HTTP client cannot be built.
    pub fn new(request_timeout: Duration) -> Result<Self, RoleGrantError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| {
                error!(target: "role_grant.directory_client", error = %e, "Failed to build HTTP client");
                RoleGrantError::Configuration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client })
    }

    fn with_headers(builder: RequestBuilder, headers: &SecretHeaders) -> RequestBuilder {
        headers
            .iter()
            .fold(builder, |builder, (name, value)| {
                builder.header(name, value.expose_secret())
            })
            .header("Accept", "application/json")
    }

    /// Send a request and record its metrics.
    async fn send(
        operation: &'static str,
        phase: AssignmentPhase,
        builder: RequestBuilder,
    ) -> Result<Response, RoleGrantError> {
        let start = Instant::now();
        match builder.send().await {
            Ok(response) => {
                record_directory_request(
                    operation,
                    Some(response.status().as_u16()),
                    start.elapsed(),
                );
                Ok(response)
            }
            Err(e) => {
                record_directory_request(operation, None, start.elapsed());
                warn!(
                    target: "role_grant.directory_client",
                    operation,
                    error = %e,
                    "Directory request failed before a response was received"
                );
                Err(RoleGrantError::Transport {
                    phase,
                    message: e.to_string(),
                })
            }
        }
    }

    /// Parse a 2xx body and pull out its `id`.
    async fn json_with_id(
        phase: AssignmentPhase,
        response: Response,
    ) -> Result<(String, serde_json::Value), RoleGrantError> {
        let body: serde_json::Value = response.json().await.map_err(|e| {
            warn!(target: "role_grant.directory_client", %phase, error = %e, "Failed to parse directory response");
            RoleGrantError::InvalidResponse {
                phase,
                message: format!("response body is not valid JSON: {e}"),
            }
        })?;

        let id = body
            .get("id")
            .and_then(serde_json::Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| RoleGrantError::InvalidResponse {
                phase,
                message: "response body has no 'id'".to_string(),
            })?;

        Ok((id, body))
    }
}

/// Status line parts and a short diagnostic for a failed response.
async fn failure_details(response: Response) -> (u16, String, Option<String>) {
    let status = response.status();
    let status_text = status_text(status);
    let body = response.text().await.unwrap_or_default();

    debug!(
        target: "role_grant.directory_client",
        status = status.as_u16(),
        body = %body,
        "Directory error response body"
    );

    (status.as_u16(), status_text, odata_detail(&body))
}

fn status_text(status: StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("Unknown Status")
        .to_string()
}

/// `code: message` from a Graph error body, truncated.
fn odata_detail(body: &str) -> Option<String> {
    let parsed: ODataError = serde_json::from_str(body).ok()?;
    let detail = format!("{}: {}", parsed.error.code, parsed.error.message);
    if detail.chars().count() > MAX_ERROR_DETAIL_LEN {
        let truncated: String = detail.chars().take(MAX_ERROR_DETAIL_LEN).collect();
        Some(format!("{truncated}..."))
    } else {
        Some(detail)
    }
}

#[async_trait::async_trait]
impl DirectoryClient for GraphDirectoryClient {
    #[instrument(skip_all, fields(principal_name = %principal_name))]
    async fn get_user(
        &self,
        target: &DirectoryTarget,
        principal_name: &str,
    ) -> Result<ResolvedIdentity, RoleGrantError> {
        let phase = AssignmentPhase::IdentityResolution;
        let url = target.user_url(principal_name);

        debug!(target: "role_grant.directory_client", url = %url, "Resolving user");

        let builder = Self::with_headers(self.client.get(&url), &target.headers);
        let response = Self::send(OP_GET_USER, phase, builder).await?;

        if !response.status().is_success() {
            let (status_code, status_text, detail) = failure_details(response).await;
            warn!(
                target: "role_grant.directory_client",
                status = status_code,
                principal_name = %principal_name,
                "User lookup rejected by directory"
            );
            return Err(RoleGrantError::IdentityResolution {
                principal_name: principal_name.to_string(),
                status_code,
                status_text,
                detail,
            });
        }

        let (identity_id, _) = Self::json_with_id(phase, response).await?;
        Ok(ResolvedIdentity { identity_id })
    }

    #[instrument(skip_all, fields(role_id = %grant.role_definition_id, principal_id = %grant.principal_id))]
    async fn create_schedule_request(
        &self,
        target: &DirectoryTarget,
        principal_name: &str,
        grant: &GrantRequest,
    ) -> Result<ScheduleRequestCreated, RoleGrantError> {
        let phase = AssignmentPhase::GrantCreation;
        let url = target.schedule_requests_url();

        debug!(target: "role_grant.directory_client", url = %url, "Creating role assignment schedule request");

        let builder = Self::with_headers(self.client.post(&url), &target.headers).json(grant);
        let response = Self::send(OP_CREATE_SCHEDULE_REQUEST, phase, builder).await?;

        if !response.status().is_success() {
            let (status_code, status_text, detail) = failure_details(response).await;
            warn!(
                target: "role_grant.directory_client",
                status = status_code,
                role_id = %grant.role_definition_id,
                "Schedule request rejected by directory"
            );
            return Err(RoleGrantError::GrantCreation {
                principal_name: principal_name.to_string(),
                role_id: grant.role_definition_id.clone(),
                identity_id: grant.principal_id.clone(),
                status_code,
                status_text,
                detail,
            });
        }

        let (request_id, raw_response) = Self::json_with_id(phase, response).await?;
        Ok(ScheduleRequestCreated {
            request_id,
            raw_response,
        })
    }
}

/// Mock directory client module for testing.
///
/// Records every call so tests can assert that a phase never ran.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Mock directory client for unit testing.
    pub struct MockDirectoryClient {
        user: Result<ResolvedIdentity, RoleGrantError>,
        grant: Result<ScheduleRequestCreated, RoleGrantError>,
        get_user_calls: AtomicUsize,
        create_calls: AtomicUsize,
        last_grant: Mutex<Option<GrantRequest>>,
    }

    impl MockDirectoryClient {
        /// Mock where both calls succeed.
        pub fn succeeding(identity_id: &str, request_id: &str) -> Self {
            Self {
                user: Ok(ResolvedIdentity {
                    identity_id: identity_id.to_string(),
                }),
                grant: Ok(ScheduleRequestCreated {
                    request_id: request_id.to_string(),
                    raw_response: serde_json::json!({ "id": request_id, "status": "Provisioned" }),
                }),
                get_user_calls: AtomicUsize::new(0),
                create_calls: AtomicUsize::new(0),
                last_grant: Mutex::new(None),
            }
        }

        /// Replace the user lookup result with an error.
        #[must_use]
        pub fn with_user_error(mut self, err: RoleGrantError) -> Self {
            self.user = Err(err);
            self
        }

        /// Replace the schedule request result with an error.
        #[must_use]
        pub fn with_grant_error(mut self, err: RoleGrantError) -> Self {
            self.grant = Err(err);
            self
        }

        /// Number of `get_user` calls made.
        pub fn get_user_calls(&self) -> usize {
            self.get_user_calls.load(Ordering::SeqCst)
        }

        /// Number of `create_schedule_request` calls made.
        pub fn create_calls(&self) -> usize {
            self.create_calls.load(Ordering::SeqCst)
        }

        /// Total calls made.
        pub fn total_calls(&self) -> usize {
            self.get_user_calls() + self.create_calls()
        }

        /// Body of the last schedule request.
        pub fn last_grant(&self) -> Option<GrantRequest> {
            self.last_grant.lock().ok().and_then(|g| g.clone())
        }
    }

    #[async_trait::async_trait]
    impl DirectoryClient for MockDirectoryClient {
        async fn get_user(
            &self,
            _target: &DirectoryTarget,
            _principal_name: &str,
        ) -> Result<ResolvedIdentity, RoleGrantError> {
            self.get_user_calls.fetch_add(1, Ordering::SeqCst);
            self.user.clone()
        }

        async fn create_schedule_request(
            &self,
            _target: &DirectoryTarget,
            _principal_name: &str,
            grant: &GrantRequest,
        ) -> Result<ScheduleRequestCreated, RoleGrantError> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut last) = self.last_grant.lock() {
                *last = Some(grant.clone());
            }
            self.grant.clone()
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::models::{AssignmentRequest, ResolvedIdentity};
    use common::secret::SecretString;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn target(base_url: &str) -> DirectoryTarget {
        let mut headers = SecretHeaders::new();
        headers.insert("Authorization", SecretString::from("Bearer test-token"));
        DirectoryTarget::new(base_url, headers)
    }

    fn client() -> GraphDirectoryClient {
        GraphDirectoryClient::new(Duration::from_secs(5)).unwrap()
    }

    fn grant() -> GrantRequest {
        GrantRequest::new(
            &AssignmentRequest::new("alice@contoso.com", "role-1"),
            &ResolvedIdentity {
                identity_id: "user-1".to_string(),
            },
            chrono::Utc::now(),
        )
    }

    #[test]
    fn test_user_url_is_percent_encoded() {
        let t = target("https://graph.microsoft.com/");
        assert_eq!(
            t.user_url("user+test@example.com"),
            "https://graph.microsoft.com/v1.0/users/user%2Btest%40example.com"
        );
        assert_eq!(
            t.user_url("first last@example.com"),
            "https://graph.microsoft.com/v1.0/users/first%20last%40example.com"
        );
    }

    #[test]
    fn test_schedule_requests_url() {
        assert_eq!(
            target("https://graph.microsoft.com").schedule_requests_url(),
            "https://graph.microsoft.com/v1.0/roleManagement/directory/roleAssignmentScheduleRequests"
        );
    }

    #[test]
    fn test_odata_detail() {
        let body = r#"{"error":{"code":"Request_ResourceNotFound","message":"Resource 'x' does not exist."}}"#;
        assert_eq!(
            odata_detail(body).as_deref(),
            Some("Request_ResourceNotFound: Resource 'x' does not exist.")
        );
        assert_eq!(odata_detail("not json"), None);

        let long = format!(
            r#"{{"error":{{"code":"C","message":"{}"}}}}"#,
            "m".repeat(400)
        );
        assert!(odata_detail(&long).unwrap().ends_with("..."));
    }

    #[tokio::test]
    async fn test_get_user_sends_auth_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1.0/users/alice%40contoso.com"))
            .and(header("Authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "user-1",
                "userPrincipalName": "alice@contoso.com"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let identity = client()
            .get_user(&target(&server.uri()), "alice@contoso.com")
            .await
            .unwrap();

        assert_eq!(identity.identity_id, "user-1");
    }

    #[tokio::test]
    async fn test_get_user_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": { "code": "Request_ResourceNotFound", "message": "Resource does not exist." }
            })))
            .mount(&server)
            .await;

        let err = client()
            .get_user(&target(&server.uri()), "ghost@contoso.com")
            .await
            .unwrap_err();

        match err {
            RoleGrantError::IdentityResolution {
                principal_name,
                status_code,
                status_text,
                detail,
            } => {
                assert_eq!(principal_name, "ghost@contoso.com");
                assert_eq!(status_code, 404);
                assert_eq!(status_text, "Not Found");
                assert_eq!(
                    detail.as_deref(),
                    Some("Request_ResourceNotFound: Resource does not exist.")
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_get_user_without_id_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "displayName": "Alice"
            })))
            .mount(&server)
            .await;

        let err = client()
            .get_user(&target(&server.uri()), "alice@contoso.com")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RoleGrantError::InvalidResponse {
                phase: AssignmentPhase::IdentityResolution,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_create_schedule_request_posts_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/v1.0/{SCHEDULE_REQUESTS_PATH}")))
            .and(header("Authorization", "Bearer test-token"))
            .and(body_partial_json(serde_json::json!({
                "action": "adminAssign",
                "roleDefinitionId": "role-1",
                "principalId": "user-1",
                "directoryScopeId": "/",
                "scheduleInfo": { "expiration": { "type": "noExpiration" } }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": "req-1",
                "status": "Provisioned"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let created = client()
            .create_schedule_request(&target(&server.uri()), "alice@contoso.com", &grant())
            .await
            .unwrap();

        assert_eq!(created.request_id, "req-1");
        assert_eq!(created.raw_response["status"], "Provisioned");
    }

    #[tokio::test]
    async fn test_create_schedule_request_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = client()
            .create_schedule_request(&target(&server.uri()), "alice@contoso.com", &grant())
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), Some(403));
        let message = err.to_string();
        assert!(message.contains("role-1"));
        assert!(message.contains("alice@contoso.com"));
        assert!(matches!(
            err,
            RoleGrantError::GrantCreation { ref identity_id, .. } if identity_id == "user-1"
        ));
    }

    #[tokio::test]
    async fn test_connection_failure_is_transport_error() {
        // Nothing listens on this port once the server is dropped.
        let uri = {
            let server = MockServer::builder().start().await;
            server.uri()
        };

        let err = client()
            .get_user(&target(&uri), "alice@contoso.com")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RoleGrantError::Transport {
                phase: AssignmentPhase::IdentityResolution,
                ..
            }
        ));
    }
}
