//! Mock directory (Microsoft Graph) server.
//!
//! Wraps a wiremock `MockServer` with the two endpoints used by the job:
//! - `GET /v1.0/users/{upn}`
//! - `POST /v1.0/roleManagement/directory/roleAssignmentScheduleRequests`

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// Path of the user resource for `principal_name`, percent-encoded.
#[must_use]
pub fn user_path(principal_name: &str) -> String {
    format!("/v1.0/users/{}", urlencoding::encode(principal_name))
}

/// Path of the schedule request collection.
pub const SCHEDULE_REQUESTS_PATH: &str =
    "/v1.0/roleManagement/directory/roleAssignmentScheduleRequests";

/// OData error body as returned by the directory.
#[must_use]
pub fn odata_error(code: &str, message: &str) -> Value {
    json!({ "error": { "code": code, "message": message } })
}

/// Mock directory server.
pub struct MockDirectory {
    server: MockServer,
}

impl MockDirectory {
    /// Start a server with no endpoints mounted (every call returns 404).
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL to pass as `address`.
    #[must_use]
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Underlying server, for custom mocks.
    #[must_use]
    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// Resolve `principal_name` to `user_id`.
    pub async fn with_user(&self, principal_name: &str, user_id: &str) {
        Mock::given(method("GET"))
            .and(path(user_path(principal_name)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": user_id,
                "userPrincipalName": principal_name,
                "displayName": "Test User"
            })))
            .mount(&self.server)
            .await;
    }

    /// Fail the lookup of `principal_name` with `status`.
    pub async fn with_user_error(&self, principal_name: &str, status: u16, code: &str, message: &str) {
        Mock::given(method("GET"))
            .and(path(user_path(principal_name)))
            .respond_with(ResponseTemplate::new(status).set_body_json(odata_error(code, message)))
            .mount(&self.server)
            .await;
    }

    /// Accept schedule requests, answering with `request_id`.
    pub async fn with_schedule_request(&self, request_id: &str) {
        Mock::given(method("POST"))
            .and(path(SCHEDULE_REQUESTS_PATH))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": request_id,
                "status": "Provisioned",
                "action": "adminAssign"
            })))
            .mount(&self.server)
            .await;
    }

    /// Reject schedule requests with `status`.
    pub async fn with_schedule_request_error(&self, status: u16, code: &str, message: &str) {
        Mock::given(method("POST"))
            .and(path(SCHEDULE_REQUESTS_PATH))
            .respond_with(ResponseTemplate::new(status).set_body_json(odata_error(code, message)))
            .mount(&self.server)
            .await;
    }

    /// Every request received so far.
    pub async fn received_requests(&self) -> Vec<Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// Number of user lookups received.
    pub async fn user_lookups(&self) -> usize {
        self.received_requests()
            .await
            .iter()
            .filter(|r| r.method.as_str() == "GET" && r.url.path().starts_with("/v1.0/users/"))
            .count()
    }

    /// Paths of user lookups, as received (percent-encoded).
    pub async fn user_lookup_paths(&self) -> Vec<String> {
        self.received_requests()
            .await
            .iter()
            .filter(|r| r.method.as_str() == "GET")
            .map(|r| r.url.path().to_string())
            .collect()
    }

    /// JSON bodies of schedule requests received.
    pub async fn schedule_requests(&self) -> Vec<Value> {
        self.received_requests()
            .await
            .iter()
            .filter(|r| r.method.as_str() == "POST" && r.url.path() == SCHEDULE_REQUESTS_PATH)
            .map(|r| serde_json::from_slice(&r.body).expect("schedule request body is JSON"))
            .collect()
    }

    /// Total number of requests received.
    pub async fn total_requests(&self) -> usize {
        self.received_requests().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_path_encodes_principal_name() {
        assert_eq!(
            user_path("user+test@example.com"),
            "/v1.0/users/user%2Btest%40example.com"
        );
    }

    #[tokio::test]
    async fn test_fresh_server_has_no_requests() {
        let directory = MockDirectory::start().await;
        assert_eq!(directory.total_requests().await, 0);
        assert!(directory.schedule_requests().await.is_empty());
    }
}
