//! Job entry points: `invoke`, `error` and `halt`.
//!
//! `invoke` runs one assignment. `error` decides whether a previously raised
//! failure is retried. `halt` fires the handler's halt signal and never
//! touches the network.

use crate::config::Config;
use crate::errors::{ErrorKind, ErrorReport, RoleGrantError};
use crate::models::{
    AssignmentRequest, GrantSummary, HaltResponse, InvokeResponse, JobContext, JobEnvelope,
    JobOperation, JobParams, JobStatus, RetryResponse, DEFAULT_HALT_REASON,
};
use crate::observability::metrics::{
    record_assignment_outcome, record_error_disposition, AssignmentOutcome,
};
use crate::services::{
    AuthHeaderProvider, BaseUrlResolver, BearerTokenAuth, DefaultBaseUrlResolver,
    DirectoryClient, DirectoryTarget, GraphDirectoryClient, HaltSignal,
    JobDataTemplateResolver, RoleAssignmentOrchestrator, TemplateResolver,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Handles the three job entry points for exactly one job instance.
///
/// Build a new handler per job. Halting is irreversible: once `halt` has
/// been called, every later `invoke` on this handler or any of its clones
/// reports halted without contacting the directory. Clones share the
/// directory client and the halt signal.
#[derive(Clone)]
pub struct JobHandler {
    orchestrator: RoleAssignmentOrchestrator,
    base_url: Arc<dyn BaseUrlResolver>,
    auth: Arc<dyn AuthHeaderProvider>,
    templates: Arc<dyn TemplateResolver>,
    halt: HaltSignal,
    retry_delay: Duration,
}

impl JobHandler {
    /// Handler backed by the Graph client with collaborators from `config`.
    ///
    /// # Errors
    ///
    /// `RoleGrantError::Configuration` if the HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self, RoleGrantError> {
        let client = GraphDirectoryClient::new(config.http_timeout)?;
        Ok(Self::builder(Arc::new(client))
            .base_url_resolver(Arc::new(DefaultBaseUrlResolver::new(
                config.default_base_url.clone(),
            )))
            .auth(Arc::new(BearerTokenAuth::new(config.access_token.clone())))
            .retry_delay(config.retry_delay)
            .build())
    }

    #[must_use]
    pub fn builder(client: Arc<dyn DirectoryClient>) -> JobHandlerBuilder {
        JobHandlerBuilder::new(client)
    }

    /// Signal shared with in-flight invocations.
    #[must_use]
    pub fn halt_signal(&self) -> HaltSignal {
        self.halt.clone()
    }

    /// Run one role assignment.
    ///
    /// A halt observed at a phase boundary is reported as
    /// `InvokeResponse::Halted`, not as an error.
    ///
    /// # Errors
    ///
    /// Any `RoleGrantError` other than `Halted`.
    #[instrument(skip_all, fields(invocation_id = %Uuid::new_v4()))]
    pub async fn invoke(
        &self,
        params: JobParams,
        context: &JobContext,
    ) -> Result<InvokeResponse, RoleGrantError> {
        let params = self.templates.resolve(&params, context);

        let request = AssignmentRequest::from_params(&params).map_err(|e| {
            warn!(target: "role_grant.handlers.job", error = %e, "Rejected job params");
            record_assignment_outcome(AssignmentOutcome::ValidationFailed);
            e
        })?;

        let target = self.target(&params, context).await.map_err(|e| {
            error!(target: "role_grant.handlers.job", error = %e, "Directory target unavailable");
            record_assignment_outcome(AssignmentOutcome::Error);
            e
        })?;

        match self
            .orchestrator
            .execute(&request, &target, &self.halt)
            .await
        {
            Ok(result) => Ok(InvokeResponse::Success(GrantSummary {
                status: JobStatus::Success,
                user_principal_name: request.principal_name,
                role_id: request.role_id,
                user_id: result.identity_id,
                request_id: result.request_id,
                address: params
                    .address
                    .map(|a| a.trim().to_string())
                    .filter(|a| !a.is_empty()),
            })),
            Err(RoleGrantError::Halted { reason, halted_at }) => {
                info!(target: "role_grant.handlers.job", reason = %reason, "Invocation halted");
                Ok(InvokeResponse::Halted(HaltResponse::new(reason, halted_at)))
            }
            Err(e) => {
                error!(
                    target: "role_grant.handlers.job",
                    error = %e,
                    error_type = e.error_type(),
                    status_code = ?e.status_code(),
                    "Role assignment failed"
                );
                Err(e)
            }
        }
    }

    /// Decide whether a previously raised error is retried.
    ///
    /// Retryable errors wait for the configured delay, then yield a
    /// `retry_requested` response.
    ///
    /// # Errors
    ///
    /// Fatal errors are returned unchanged.
    #[instrument(skip_all, fields(principal_name = ?params.user_principal_name))]
    pub async fn error(
        &self,
        report: ErrorReport,
        params: &JobParams,
    ) -> Result<RetryResponse, ErrorReport> {
        let kind = report.classify();
        let retry = kind.is_retryable();
        record_error_disposition(kind.as_str(), retry);

        if !retry {
            warn!(
                target: "role_grant.handlers.job",
                kind = kind.as_str(),
                error = %report,
                "Error is not retryable, re-raising"
            );
            return Err(report);
        }

        let retry_after_ms = u64::try_from(self.retry_delay.as_millis()).unwrap_or(u64::MAX);
        info!(
            target: "role_grant.handlers.job",
            kind = kind.as_str(),
            retry_after_ms,
            "Requesting retry"
        );

        if !self.retry_delay.is_zero() {
            tokio::time::sleep(self.retry_delay).await;
        }

        Ok(RetryResponse {
            status: JobStatus::RetryRequested,
            reason: report.message,
            retry_after_ms,
        })
    }

    /// Fire the halt signal. Makes no network calls.
    ///
    /// Repeated halts report the first reason and time.
    #[instrument(skip_all)]
    pub fn halt(&self, params: &JobParams) -> HaltResponse {
        let reason = params
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_HALT_REASON);

        let (reason, halted_at) = self.halt.halt(reason);
        info!(
            target: "role_grant.handlers.job",
            reason = %reason,
            halted_at = %halted_at,
            "Job halted"
        );
        HaltResponse::new(reason, halted_at)
    }

    /// Route one runner envelope to its entry point.
    ///
    /// # Errors
    ///
    /// The raised error, as an `ErrorReport`.
    pub async fn dispatch(&self, envelope: JobEnvelope) -> Result<serde_json::Value, ErrorReport> {
        let JobEnvelope {
            operation,
            params,
            context,
            error,
        } = envelope;

        match operation {
            JobOperation::Invoke => {
                let response = self.invoke(params, &context).await?;
                to_json(&response)
            }
            JobOperation::Error => {
                let report = error.ok_or_else(|| ErrorReport {
                    message: "error operation requires an 'error' object".to_string(),
                    status_code: None,
                    kind: Some(ErrorKind::Validation),
                })?;
                let response = self.error(report, &params).await?;
                to_json(&response)
            }
            JobOperation::Halt => to_json(&self.halt(&params)),
        }
    }

    async fn target(
        &self,
        params: &JobParams,
        context: &JobContext,
    ) -> Result<DirectoryTarget, RoleGrantError> {
        let base_url = self.base_url.resolve(params, context)?;
        let headers = self.auth.headers(context).await?;
        Ok(DirectoryTarget::new(base_url, headers))
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value, ErrorReport> {
    serde_json::to_value(value)
        .map_err(|e| ErrorReport::from_message(format!("Failed to encode response: {e}")))
}

/// Builder for [`JobHandler`] with substitutable collaborators.
pub struct JobHandlerBuilder {
    client: Arc<dyn DirectoryClient>,
    base_url: Arc<dyn BaseUrlResolver>,
    auth: Arc<dyn AuthHeaderProvider>,
    templates: Arc<dyn TemplateResolver>,
    halt: HaltSignal,
    retry_delay: Duration,
}

impl JobHandlerBuilder {
    fn new(client: Arc<dyn DirectoryClient>) -> Self {
        Self {
            client,
            base_url: Arc::new(DefaultBaseUrlResolver::default()),
            auth: Arc::new(BearerTokenAuth::default()),
            templates: Arc::new(JobDataTemplateResolver),
            halt: HaltSignal::new(),
            retry_delay: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn base_url_resolver(mut self, resolver: Arc<dyn BaseUrlResolver>) -> Self {
        self.base_url = resolver;
        self
    }

    #[must_use]
    pub fn auth(mut self, auth: Arc<dyn AuthHeaderProvider>) -> Self {
        self.auth = auth;
        self
    }

    #[must_use]
    pub fn template_resolver(mut self, templates: Arc<dyn TemplateResolver>) -> Self {
        self.templates = templates;
        self
    }

    #[must_use]
    pub fn halt_signal(mut self, halt: HaltSignal) -> Self {
        self.halt = halt;
        self
    }

    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    #[must_use]
    pub fn build(self) -> JobHandler {
        JobHandler {
            orchestrator: RoleAssignmentOrchestrator::new(self.client),
            base_url: self.base_url,
            auth: self.auth,
            templates: self.templates,
            halt: self.halt,
            retry_delay: self.retry_delay,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::errors::AssignmentPhase;
    use crate::services::directory_client::mock::MockDirectoryClient;
    use crate::services::NoopTemplateResolver;
    use common::secret::SecretString;

    fn context() -> JobContext {
        let mut context = JobContext::default();
        context.secrets.insert(
            "BEARER_AUTH_TOKEN".to_string(),
            SecretString::from("test-token"),
        );
        context
    }

    fn params() -> JobParams {
        JobParams {
            user_principal_name: Some("alice@contoso.com".to_string()),
            role_id: Some("role-1".to_string()),
            ..JobParams::default()
        }
    }

    fn handler(mock: &Arc<MockDirectoryClient>) -> JobHandler {
        JobHandler::builder(mock.clone()).build()
    }

    #[tokio::test]
    async fn test_invoke_success() {
        let mock = Arc::new(MockDirectoryClient::succeeding("user-1", "req-1"));

        let response = handler(&mock).invoke(params(), &context()).await.unwrap();

        let InvokeResponse::Success(summary) = response else {
            unreachable!("expected success");
        };
        assert_eq!(summary.status, JobStatus::Success);
        assert_eq!(summary.user_principal_name, "alice@contoso.com");
        assert_eq!(summary.role_id, "role-1");
        assert_eq!(summary.user_id, "user-1");
        assert_eq!(summary.request_id, "req-1");
        assert!(summary.address.is_none());
    }

    #[tokio::test]
    async fn test_invoke_echoes_address() {
        let mock = Arc::new(MockDirectoryClient::succeeding("user-1", "req-1"));
        let mut p = params();
        p.address = Some("graph.microsoft.us".to_string());

        let response = handler(&mock).invoke(p, &context()).await.unwrap();

        let InvokeResponse::Success(summary) = response else {
            unreachable!("expected success");
        };
        assert_eq!(summary.address.as_deref(), Some("graph.microsoft.us"));
    }

    #[tokio::test]
    async fn test_invoke_missing_params_makes_no_calls() {
        let mock = Arc::new(MockDirectoryClient::succeeding("user-1", "req-1"));
        let mut p = params();
        p.role_id = None;

        let err = handler(&mock).invoke(p, &context()).await.unwrap_err();

        assert!(matches!(err, RoleGrantError::Validation(_)));
        assert_eq!(mock.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_invoke_missing_credentials_makes_no_calls() {
        let mock = Arc::new(MockDirectoryClient::succeeding("user-1", "req-1"));

        let err = handler(&mock)
            .invoke(params(), &JobContext::default())
            .await
            .unwrap_err();

        assert!(matches!(err, RoleGrantError::Configuration(_)));
        assert_eq!(mock.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_invoke_after_halt_reports_halted() {
        let mock = Arc::new(MockDirectoryClient::succeeding("user-1", "req-1"));
        let handler = handler(&mock);
        handler.halt(&JobParams {
            reason: Some("timeout".to_string()),
            ..JobParams::default()
        });

        let response = handler.invoke(params(), &context()).await.unwrap();

        let InvokeResponse::Halted(halted) = response else {
            unreachable!("expected halted");
        };
        assert_eq!(halted.status, JobStatus::Halted);
        assert_eq!(halted.reason, "timeout");
        assert_eq!(mock.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_invoke_uses_template_resolver() {
        let mock = Arc::new(MockDirectoryClient::succeeding("user-1", "req-1"));
        let mut ctx = context();
        ctx.data = serde_json::json!({ "subject": { "upn": "bob@contoso.com" } });
        let mut p = params();
        p.user_principal_name = Some("{$.subject.upn}".to_string());

        let response = handler(&mock).invoke(p.clone(), &ctx).await.unwrap();
        let InvokeResponse::Success(summary) = response else {
            unreachable!("expected success");
        };
        assert_eq!(summary.user_principal_name, "bob@contoso.com");

        let raw = JobHandler::builder(mock.clone())
            .template_resolver(Arc::new(NoopTemplateResolver))
            .build()
            .invoke(p, &ctx)
            .await
            .unwrap();
        let InvokeResponse::Success(summary) = raw else {
            unreachable!("expected success");
        };
        assert_eq!(summary.user_principal_name, "{$.subject.upn}");
    }

    #[tokio::test]
    async fn test_invoke_grant_failure_is_raised() {
        let mock = Arc::new(MockDirectoryClient::succeeding("user-1", "req-1").with_grant_error(
            RoleGrantError::GrantCreation {
                principal_name: "alice@contoso.com".to_string(),
                role_id: "role-1".to_string(),
                identity_id: "user-1".to_string(),
                status_code: 400,
                status_text: "Bad Request".to_string(),
                detail: None,
            },
        ));

        let err = handler(&mock).invoke(params(), &context()).await.unwrap_err();

        assert_eq!(err.phase(), Some(AssignmentPhase::GrantCreation));
        assert_eq!(mock.get_user_calls(), 1);
        assert_eq!(mock.create_calls(), 1);
    }

    #[tokio::test]
    async fn test_error_retries_transient() {
        let mock = Arc::new(MockDirectoryClient::succeeding("user-1", "req-1"));
        let report = ErrorReport::from_message("Directory returned 503 Service Unavailable");

        let response = handler(&mock).error(report, &params()).await.unwrap();

        assert_eq!(response.status, JobStatus::RetryRequested);
        assert_eq!(response.reason, "Directory returned 503 Service Unavailable");
        assert_eq!(response.retry_after_ms, 0);
        assert_eq!(mock.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_error_reraises_fatal_unchanged() {
        let mock = Arc::new(MockDirectoryClient::succeeding("user-1", "req-1"));
        let handler = handler(&mock);

        for message in ["Unauthorized 401", "Forbidden 403", "Bad Request 400", "weird"] {
            let report = ErrorReport::from_message(message);
            let err = handler.error(report.clone(), &params()).await.unwrap_err();
            assert_eq!(err, report);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_applies_retry_delay() {
        let mock = Arc::new(MockDirectoryClient::succeeding("user-1", "req-1"));
        let handler = JobHandler::builder(mock)
            .retry_delay(Duration::from_millis(1500))
            .build();
        let report = ErrorReport {
            message: "throttled".to_string(),
            status_code: Some(429),
            kind: None,
        };

        let started = tokio::time::Instant::now();
        let response = handler.error(report, &params()).await.unwrap();

        assert_eq!(response.retry_after_ms, 1500);
        assert!(started.elapsed() >= Duration::from_millis(1500));
    }

    #[test]
    fn test_halt_defaults_reason() {
        let mock = Arc::new(MockDirectoryClient::succeeding("user-1", "req-1"));
        let handler = handler(&mock);

        let response = handler.halt(&JobParams::default());

        assert_eq!(response.status, JobStatus::Halted);
        assert_eq!(response.reason, DEFAULT_HALT_REASON);
        assert!(handler.halt_signal().is_halted());
        assert_eq!(mock.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_routes_operations() {
        let mock = Arc::new(MockDirectoryClient::succeeding("user-1", "req-1"));
        let handler = handler(&mock);

        let envelope: JobEnvelope = serde_json::from_value(serde_json::json!({
            "operation": "error",
            "error": { "message": "HTTP 504 Gateway Timeout" }
        }))
        .unwrap();
        let value = handler.dispatch(envelope).await.unwrap();
        assert_eq!(value["status"], "retry_requested");

        let envelope: JobEnvelope =
            serde_json::from_value(serde_json::json!({ "operation": "error" })).unwrap();
        let err = handler.dispatch(envelope).await.unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::Validation));

        let envelope: JobEnvelope = serde_json::from_value(serde_json::json!({
            "operation": "halt",
            "params": { "reason": "timeout" }
        }))
        .unwrap();
        let value = handler.dispatch(envelope).await.unwrap();
        assert_eq!(value["status"], "halted");
        assert_eq!(value["reason"], "timeout");
    }
}
