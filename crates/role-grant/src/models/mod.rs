//! Data models for the role grant job.
//!
//! Everything here is request-scoped: built for one invocation and dropped
//! with it.

use crate::errors::{ErrorReport, RoleGrantError};
use chrono::{DateTime, SecondsFormat, Utc};
use common::secret::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Directory scope used when the job does not name one (tenant-wide).
pub const DEFAULT_DIRECTORY_SCOPE_ID: &str = "/";

/// Justification used when the job does not supply one.
pub const DEFAULT_JUSTIFICATION: &str = "Approved by SGNL.ai";

/// Halt reason used when the job does not supply one.
pub const DEFAULT_HALT_REASON: &str = "unspecified";

// ============================================================================
// Job surface
// ============================================================================

/// Parameters as delivered by the job framework.
///
/// Every field is optional on the wire; [`AssignmentRequest::from_params`]
/// enforces the required ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobParams {
    /// User principal name to resolve (required for `invoke`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_principal_name: Option<String>,

    /// Role definition ID to assign (required for `invoke`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_id: Option<String>,

    /// Directory scope, `/` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory_scope_id: Option<String>,

    /// Justification recorded on the schedule request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,

    /// Directory base URL override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Halt reason (only read by `halt`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Execution context supplied by the job framework.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobContext {
    /// Credentials, e.g. `BEARER_AUTH_TOKEN`. Never logged.
    #[serde(default)]
    pub secrets: HashMap<String, SecretString>,

    /// Non-secret environment settings, e.g. `address`.
    #[serde(default)]
    pub config: HashMap<String, String>,

    /// Job-scoped data used to resolve `{$.path}` placeholders in params.
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Entry point selected by the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobOperation {
    Invoke,
    Error,
    Halt,
}

/// One request read by the `role-grant` runner.
#[derive(Debug, Clone, Deserialize)]
pub struct JobEnvelope {
    pub operation: JobOperation,

    #[serde(default)]
    pub params: JobParams,

    #[serde(default)]
    pub context: JobContext,

    /// Previously raised error (only for `error`).
    #[serde(default)]
    pub error: Option<ErrorReport>,
}

/// Terminal status reported to the job framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Success,
    Halted,
    RetryRequested,
}

/// Successful `invoke` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantSummary {
    pub status: JobStatus,
    pub user_principal_name: String,
    pub role_id: String,
    pub user_id: String,
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Result of `halt`, or of an `invoke` that observed a halt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HaltResponse {
    pub status: JobStatus,
    pub reason: String,
    pub halted_at: DateTime<Utc>,
}

impl HaltResponse {
    #[must_use]
    pub fn new(reason: impl Into<String>, halted_at: DateTime<Utc>) -> Self {
        Self {
            status: JobStatus::Halted,
            reason: reason.into(),
            halted_at,
        }
    }
}

/// Result of `error` when the failure may be retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryResponse {
    pub status: JobStatus,
    /// Message of the error being retried.
    pub reason: String,
    /// Local delay already applied before answering.
    pub retry_after_ms: u64,
}

/// Result of `invoke`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InvokeResponse {
    Success(GrantSummary),
    Halted(HaltResponse),
}

// ============================================================================
// Assignment flow
// ============================================================================

/// Validated input of one assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentRequest {
    pub principal_name: String,
    pub role_id: String,
    pub scope_id: String,
    pub justification: String,
}

impl AssignmentRequest {
    /// Request with the default scope and justification.
    #[must_use]
    pub fn new(principal_name: impl Into<String>, role_id: impl Into<String>) -> Self {
        Self {
            principal_name: principal_name.into(),
            role_id: role_id.into(),
            scope_id: DEFAULT_DIRECTORY_SCOPE_ID.to_string(),
            justification: DEFAULT_JUSTIFICATION.to_string(),
        }
    }

    #[must_use]
    pub fn with_scope_id(mut self, scope_id: impl Into<String>) -> Self {
        self.scope_id = scope_id.into();
        self
    }

    #[must_use]
    pub fn with_justification(mut self, justification: impl Into<String>) -> Self {
        self.justification = justification.into();
        self
    }

    /// Build a request from job params, applying defaults.
    ///
    /// Blank optional params fall back to their defaults.
    ///
    /// # Errors
    ///
    /// `RoleGrantError::Validation` if `userPrincipalName` or `roleId` is
    /// missing or blank.
    pub fn from_params(params: &JobParams) -> Result<Self, RoleGrantError> {
        let principal_name = required(params.user_principal_name.as_deref(), "userPrincipalName")?;
        let role_id = required(params.role_id.as_deref(), "roleId")?;

        let mut request = Self::new(principal_name, role_id);
        if let Some(scope_id) = non_blank(params.directory_scope_id.as_deref()) {
            request = request.with_scope_id(scope_id);
        }
        if let Some(justification) = non_blank(params.justification.as_deref()) {
            request = request.with_justification(justification);
        }
        Ok(request)
    }

    /// Check the invariants that must hold before any network call.
    ///
    /// # Errors
    ///
    /// `RoleGrantError::Validation` naming the first blank field.
    pub fn validate(&self) -> Result<(), RoleGrantError> {
        required(Some(self.principal_name.as_str()), "userPrincipalName")?;
        required(Some(self.role_id.as_str()), "roleId")?;
        Ok(())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, RoleGrantError> {
    non_blank(value).ok_or_else(|| RoleGrantError::Validation(format!("{name} is required")))
}

/// Output of identity resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub identity_id: String,
}

/// Schedule request action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScheduleAction {
    AdminAssign,
}

/// Expiration type of a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExpirationType {
    NoExpiration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleExpiration {
    #[serde(rename = "type")]
    pub expiration_type: ExpirationType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleInfo {
    /// RFC 3339 UTC start time.
    pub start_date_time: String,
    pub expiration: ScheduleExpiration,
}

/// Body of the schedule request POST.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantRequest {
    pub action: ScheduleAction,
    pub justification: String,
    pub role_definition_id: String,
    pub directory_scope_id: String,
    pub principal_id: String,
    pub schedule_info: ScheduleInfo,
}

impl GrantRequest {
    /// Permanent assignment starting at `now`.
    #[must_use]
    pub fn new(
        request: &AssignmentRequest,
        identity: &ResolvedIdentity,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            action: ScheduleAction::AdminAssign,
            justification: request.justification.clone(),
            role_definition_id: request.role_id.clone(),
            directory_scope_id: request.scope_id.clone(),
            principal_id: identity.identity_id.clone(),
            schedule_info: ScheduleInfo {
                start_date_time: now.to_rfc3339_opts(SecondsFormat::Millis, true),
                expiration: ScheduleExpiration {
                    expiration_type: ExpirationType::NoExpiration,
                },
            },
        }
    }
}

/// Created schedule request as returned by the directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleRequestCreated {
    pub request_id: String,
    pub raw_response: serde_json::Value,
}

/// Outcome of a completed assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentResult {
    pub identity_id: String,
    pub request_id: String,
    pub raw_response: serde_json::Value,
}
