//! Metrics definitions for the role grant job.
//!
//! All metrics follow Prometheus naming conventions:
//! - `role_grant_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `operation`: `get_user`, `create_schedule_request`
//! - `status`: `success`, `client_error`, `server_error`, `throttled`, `transport_error`
//! - `outcome`: see [`AssignmentOutcome`]
//!
//! Only the facade is used here; the host process installs a recorder.

use metrics::{counter, histogram};
use std::time::Duration;

/// Final outcome of one `invoke`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentOutcome {
    Granted,
    ValidationFailed,
    IdentityResolutionFailed,
    GrantCreationFailed,
    Halted,
    Error,
}

impl AssignmentOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AssignmentOutcome::Granted => "granted",
            AssignmentOutcome::ValidationFailed => "validation_failed",
            AssignmentOutcome::IdentityResolutionFailed => "identity_resolution_failed",
            AssignmentOutcome::GrantCreationFailed => "grant_creation_failed",
            AssignmentOutcome::Halted => "halted",
            AssignmentOutcome::Error => "error",
        }
    }
}

/// Record one directory API call.
///
/// Metric: `role_grant_directory_requests_total`, `role_grant_directory_request_duration_seconds`
/// Labels: `operation`, `status`
///
/// `status_code` is `None` when no HTTP response was received.
pub fn record_directory_request(
    operation: &'static str,
    status_code: Option<u16>,
    duration: Duration,
) {
    let status = categorize_status_code(status_code);

    histogram!("role_grant_directory_request_duration_seconds",
        "operation" => operation
    )
    .record(duration.as_secs_f64());

    counter!("role_grant_directory_requests_total",
        "operation" => operation,
        "status" => status
    )
    .increment(1);
}

/// Record the outcome of one assignment.
///
/// Metric: `role_grant_assignments_total`
/// Labels: `outcome`
pub fn record_assignment_outcome(outcome: AssignmentOutcome) {
    counter!("role_grant_assignments_total", "outcome" => outcome.as_str()).increment(1);
}

/// Record a decision of the `error` entry point.
///
/// Metric: `role_grant_error_dispositions_total`
/// Labels: `kind`, `retry`
pub fn record_error_disposition(kind: &'static str, retry: bool) {
    let retry = if retry { "true" } else { "false" };
    counter!("role_grant_error_dispositions_total",
        "kind" => kind,
        "retry" => retry
    )
    .increment(1);
}

/// Categorize an HTTP status code into a bounded label.
fn categorize_status_code(status_code: Option<u16>) -> &'static str {
    match status_code {
        None => "transport_error",
        Some(200..=299) => "success",
        Some(429) => "throttled",
        Some(500..=599) => "server_error",
        Some(_) => "client_error",
    }
}
