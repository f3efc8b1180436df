//! Role grant error types.
//!
//! Every failure carries its HTTP status as a structured field and maps to a
//! closed [`ErrorKind`], so retry decisions never depend on message text.
//! Messages still embed the status code for operators reading logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Step of the assignment flow an error or log line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentPhase {
    /// Parameter checks before any network call.
    Validation,
    /// `GET /users/{upn}`.
    IdentityResolution,
    /// `POST /roleManagement/directory/roleAssignmentScheduleRequests`.
    GrantCreation,
}

impl AssignmentPhase {
    /// Stable label for logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AssignmentPhase::Validation => "validation",
            AssignmentPhase::IdentityResolution => "identity_resolution",
            AssignmentPhase::GrantCreation => "grant_creation",
        }
    }
}

impl fmt::Display for AssignmentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retry classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad or missing input. Never retried.
    Validation,
    /// 401/403. Never retried.
    Authorization,
    /// 429/502/503/504. Retry may be requested.
    Transient,
    /// Anything else. Treated as fatal.
    Unknown,
}

impl ErrorKind {
    /// Whether the job framework may retry a failure of this kind.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient)
    }

    /// Stable label for logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Authorization => "authorization",
            ErrorKind::Transient => "transient",
            ErrorKind::Unknown => "unknown",
        }
    }
}

/// Classify an HTTP status code.
#[must_use]
pub fn classify_status(status_code: u16) -> ErrorKind {
    match status_code {
        401 | 403 => ErrorKind::Authorization,
        429 | 502 | 503 | 504 => ErrorKind::Transient,
        _ => ErrorKind::Unknown,
    }
}

/// Role grant error type.
#[derive(Debug, Clone, Error)]
pub enum RoleGrantError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(
        "Failed to resolve user '{principal_name}': {status_code} {status_text}{}",
        detail_suffix(.detail)
    )]
    IdentityResolution {
        principal_name: String,
        status_code: u16,
        status_text: String,
        detail: Option<String>,
    },

    #[error(
        "Failed to create role assignment for user '{principal_name}' with role '{role_id}': {status_code} {status_text}{}",
        detail_suffix(.detail)
    )]
    GrantCreation {
        principal_name: String,
        role_id: String,
        identity_id: String,
        status_code: u16,
        status_text: String,
        detail: Option<String>,
    },

    #[error("Invalid directory response during {phase}: {message}")]
    InvalidResponse {
        phase: AssignmentPhase,
        message: String,
    },

    #[error("Directory request failed during {phase}: {message}")]
    Transport {
        phase: AssignmentPhase,
        message: String,
    },

    #[error("Halted: {reason}")]
    Halted {
        reason: String,
        halted_at: DateTime<Utc>,
    },
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail
        .as_deref()
        .map(|d| format!(" ({d})"))
        .unwrap_or_default()
}

impl RoleGrantError {
    /// HTTP status returned by the directory, if the failure had one.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            RoleGrantError::IdentityResolution { status_code, .. }
            | RoleGrantError::GrantCreation { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    /// Phase the failure happened in. `None` for configuration and halt.
    #[must_use]
    pub fn phase(&self) -> Option<AssignmentPhase> {
        match self {
            RoleGrantError::Validation(_) => Some(AssignmentPhase::Validation),
            RoleGrantError::IdentityResolution { .. } => Some(AssignmentPhase::IdentityResolution),
            RoleGrantError::GrantCreation { .. } => Some(AssignmentPhase::GrantCreation),
            RoleGrantError::InvalidResponse { phase, .. }
            | RoleGrantError::Transport { phase, .. } => Some(*phase),
            RoleGrantError::Configuration(_) | RoleGrantError::Halted { .. } => None,
        }
    }

    /// Retry classification.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            RoleGrantError::Validation(_) | RoleGrantError::Configuration(_) => {
                ErrorKind::Validation
            }
            RoleGrantError::IdentityResolution { status_code, .. }
            | RoleGrantError::GrantCreation { status_code, .. } => classify_status(*status_code),
            RoleGrantError::InvalidResponse { .. }
            | RoleGrantError::Transport { .. }
            | RoleGrantError::Halted { .. } => ErrorKind::Unknown,
        }
    }

    /// Whether the job framework may retry this failure.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Short error type label (for metrics and the runner's output).
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            RoleGrantError::Validation(_) => "validation_error",
            RoleGrantError::Configuration(_) => "configuration_error",
            RoleGrantError::IdentityResolution { .. } => "identity_resolution_error",
            RoleGrantError::GrantCreation { .. } => "grant_creation_error",
            RoleGrantError::InvalidResponse { .. } => "invalid_response",
            RoleGrantError::Transport { .. } => "transport_error",
            RoleGrantError::Halted { .. } => "halted",
        }
    }
}

/// A previously raised error as handed back to the `error` entry point.
///
/// Errors raised by this crate carry `status_code` and `kind`. Reports that
/// only carry text (raised by other pipeline steps) are classified from the
/// first HTTP status found in `message`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct ErrorReport {
    /// Original error message, kept intact when re-raised.
    pub message: String,

    /// HTTP status of the failed directory call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,

    /// Classification decided when the error was raised.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

impl ErrorReport {
    /// Report with only a message.
    #[must_use]
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: None,
            kind: None,
        }
    }

    /// Classify this report.
    ///
    /// Order: explicit `kind`, then `status_code`, then a status code found
    /// in the message. Unclassifiable reports are `Unknown`.
    #[must_use]
    pub fn classify(&self) -> ErrorKind {
        if let Some(kind) = self.kind {
            return kind;
        }
        self.status_code
            .or_else(|| extract_status_code(&self.message))
            .map_or(ErrorKind::Unknown, classify_status)
    }
}

impl From<&RoleGrantError> for ErrorReport {
    fn from(err: &RoleGrantError) -> Self {
        Self {
            message: err.to_string(),
            status_code: err.status_code(),
            kind: Some(err.kind()),
        }
    }
}

impl From<RoleGrantError> for ErrorReport {
    fn from(err: RoleGrantError) -> Self {
        Self::from(&err)
    }
}

/// HTTP status code carried by an error message.
///
/// Messages shaped like this crate's own (`...'<subject>': <code> <reason>`)
/// yield the code after the final `': `. Otherwise only standalone
/// three-digit numbers in 100..=599 count (no adjacent letter or digit), and
/// 401/403 take precedence over transient codes, which take precedence over
/// any other code.
#[must_use]
pub fn extract_status_code(message: &str) -> Option<u16> {
    if let Some(code) = message
        .rsplit_once("': ")
        .and_then(|(_, tail)| standalone_codes(tail).next())
    {
        return Some(code);
    }

    let codes: Vec<u16> = standalone_codes(message).collect();
    let first_of = |kind: ErrorKind| {
        codes
            .iter()
            .copied()
            .find(|code| classify_status(*code) == kind)
    };

    first_of(ErrorKind::Authorization)
        .or_else(|| first_of(ErrorKind::Transient))
        .or_else(|| codes.first().copied())
}

fn standalone_codes(text: &str) -> impl Iterator<Item = u16> + '_ {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| word.len() == 3 && word.bytes().all(|b| b.is_ascii_digit()))
        .filter_map(|word| word.parse::<u16>().ok())
        .filter(|code| (100..=599).contains(code))
}
