//! Role assignment orchestration.
//!
//! Runs the two-phase flow:
//! 1. Validate the request (no network activity on failure)
//! 2. Resolve the principal name to a directory object id
//! 3. Create an `adminAssign` schedule request with no expiration
//!
//! Phases are strictly sequential. The halt signal is checked before each
//! phase; a phase already in flight runs to completion. A failure after phase
//! 1 leaves no directory state behind, so nothing is rolled back.

use crate::errors::{AssignmentPhase, RoleGrantError};
use crate::models::{AssignmentRequest, AssignmentResult, GrantRequest};
use crate::observability::metrics::{record_assignment_outcome, AssignmentOutcome};
use crate::services::directory_client::{DirectoryClient, DirectoryTarget};
use crate::services::halt::HaltSignal;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Drives one role assignment against the directory.
#[derive(Clone)]
pub struct RoleAssignmentOrchestrator {
    client: Arc<dyn DirectoryClient>,
}

impl RoleAssignmentOrchestrator {
    #[must_use]
    pub fn new(client: Arc<dyn DirectoryClient>) -> Self {
        Self { client }
    }

    /// Assign `request.role_id` to `request.principal_name`.
    ///
    /// # Errors
    ///
    /// - `RoleGrantError::Validation` - required fields blank (zero calls)
    /// - `RoleGrantError::IdentityResolution` - user lookup failed (no write)
    /// - `RoleGrantError::GrantCreation` - schedule request rejected
    /// - `RoleGrantError::Transport` / `InvalidResponse` - call failed or
    ///   returned an unusable body
    /// - `RoleGrantError::Halted` - halt observed at a phase boundary
    #[instrument(
        skip_all,
        fields(principal_name = %request.principal_name, role_id = %request.role_id)
    )]
    pub async fn execute(
        &self,
        request: &AssignmentRequest,
        target: &DirectoryTarget,
        halt: &HaltSignal,
    ) -> Result<AssignmentResult, RoleGrantError> {
        let result = self.run(request, target, halt).await;
        record_assignment_outcome(outcome_of(&result));
        result
    }

    async fn run(
        &self,
        request: &AssignmentRequest,
        target: &DirectoryTarget,
        halt: &HaltSignal,
    ) -> Result<AssignmentResult, RoleGrantError> {
        request.validate()?;
        halt.check()?;

        // Phase 1: identity resolution
        let identity = self
            .client
            .get_user(target, &request.principal_name)
            .await?;

        debug!(
            target: "role_grant.orchestrator",
            identity_id = %identity.identity_id,
            "Resolved principal name"
        );

        if let Err(e) = halt.check() {
            info!(
                target: "role_grant.orchestrator",
                identity_id = %identity.identity_id,
                "Halted after identity resolution, no grant requested"
            );
            return Err(e);
        }

        // Phase 2: grant creation
        let grant = GrantRequest::new(request, &identity, Utc::now());
        let created = match self
            .client
            .create_schedule_request(target, &request.principal_name, &grant)
            .await
        {
            Ok(created) => created,
            Err(e) => {
                warn!(
                    target: "role_grant.orchestrator",
                    identity_id = %identity.identity_id,
                    scope_id = %request.scope_id,
                    error = %e,
                    "User resolved but role assignment was not created"
                );
                return Err(e);
            }
        };

        info!(
            target: "role_grant.orchestrator",
            identity_id = %identity.identity_id,
            request_id = %created.request_id,
            scope_id = %request.scope_id,
            "Role assignment schedule request created"
        );

        Ok(AssignmentResult {
            identity_id: identity.identity_id,
            request_id: created.request_id,
            raw_response: created.raw_response,
        })
    }
}

fn outcome_of(result: &Result<AssignmentResult, RoleGrantError>) -> AssignmentOutcome {
    let Err(err) = result else {
        return AssignmentOutcome::Granted;
    };
    match (err, err.phase()) {
        (RoleGrantError::Halted { .. }, _) => AssignmentOutcome::Halted,
        (_, Some(AssignmentPhase::Validation)) => AssignmentOutcome::ValidationFailed,
        (_, Some(AssignmentPhase::IdentityResolution)) => {
            AssignmentOutcome::IdentityResolutionFailed
        }
        (_, Some(AssignmentPhase::GrantCreation)) => AssignmentOutcome::GrantCreationFailed,
        (_, None) => AssignmentOutcome::Error,
    }
}
