//! External halt signal.
//!
//! The orchestrator checks the signal at phase boundaries. A halt never
//! interrupts an in-flight request and never undoes a grant already created.

use crate::errors::RoleGrantError;
use crate::models::DEFAULT_HALT_REASON;
use chrono::{DateTime, Utc};
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;

/// Cloneable halt signal; all clones observe the same halt.
#[derive(Debug, Clone, Default)]
pub struct HaltSignal {
    token: CancellationToken,
    // First halt wins
    recorded: Arc<OnceLock<(String, DateTime<Utc>)>>,
}

impl HaltSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal. Returns the reason and time of the first halt.
    pub fn halt(&self, reason: impl Into<String>) -> (String, DateTime<Utc>) {
        let recorded = self
            .recorded
            .get_or_init(|| (reason.into(), Utc::now()))
            .clone();
        self.token.cancel();
        recorded
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// `Err(Halted)` once the signal has fired.
    ///
    /// # Errors
    ///
    /// `RoleGrantError::Halted` with the recorded reason and timestamp.
    pub fn check(&self) -> Result<(), RoleGrantError> {
        if !self.is_halted() {
            return Ok(());
        }
        let (reason, halted_at) = self
            .recorded
            .get()
            .cloned()
            .unwrap_or_else(|| (DEFAULT_HALT_REASON.to_string(), Utc::now()));
        Err(RoleGrantError::Halted { reason, halted_at })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_not_halted_by_default() {
        let signal = HaltSignal::new();
        assert!(!signal.is_halted());
        assert!(signal.check().is_ok());
    }

    #[test]
    fn test_first_reason_wins() {
        let signal = HaltSignal::new();
        let (first, at) = signal.halt("timeout");
        let (second, at2) = signal.halt("operator");

        assert_eq!(first, "timeout");
        assert_eq!(second, "timeout");
        assert_eq!(at, at2);

        match signal.check() {
            Err(RoleGrantError::Halted { reason, halted_at }) => {
                assert_eq!(reason, "timeout");
                assert_eq!(halted_at, at);
            }
            other => unreachable!("expected halted, got {other:?}"),
        }
    }

    #[test]
    fn test_clones_share_state() {
        let signal = HaltSignal::new();
        let clone = signal.clone();
        clone.halt("shutdown");
        assert!(signal.is_halted());
    }
}
