//! Authorization status state machine.
//!
//! The runner keeps one [`AuthorizationStatus`] per authorization run and
//! feeds it [`StatusEvent`]s. [`transition`] is pure; the runner renders
//! every accepted transition.

use std::sync::Arc;

use strum::Display;

use super::error::AuthError;

/// Status reported to the render callback.
#[derive(Debug, Clone, Display)]
#[strum(serialize_all = "snake_case")]
pub enum AuthorizationStatus {
    /// Waiting for the user to invoke the trigger.
    NotTriggered,
    /// A flow is executing.
    Pending,
    /// A token was stored; terminal.
    Success,
    /// The last flow attempt failed; the trigger may be invoked again.
    Error(Arc<AuthError>),
}

impl AuthorizationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn error(&self) -> Option<&Arc<AuthError>> {
        match self {
            Self::Error(err) => Some(err),
            _ => None,
        }
    }
}

impl PartialEq for AuthorizationStatus {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Error(a), Self::Error(b)) => Arc::ptr_eq(a, b) || a.to_string() == b.to_string(),
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

/// Inputs driving [`AuthorizationStatus`].
#[derive(Debug, Clone)]
pub enum StatusEvent {
    /// The trigger was invoked.
    Triggered,
    /// The flow started by a trigger failed.
    Failed(Arc<AuthError>),
    /// A token was stored for the configuration id (by this run or any other).
    Authorized,
}

/// Next status for `event`, or `None` when the event does not apply.
pub fn transition(current: &AuthorizationStatus, event: StatusEvent) -> Option<AuthorizationStatus> {
    use AuthorizationStatus::*;

    match (current, event) {
        (Success, _) => None,
        (NotTriggered | Pending | Error(_), StatusEvent::Triggered) => Some(Pending),
        (Pending, StatusEvent::Failed(err)) => Some(Error(err)),
        (_, StatusEvent::Failed(_)) => None,
        (NotTriggered | Pending | Error(_), StatusEvent::Authorized) => Some(Success),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AuthorizationStatus::*;

    fn failure() -> Arc<AuthError> {
        Arc::new(AuthError::Flow("popup closed".to_string()))
    }

    #[test]
    fn trigger_moves_to_pending_from_any_open_state() {
        for status in [NotTriggered, Pending, Error(failure())] {
            assert_eq!(transition(&status, StatusEvent::Triggered), Some(Pending));
        }
    }

    #[test]
    fn failure_only_applies_while_pending() {
        let err = failure();
        assert_eq!(
            transition(&Pending, StatusEvent::Failed(err.clone())),
            Some(Error(err.clone()))
        );
        assert_eq!(transition(&NotTriggered, StatusEvent::Failed(err.clone())), None);
        assert_eq!(transition(&Error(failure()), StatusEvent::Failed(err)), None);
    }

    #[test]
    fn authorized_converges_without_trigger() {
        assert_eq!(transition(&NotTriggered, StatusEvent::Authorized), Some(Success));
        assert_eq!(transition(&Error(failure()), StatusEvent::Authorized), Some(Success));
    }

    #[test]
    fn success_is_terminal() {
        assert!(Success.is_terminal());
        assert_eq!(transition(&Success, StatusEvent::Triggered), None);
        assert_eq!(transition(&Success, StatusEvent::Authorized), None);
        assert_eq!(transition(&Success, StatusEvent::Failed(failure())), None);
    }

    #[test]
    fn display_uses_snake_case_names() {
        assert_eq!(NotTriggered.to_string(), "not_triggered");
        assert_eq!(Error(failure()).to_string(), "error");
    }
}
