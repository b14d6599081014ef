//! Verification lifecycle state machine.
//!
//! States: `pending → running → completed | failed`. Transitions move only
//! forward; the single exception is an operator-triggered retry, which may
//! re-dispatch a `failed` verification (starting a new attempt under the
//! same id). Re-running a `completed` verification is always rejected.

use crate::domain::{CouncilError, Result, VerificationStatus};

/// Events that drive the verification lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A dispatch was accepted for this verification.
    DispatchStarted,
    /// Aggregation finished. `quorum_met == false` routes to `Failed`.
    AggregationDone { quorum_met: bool },
    /// Unrecoverable dispatch fault (e.g. zero reachable evaluators).
    DispatcherError,
}

impl LifecycleEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::DispatchStarted => "dispatch_started",
            LifecycleEvent::AggregationDone { .. } => "aggregation_done",
            LifecycleEvent::DispatcherError => "dispatcher_error",
        }
    }
}

/// Apply one lifecycle event to the current status.
///
/// Exhaustive over the transition table; anything not listed is an
/// [`CouncilError::InvalidTransition`] and leaves state untouched.
pub fn apply_transition(
    current: VerificationStatus,
    event: LifecycleEvent,
) -> Result<VerificationStatus> {
    use LifecycleEvent::*;
    use VerificationStatus::*;

    match (current, event) {
        // Initial dispatch, and operator retry of a failed verification.
        (Pending, DispatchStarted) | (Failed, DispatchStarted) => Ok(Running),

        (Running, AggregationDone { quorum_met: true }) => Ok(Completed),
        (Running, AggregationDone { quorum_met: false }) => Ok(Failed),
        (Running, DispatcherError) => Ok(Failed),

        (from, event) => Err(CouncilError::InvalidTransition {
            from,
            event: event.as_str(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use VerificationStatus::*;

    #[test]
    fn test_pending_dispatch_starts_running() {
        assert_eq!(
            apply_transition(Pending, LifecycleEvent::DispatchStarted).unwrap(),
            Running
        );
    }

    #[test]
    fn test_failed_may_be_redispatched() {
        assert_eq!(
            apply_transition(Failed, LifecycleEvent::DispatchStarted).unwrap(),
            Running
        );
    }

    #[test]
    fn test_completed_rejects_redispatch() {
        let err = apply_transition(Completed, LifecycleEvent::DispatchStarted).unwrap_err();
        assert!(matches!(
            err,
            CouncilError::InvalidTransition {
                from: Completed,
                event: "dispatch_started"
            }
        ));
    }

    #[test]
    fn test_running_rejects_redispatch() {
        assert!(apply_transition(Running, LifecycleEvent::DispatchStarted).is_err());
    }

    #[test]
    fn test_aggregation_routes_on_quorum() {
        assert_eq!(
            apply_transition(Running, LifecycleEvent::AggregationDone { quorum_met: true })
                .unwrap(),
            Completed
        );
        assert_eq!(
            apply_transition(Running, LifecycleEvent::AggregationDone { quorum_met: false })
                .unwrap(),
            Failed
        );
    }

    #[test]
    fn test_dispatcher_error_fails_running() {
        assert_eq!(
            apply_transition(Running, LifecycleEvent::DispatcherError).unwrap(),
            Failed
        );
    }

    #[test]
    fn test_terminal_states_reject_aggregation() {
        for terminal in [Completed, Failed] {
            assert!(apply_transition(
                terminal,
                LifecycleEvent::AggregationDone { quorum_met: true }
            )
            .is_err());
        }
    }

    #[test]
    fn test_pending_rejects_aggregation() {
        assert!(
            apply_transition(Pending, LifecycleEvent::AggregationDone { quorum_met: true })
                .is_err()
        );
    }
}
