//! Domain-level error taxonomy for the council engine.

use council_ledger::{VerificationId, VerificationStatus};

/// Council engine errors.
///
/// Evaluator timeouts and faults are deliberately absent: they are recovered
/// inside the dispatcher as abstentions and never cross this boundary.
#[derive(Debug, thiserror::Error)]
pub enum CouncilError {
    /// A dispatch is already in flight for this verification id.
    #[error("dispatch already in flight for verification {0}")]
    DuplicateDispatch(VerificationId),

    /// The requested lifecycle transition is not legal from the current state.
    #[error("invalid transition from {from:?} on event {event}")]
    InvalidTransition {
        from: VerificationStatus,
        event: &'static str,
    },

    #[error("verification not found: {0}")]
    VerificationNotFound(VerificationId),

    /// Council configuration resolved to zero evaluators.
    #[error("council is empty for verification {0}")]
    EmptyCouncil(VerificationId),

    /// An audit append failed after exhausting its retry budget. The
    /// transition it was recording is treated as not having happened.
    #[error("audit write failed for verification {verification_id} after {attempts} attempts: {detail}")]
    AuditWriteFailure {
        verification_id: VerificationId,
        attempts: u32,
        detail: String,
    },

    #[error("storage error: {0}")]
    Storage(#[from] council_ledger::StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for council engine operations.
pub type Result<T> = std::result::Result<T, CouncilError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let id = VerificationId::generate();
        let err = CouncilError::DuplicateDispatch(id.clone());
        assert!(err.to_string().contains("already in flight"));

        let err = CouncilError::InvalidTransition {
            from: VerificationStatus::Completed,
            event: "dispatch_started",
        };
        assert!(err.to_string().contains("dispatch_started"));
        assert!(err.to_string().contains("Completed"));
    }

    #[test]
    fn test_storage_error_converts() {
        let err: CouncilError = council_ledger::StorageError::WriteFailed("disk full".into()).into();
        assert!(err.to_string().contains("disk full"));
    }
}
