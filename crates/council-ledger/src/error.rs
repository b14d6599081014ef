//! Error types for council-ledger

use thiserror::Error;

/// Errors produced by the persistence layer.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Verification record not found
    #[error("verification not found: {verification_id}")]
    VerificationNotFound { verification_id: String },

    /// A vote already exists for this (verification, evaluator, attempt)
    #[error("duplicate vote for verification {verification_id} from evaluator {evaluator_id} (attempt {attempt})")]
    DuplicateVote {
        verification_id: String,
        evaluator_id: String,
        attempt: u32,
    },

    /// An audit append violated the append-only sequence contract
    #[error("audit sequence violation for verification {verification_id}: expected seq {expected}, got {got}")]
    SequenceViolation {
        verification_id: String,
        expected: u64,
        got: u64,
    },

    /// Audit entry not found when setting an anchor reference
    #[error("audit entry not found: verification {verification_id} seq {sequence_no}")]
    EntryNotFound {
        verification_id: String,
        sequence_no: u64,
    },

    /// Digest string was not 64 lowercase hex characters
    #[error("invalid digest: {digest}")]
    InvalidDigest { digest: String },

    /// Backend write failed (connection, transaction, disk)
    #[error("storage write failed: {0}")]
    WriteFailed(String),

    /// Backend read failed
    #[error("storage read failed: {0}")]
    ReadFailed(String),

    /// Anchor sink rejected the submission
    #[error("anchor submission failed: {0}")]
    AnchorFailed(String),

    /// Serialization error
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::VerificationNotFound {
            verification_id: "ver_abc123def456".to_string(),
        };
        assert!(err.to_string().contains("ver_abc123def456"));

        let err = StorageError::SequenceViolation {
            verification_id: "ver_abc123def456".to_string(),
            expected: 4,
            got: 6,
        };
        assert!(err.to_string().contains("expected seq 4"));
    }
}
