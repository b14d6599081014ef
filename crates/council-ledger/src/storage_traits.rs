//! Storage trait definitions for the council verification engine.
//!
//! These traits define the persistence abstractions:
//! - `VerificationStore`: verification records and their council votes
//! - `AuditLedger`: insert-only audit log entries (the hash chain)
//! - `AnchorSink`: optional external anchoring of chain hashes
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use sha2::Sha256;

use crate::error::{StorageError, StorageResult};
use crate::records::{
    AuditEntryRecord, VerificationId, VerificationRecord, VerificationStatus, Verdict, VoteRecord,
};

// ---------------------------------------------------------------------------
// ChainDigest
// ---------------------------------------------------------------------------

/// SHA-256 hex digest used in the audit hash chain.
///
/// The inner field is private to guarantee the string is always valid
/// lowercase hex produced by `from_bytes`, `genesis`, or validated via
/// `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ChainDigest(String);

impl ChainDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        ChainDigest(hex::encode(hasher.finalize()))
    }

    /// The genesis digest: 64 zeros, used as `prev_hash` of the first entry.
    pub fn genesis() -> Self {
        ChainDigest("0".repeat(64))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for ChainDigest {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidDigest { digest: s });
        }
        Ok(ChainDigest(s.to_ascii_lowercase()))
    }
}

impl std::fmt::Display for ChainDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// VerificationStore
// ---------------------------------------------------------------------------

/// Verification and vote persistence.
///
/// Guarantees:
/// - Verification ids are unique; `create` rejects duplicates.
/// - At most one vote per (`verification_id`, `evaluator_id`, `attempt`);
///   `record_vote` rejects duplicates.
/// - Votes are immutable once recorded.
#[async_trait]
pub trait VerificationStore: Send + Sync {
    /// Persist a new verification record. Fails if the id already exists.
    async fn create(&self, record: VerificationRecord) -> StorageResult<()>;

    /// Fetch a verification by id.
    async fn get(&self, id: &VerificationId) -> StorageResult<VerificationRecord>;

    /// Update status, verdict, and attempt counter. `updated_at` is refreshed
    /// by the store.
    async fn update_lifecycle(
        &self,
        id: &VerificationId,
        status: VerificationStatus,
        verdict: Option<Verdict>,
        attempt: u32,
    ) -> StorageResult<()>;

    /// Record one immutable council vote.
    async fn record_vote(&self, vote: VoteRecord) -> StorageResult<()>;

    /// All votes for the given verification attempt, in insertion order.
    async fn votes_for_attempt(
        &self,
        id: &VerificationId,
        attempt: u32,
    ) -> StorageResult<Vec<VoteRecord>>;
}

// ---------------------------------------------------------------------------
// AuditLedger
// ---------------------------------------------------------------------------

/// Insert-only audit log persistence.
///
/// Guarantees:
/// - Entries for a verification are ordered by gapless `sequence_no`;
///   `append` rejects any entry whose sequence number is not exactly
///   one past the current head (or 0 for the first entry).
/// - Entries are never updated or deleted; the only post-insert mutation
///   is filling in `anchored_ref`.
#[async_trait]
pub trait AuditLedger: Send + Sync {
    /// Append one entry. Rejects sequence violations.
    async fn append(&self, entry: AuditEntryRecord) -> StorageResult<()>;

    /// The latest entry for a verification, if any.
    async fn head(&self, id: &VerificationId) -> StorageResult<Option<AuditEntryRecord>>;

    /// All entries for a verification in sequence order.
    async fn entries(&self, id: &VerificationId) -> StorageResult<Vec<AuditEntryRecord>>;

    /// Record the external anchor reference for one entry.
    async fn set_anchor_ref(
        &self,
        id: &VerificationId,
        sequence_no: u64,
        anchor_ref: &str,
    ) -> StorageResult<()>;
}

// ---------------------------------------------------------------------------
// AnchorSink
// ---------------------------------------------------------------------------

/// External immutable ledger that chain hashes are anchored to.
///
/// `submit_hash` must be idempotent: resubmitting the same digest returns
/// the same anchor reference and never creates a duplicate anchor.
#[async_trait]
pub trait AnchorSink: Send + Sync {
    /// Submit a chain hash; returns the anchor transaction reference.
    async fn submit_hash(&self, digest: &ChainDigest) -> StorageResult<String>;
}
