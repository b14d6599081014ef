//! Persisted record schemas for verifications, council votes, and audit entries.
//!
//! These types are the relational layout: `VoteRecord.verification_id` and
//! `AuditEntryRecord.verification_id` are foreign keys into the verification
//! table, and audit entries are insert-only at the schema level.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::storage_traits::ChainDigest;

/// Unique identifier for a verification, e.g. `ver_3fa85f64a1b2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerificationId(pub String);

impl VerificationId {
    /// Generate a fresh id: `ver_` followed by 12 hex characters.
    pub fn generate() -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        VerificationId(format!("ver_{}", &hex[..12]))
    }
}

impl std::fmt::Display for VerificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one council evaluator. A reference, not an owned entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EvaluatorId(pub String);

impl EvaluatorId {
    pub fn new(id: impl Into<String>) -> Self {
        EvaluatorId(id.into())
    }
}

impl std::fmt::Display for EvaluatorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a verification.
///
/// Transitions move only forward; `Completed` and `Failed` are terminal
/// (a `Failed` verification may be re-dispatched, which starts a new attempt
/// under the same id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Final aggregated verdict. Present iff status is `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Warning,
    Fail,
}

/// Why an evaluator abstained instead of voting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbstainReason {
    /// The evaluator did not answer before the deadline.
    Timeout,
    /// The evaluator call failed (network, transport, HTTP error).
    Error,
    /// The evaluator answered but the reply could not be parsed.
    MalformedReply,
}

/// One evaluator's response. `Abstain` is internal to vote processing and
/// never appears as a final verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "vote", rename_all = "UPPERCASE")]
pub enum MemberVote {
    Pass,
    Warning,
    Fail,
    Abstain { reason: AbstainReason },
}

impl MemberVote {
    /// True for Pass/Warning/Fail, false for Abstain.
    pub fn is_cast(&self) -> bool {
        !matches!(self, MemberVote::Abstain { .. })
    }
}

/// One verification request and its lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRecord {
    /// Unique, immutable identifier.
    pub id: VerificationId,

    /// Current lifecycle status.
    pub status: VerificationStatus,

    /// Final verdict; set only on completion.
    pub verdict: Option<Verdict>,

    /// Number of evaluators dispatched for this verification.
    pub council_size: usize,

    /// Dispatch attempt counter. 0 until the first dispatch; a retry of a
    /// failed verification increments it.
    pub attempt: u32,

    /// Opaque payload under verification.
    pub payload: serde_json::Value,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One evaluator's vote on one verification attempt.
///
/// Immutable once recorded; at most one vote per
/// (`verification_id`, `evaluator_id`, `attempt`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRecord {
    pub verification_id: VerificationId,
    pub evaluator_id: EvaluatorId,

    /// Which dispatch attempt this vote belongs to.
    pub attempt: u32,

    #[serde(flatten)]
    pub vote: MemberVote,

    /// Wall-clock latency of the evaluator call in milliseconds.
    pub latency_ms: u64,

    /// Opaque rationale text returned by the evaluator, or the raw body of a
    /// malformed reply (retained for audit).
    pub raw_rationale: Option<String>,

    pub received_at: DateTime<Utc>,
}

/// Classification of an audit log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    Created,
    Dispatched,
    VoteReceived,
    Aggregated,
    Completed,
    Failed,
}

impl AuditEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventKind::Created => "created",
            AuditEventKind::Dispatched => "dispatched",
            AuditEventKind::VoteReceived => "vote_received",
            AuditEventKind::Aggregated => "aggregated",
            AuditEventKind::Completed => "completed",
            AuditEventKind::Failed => "failed",
        }
    }
}

/// One append-only audit log entry.
///
/// Chain invariant: `this_hash = SHA256(prev_hash ∥ payload_hash ∥ sequence_no)`,
/// where `prev_hash` for the first entry is the 64-zero genesis digest.
/// Sequence numbers are gapless per verification and continue across retry
/// attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntryRecord {
    pub verification_id: VerificationId,

    /// Monotonic, gapless sequence number within the verification.
    pub sequence_no: u64,

    pub event_kind: AuditEventKind,

    /// Event body as recorded (hashed into `payload_hash`).
    pub payload: serde_json::Value,

    /// Content hash of the canonicalized event body.
    pub payload_hash: ChainDigest,

    /// Hash of the prior entry for the same verification, or genesis.
    pub prev_hash: ChainDigest,

    /// Chain hash of this entry.
    pub this_hash: ChainDigest,

    /// External anchor transaction reference, once anchored.
    pub anchored_ref: Option<String>,

    pub recorded_at: DateTime<Utc>,
}
