//! Domain types and errors for the council engine.

pub mod digest;
pub mod error;

pub use digest::{canonical_digest, chain_hash};
pub use error::{CouncilError, Result};

// Persisted record types live in the ledger crate; re-export them so engine
// callers only need one import path.
pub use council_ledger::{
    AbstainReason, AuditEntryRecord, AuditEventKind, ChainDigest, EvaluatorId, MemberVote,
    VerificationId, VerificationRecord, VerificationStatus, Verdict, VoteRecord,
};
