//! Council-Ledger: Persistence Layer for the Council Verification Engine
//!
//! This crate defines the persisted record schemas and the storage trait
//! boundary the engine is written against.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: record immutability, gapless audit sequencing, and vote uniqueness.
//!
//! ## Key Components
//!
//! - `VerificationStore`: verification records and council votes
//! - `AuditLedger`: insert-only, hash-chained audit entries
//! - `AnchorSink`: idempotent external anchoring of chain hashes
//! - `fakes`: in-memory implementations for testing

mod error;
pub mod fakes;
mod records;
pub mod storage_traits;

pub use error::{StorageError, StorageResult};
pub use records::{
    AbstainReason, AuditEntryRecord, AuditEventKind, EvaluatorId, MemberVote, VerificationId,
    VerificationRecord, VerificationStatus, Verdict, VoteRecord,
};
pub use storage_traits::{AnchorSink, AuditLedger, ChainDigest, VerificationStore};
