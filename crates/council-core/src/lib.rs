//! Council Core Library
//!
//! Verification orchestration and consensus: fans a request out to a council
//! of AI evaluators, aggregates their votes into a single verdict, drives an
//! explicit lifecycle state machine, and records every transition in a
//! hash-chained audit log with optional external anchoring.

pub mod aggregator;
pub mod audit;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod engine;
pub mod evaluator;
pub mod obs;
pub mod state_machine;
pub mod telemetry;

pub use aggregator::{aggregate_votes, tally_votes, AggregateOutcome, ReasonCode, VoteTally};

pub use audit::{AuditRecorder, ChainReport};

pub use config::{
    AnchorConfig, AuditRetryConfig, CouncilMemberConfig, DispatchConfig, EngineConfig, QuorumConfig,
};

pub use dispatcher::{CouncilDispatcher, DispatchPermit};

pub use domain::{
    canonical_digest, chain_hash, AbstainReason, AuditEntryRecord, AuditEventKind, ChainDigest,
    CouncilError, EvaluatorId, MemberVote, Result, VerificationId, VerificationRecord,
    VerificationStatus, Verdict, VoteRecord,
};

pub use engine::{FailureReason, RunOutcome, VerificationEngine, VerificationView};

pub use evaluator::{
    Evaluator, EvaluatorClient, EvaluatorFault, EvaluatorReply, EvaluatorRequest, HttpEvaluator,
    VoteDraft,
};

pub use state_machine::{apply_transition, LifecycleEvent};

pub use council_ledger::{AnchorSink, AuditLedger, StorageError, VerificationStore};
