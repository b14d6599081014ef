//! Engine configuration.
//!
//! Everything the engine needs — council membership, deadlines, retry
//! budgets, anchoring policy — is passed in as one explicit [`EngineConfig`]
//! at construction time. Nothing is read from ambient global state, so the
//! engine runs under test with mocked evaluators and tight timeouts.

use serde::{Deserialize, Serialize};

use crate::domain::EvaluatorId;

/// One configured council member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CouncilMemberConfig {
    /// Stable evaluator identity.
    pub id: EvaluatorId,
    /// Human-readable name, e.g. "Privacy Violation specialist".
    pub name: String,
    /// Endpoint for HTTP-backed evaluators. Unused by injected test doubles.
    pub endpoint: Option<String>,
}

impl CouncilMemberConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: EvaluatorId::new(id),
            name: name.into(),
            endpoint: None,
        }
    }
}

/// Timeout and retry policy for a single dispatch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchConfig {
    /// Global deadline for one council dispatch (milliseconds). Evaluators
    /// that have not answered by then are recorded as timeout abstentions.
    pub deadline_ms: u64,
    /// Maximum wall-clock time for a single evaluator attempt (milliseconds).
    pub call_timeout_ms: u64,
    /// Maximum number of retries per evaluator call (0 = run once).
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries (milliseconds).
    pub backoff_base_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            deadline_ms: 30_000,
            call_timeout_ms: 10_000,
            max_retries: 2,
            backoff_base_ms: 500,
        }
    }
}

/// Quorum policy for aggregation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QuorumConfig {
    /// Minimum number of cast (non-abstain) votes required. When `None`,
    /// `ceil(council_size / 2)` is used.
    pub min_votes: Option<usize>,
}

impl QuorumConfig {
    /// Resolve the threshold for a council of the given size.
    pub fn threshold(&self, council_size: usize) -> usize {
        self.min_votes.unwrap_or(council_size.div_ceil(2))
    }
}

/// Retry budget for audit appends. An un-auditable transition must never be
/// treated as having happened, so appends retry with backoff before the
/// failure surfaces.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRetryConfig {
    /// Total attempts before giving up (>= 1).
    pub max_attempts: u32,
    /// Base delay for exponential backoff between attempts (milliseconds).
    pub backoff_base_ms: u64,
}

impl Default for AuditRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base_ms: 100,
        }
    }
}

/// External anchoring policy. Anchoring is best-effort and asynchronous;
/// it never blocks verification completion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnchorConfig {
    /// Total submission attempts before giving up on one entry.
    pub max_attempts: u32,
    /// Base delay for exponential backoff between attempts (milliseconds).
    pub backoff_base_ms: u64,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            backoff_base_ms: 250,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Ordered council membership. Order matters for deterministic
    /// tie-breaking when timeout abstentions are recorded.
    pub council: Vec<CouncilMemberConfig>,
    pub dispatch: DispatchConfig,
    pub quorum: QuorumConfig,
    pub audit_retry: AuditRetryConfig,
    pub anchoring: AnchorConfig,
}
