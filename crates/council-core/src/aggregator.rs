//! Verdict aggregation: quorum check plus severity dominance.
//!
//! Pure functions over a completed vote set; no locks, no side effects.
//! The caller persists the outcome.
//!
//! Aggregation is NOT majority voting. A single credible FAIL must not be
//! out-voted by optimistic members, so severity dominates:
//! any FAIL → FAIL, else any WARNING → WARNING, else PASS. This also removes
//! ties by construction.

use serde::{Deserialize, Serialize};

use crate::config::QuorumConfig;
use crate::domain::{MemberVote, Verdict, VoteRecord};

/// Machine-readable reason attached to an aggregation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    /// Quorum met; verdict produced by severity dominance.
    SeverityDominance,
    /// Fewer cast votes than the quorum threshold; verification fails.
    InsufficientQuorum,
}

/// Per-kind vote counts for one aggregation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub pass: usize,
    pub warning: usize,
    pub fail: usize,
    pub abstain: usize,
}

impl VoteTally {
    /// Number of cast (non-abstain) votes.
    pub fn cast(&self) -> usize {
        self.pass + self.warning + self.fail
    }

    /// Human-readable summary, e.g. `"1 FAIL, 0 WARNING, 2 PASS, 0 ABSTAIN"`.
    pub fn summary(&self) -> String {
        format!(
            "{} FAIL, {} WARNING, {} PASS, {} ABSTAIN",
            self.fail, self.warning, self.pass, self.abstain
        )
    }
}

/// Result of aggregating one vote set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateOutcome {
    /// Final verdict. `Fail` when quorum was not met.
    pub verdict: Verdict,
    pub reason: ReasonCode,
    pub tally: VoteTally,
}

impl AggregateOutcome {
    /// True when the verification should complete (rather than fail).
    pub fn quorum_met(&self) -> bool {
        self.reason != ReasonCode::InsufficientQuorum
    }
}

/// Count votes by kind.
pub fn tally_votes(votes: &[VoteRecord]) -> VoteTally {
    let mut tally = VoteTally::default();
    for vote in votes {
        match vote.vote {
            MemberVote::Pass => tally.pass += 1,
            MemberVote::Warning => tally.warning += 1,
            MemberVote::Fail => tally.fail += 1,
            MemberVote::Abstain { .. } => tally.abstain += 1,
        }
    }
    tally
}

/// Aggregate a full vote set (including abstentions) for a council of
/// `council_size` members into a single verdict.
pub fn aggregate_votes(
    votes: &[VoteRecord],
    council_size: usize,
    quorum: &QuorumConfig,
) -> AggregateOutcome {
    let tally = tally_votes(votes);

    if tally.cast() < quorum.threshold(council_size) {
        return AggregateOutcome {
            verdict: Verdict::Fail,
            reason: ReasonCode::InsufficientQuorum,
            tally,
        };
    }

    let verdict = if tally.fail > 0 {
        Verdict::Fail
    } else if tally.warning > 0 {
        Verdict::Warning
    } else {
        Verdict::Pass
    };

    AggregateOutcome {
        verdict,
        reason: ReasonCode::SeverityDominance,
        tally,
    }
}
