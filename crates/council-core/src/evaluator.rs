//! Evaluator boundary: one client per external AI evaluator.
//!
//! [`Evaluator`] is the injectable seam; [`EvaluatorClient`] wraps an
//! implementation with per-attempt timeout and exponential-backoff retries.
//! No fault escapes the client: timeouts, transport errors, and malformed
//! replies all surface as abstention drafts, with the raw body retained for
//! audit when one exists.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{CouncilMemberConfig, DispatchConfig};
use crate::domain::{AbstainReason, EvaluatorId, MemberVote, VerificationId};

/// Request sent to one council member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorRequest {
    pub verification_id: VerificationId,
    pub payload: serde_json::Value,
    /// Deadline hint forwarded to the evaluator (milliseconds).
    pub deadline_ms: u64,
}

/// Successful evaluator reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorReply {
    pub vote: MemberVote,
    pub rationale: Option<String>,
}

/// Faults an evaluator call can produce. Internal to vote processing; the
/// client converts each into an abstention.
#[derive(Debug, Clone)]
pub enum EvaluatorFault {
    /// The attempt exceeded its timeout.
    Timeout,
    /// Network or protocol failure.
    Transport(String),
    /// The evaluator answered but the body could not be parsed.
    Malformed { raw_body: String },
}

/// Uniform interface to one external AI evaluator.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(
        &self,
        request: &EvaluatorRequest,
    ) -> std::result::Result<EvaluatorReply, EvaluatorFault>;
}

/// A vote as produced by one evaluator call, before it is bound to a
/// verification attempt and persisted.
#[derive(Debug, Clone)]
pub struct VoteDraft {
    pub evaluator_id: EvaluatorId,
    pub vote: MemberVote,
    pub latency_ms: u64,
    pub raw_rationale: Option<String>,
}

impl VoteDraft {
    fn abstain(
        evaluator_id: EvaluatorId,
        reason: AbstainReason,
        latency_ms: u64,
        raw: Option<String>,
    ) -> Self {
        Self {
            evaluator_id,
            vote: MemberVote::Abstain { reason },
            latency_ms,
            raw_rationale: raw,
        }
    }
}

/// Wraps an [`Evaluator`] with timeout, bounded retries, and fault recovery.
pub struct EvaluatorClient {
    member: CouncilMemberConfig,
    inner: Arc<dyn Evaluator>,
    policy: DispatchConfig,
}

impl EvaluatorClient {
    pub fn new(member: CouncilMemberConfig, inner: Arc<dyn Evaluator>, policy: DispatchConfig) -> Self {
        Self {
            member,
            inner,
            policy,
        }
    }

    pub fn evaluator_id(&self) -> &EvaluatorId {
        &self.member.id
    }

    /// Call the evaluator. Applies at most `max_retries` retries with
    /// exponential backoff, capped so the whole call never outlives the
    /// request deadline; any terminal fault yields an abstention draft.
    /// This function never errors.
    pub async fn call(&self, request: &EvaluatorRequest) -> VoteDraft {
        let started = Instant::now();
        let overall = Duration::from_millis(request.deadline_ms);
        let max_attempts = self.policy.max_retries + 1;

        let mut last_fault = EvaluatorFault::Timeout;
        for attempt in 1..=max_attempts {
            let remaining = overall.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                break;
            }
            // Per-attempt timeout clamped to the remaining deadline budget.
            let timeout = Duration::from_millis(self.policy.call_timeout_ms).min(remaining);
            let outcome = tokio::time::timeout(timeout, self.inner.evaluate(request)).await;
            let fault = match outcome {
                Ok(Ok(reply)) if reply.vote.is_cast() => {
                    return VoteDraft {
                        evaluator_id: self.member.id.clone(),
                        vote: reply.vote,
                        latency_ms: started.elapsed().as_millis() as u64,
                        raw_rationale: reply.rationale,
                    };
                }
                // An evaluator must cast PASS/WARNING/FAIL; an abstention in
                // the reply body is out of contract.
                Ok(Ok(reply)) => EvaluatorFault::Malformed {
                    raw_body: serde_json::to_string(&reply).unwrap_or_default(),
                },
                Ok(Err(fault)) => fault,
                Err(_elapsed) => EvaluatorFault::Timeout,
            };

            debug!(
                event = "evaluator.attempt_failed",
                evaluator_id = %self.member.id,
                verification_id = %request.verification_id,
                attempt = attempt,
            );

            last_fault = fault;
            if attempt < max_attempts {
                let delay =
                    Duration::from_millis(self.policy.backoff_base_ms * 2u64.pow(attempt - 1));
                // A retry whose backoff would cross the deadline is pointless;
                // abstain with the fault we already have instead of a generic
                // timeout.
                if started.elapsed() + delay >= overall {
                    break;
                }
                tokio::time::sleep(delay).await;
            }
        }

        let latency_ms = started.elapsed().as_millis() as u64;
        match last_fault {
            EvaluatorFault::Timeout => VoteDraft::abstain(
                self.member.id.clone(),
                AbstainReason::Timeout,
                latency_ms,
                None,
            ),
            EvaluatorFault::Transport(detail) => VoteDraft::abstain(
                self.member.id.clone(),
                AbstainReason::Error,
                latency_ms,
                Some(detail),
            ),
            EvaluatorFault::Malformed { raw_body } => VoteDraft::abstain(
                self.member.id.clone(),
                AbstainReason::MalformedReply,
                latency_ms,
                Some(raw_body),
            ),
        }
    }
}

/// Stand-in for a council member configured with neither an injected
/// implementation nor an endpoint. Every call faults, so the member is
/// recorded as an abstention while still counting toward the council size.
pub(crate) struct UnconfiguredEvaluator;

#[async_trait]
impl Evaluator for UnconfiguredEvaluator {
    async fn evaluate(
        &self,
        _request: &EvaluatorRequest,
    ) -> std::result::Result<EvaluatorReply, EvaluatorFault> {
        Err(EvaluatorFault::Transport(
            "no evaluator configured for this member".to_string(),
        ))
    }
}

// ---------------------------------------------------------------------------
// HttpEvaluator
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct HttpReplyBody {
    vote: String,
    #[serde(default)]
    rationale: Option<String>,
}

/// HTTP-backed evaluator: POSTs the request as JSON and expects
/// `{"vote": "PASS"|"WARNING"|"FAIL", "rationale": "..."}` back.
pub struct HttpEvaluator {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpEvaluator {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    fn parse_vote(raw: &str) -> Option<MemberVote> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PASS" => Some(MemberVote::Pass),
            "WARNING" => Some(MemberVote::Warning),
            "FAIL" => Some(MemberVote::Fail),
            _ => None,
        }
    }
}

#[async_trait]
impl Evaluator for HttpEvaluator {
    async fn evaluate(
        &self,
        request: &EvaluatorRequest,
    ) -> std::result::Result<EvaluatorReply, EvaluatorFault> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| EvaluatorFault::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EvaluatorFault::Transport(format!(
                "evaluator returned HTTP {}",
                response.status()
            )));
        }

        let raw_body = response
            .text()
            .await
            .map_err(|e| EvaluatorFault::Transport(e.to_string()))?;

        let body: HttpReplyBody = serde_json::from_str(&raw_body).map_err(|_| {
            EvaluatorFault::Malformed {
                raw_body: raw_body.clone(),
            }
        })?;

        let vote = Self::parse_vote(&body.vote).ok_or(EvaluatorFault::Malformed {
            raw_body: raw_body.clone(),
        })?;

        Ok(EvaluatorReply {
            vote,
            rationale: body.rationale,
        })
    }
}
