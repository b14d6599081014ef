//! Verification engine facade.
//!
//! Ties the dispatcher, aggregator, state machine, and audit recorder into
//! the three operations callers see: create, run, get. All collaborators are
//! injected at construction; the engine holds no global state.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use council_ledger::{AnchorSink, AuditLedger, VerificationStore};

use crate::aggregator::{aggregate_votes, ReasonCode, VoteTally};
use crate::audit::AuditRecorder;
use crate::config::EngineConfig;
use crate::dispatcher::{CouncilDispatcher, DispatchPermit};
use crate::domain::{
    canonical_digest, AuditEventKind, CouncilError, EvaluatorId, Result, VerificationId,
    VerificationRecord, VerificationStatus, Verdict, VoteRecord,
};
use crate::evaluator::{Evaluator, EvaluatorClient, HttpEvaluator, UnconfiguredEvaluator};
use crate::state_machine::{apply_transition, LifecycleEvent};
use crate::obs;

/// Why a run ended in the `failed` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    InsufficientQuorum,
    DispatcherError,
}

impl FailureReason {
    fn as_str(&self) -> &'static str {
        match self {
            FailureReason::InsufficientQuorum => "insufficient_quorum",
            FailureReason::DispatcherError => "dispatcher_error",
        }
    }
}

/// Result of one `run_verification` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub verification_id: VerificationId,
    pub status: VerificationStatus,
    /// Set iff `status == Completed`.
    pub verdict: Option<Verdict>,
    /// Set iff `status == Failed`.
    pub failure: Option<FailureReason>,
    /// Absent only when the dispatch itself faulted before any votes.
    pub tally: Option<VoteTally>,
}

/// Caller-facing view of one verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationView {
    pub id: VerificationId,
    pub status: VerificationStatus,
    pub verdict: Option<Verdict>,
    /// Votes of the current attempt.
    pub votes: Vec<VoteRecord>,
    /// True when the audit hash chain verifies end-to-end.
    pub audit_chain_valid: bool,
}

/// Orchestrates verification lifecycles over an injected council.
pub struct VerificationEngine {
    config: EngineConfig,
    store: Arc<dyn VerificationStore>,
    recorder: Arc<AuditRecorder>,
    dispatcher: CouncilDispatcher,
}

impl VerificationEngine {
    /// Build an engine from explicit configuration and collaborators.
    ///
    /// `evaluators` maps council member ids to their implementations; members
    /// without an entry fall back to an [`HttpEvaluator`] against their
    /// configured endpoint. A member with neither still counts toward the
    /// council size; its calls fault and are recorded as abstentions, so the
    /// quorum denominator never silently shrinks.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn VerificationStore>,
        ledger: Arc<dyn AuditLedger>,
        anchor: Option<Arc<dyn AnchorSink>>,
        evaluators: HashMap<EvaluatorId, Arc<dyn Evaluator>>,
    ) -> Self {
        let recorder = Arc::new(AuditRecorder::new(
            ledger,
            anchor,
            config.audit_retry.clone(),
            config.anchoring.clone(),
        ));

        let http = reqwest::Client::new();
        let mut clients = Vec::with_capacity(config.council.len());
        for member in &config.council {
            let inner: Arc<dyn Evaluator> = match evaluators.get(&member.id) {
                Some(custom) => Arc::clone(custom),
                None => match &member.endpoint {
                    Some(url) => Arc::new(HttpEvaluator::new(http.clone(), url.clone())),
                    None => {
                        tracing::warn!(
                            event = "engine.member_unconfigured",
                            evaluator_id = %member.id,
                        );
                        Arc::new(UnconfiguredEvaluator)
                    }
                },
            };
            clients.push(Arc::new(EvaluatorClient::new(
                member.clone(),
                inner,
                config.dispatch.clone(),
            )));
        }

        let dispatcher = CouncilDispatcher::new(
            clients,
            config.dispatch.clone(),
            Arc::clone(&store),
            Arc::clone(&recorder),
        );

        Self {
            config,
            store,
            recorder,
            dispatcher,
        }
    }

    /// Create a new verification in `pending`.
    pub async fn create_verification(&self, payload: serde_json::Value) -> Result<VerificationId> {
        let id = VerificationId::generate();
        if self.config.council.is_empty() {
            return Err(CouncilError::EmptyCouncil(id));
        }

        let now = Utc::now();
        let record = VerificationRecord {
            id: id.clone(),
            status: VerificationStatus::Pending,
            verdict: None,
            council_size: self.config.council.len(),
            attempt: 0,
            payload: payload.clone(),
            created_at: now,
            updated_at: now,
        };
        self.store.create(record).await?;
        self.recorder
            .append(
                &id,
                AuditEventKind::Created,
                json!({
                    "council_size": self.config.council.len(),
                    "payload_hash": canonical_digest(&payload).as_str(),
                }),
            )
            .await?;
        obs::emit_verification_created(&id.0, self.config.council.len());
        Ok(id)
    }

    /// Run (or retry) a verification through its full lifecycle.
    ///
    /// Legal only from `pending` or `failed`; a run already in flight for
    /// this id is rejected with [`CouncilError::DuplicateDispatch`].
    pub async fn run_verification(&self, id: &VerificationId) -> Result<RunOutcome> {
        // Claim the per-id slot before reading state, so two concurrent runs
        // cannot both observe `pending`.
        let permit = self.dispatcher.try_acquire(id)?;

        let record = self.get_record(id).await?;
        apply_transition(record.status, LifecycleEvent::DispatchStarted)?;
        let attempt = record.attempt + 1;

        // Audit before the store transition: a dispatch that could not be
        // recorded has not happened, and the record stays re-dispatchable.
        self.recorder
            .append(
                id,
                AuditEventKind::Dispatched,
                json!({
                    "attempt": attempt,
                    "council_size": record.council_size,
                }),
            )
            .await?;
        self.store
            .update_lifecycle(id, VerificationStatus::Running, None, attempt)
            .await?;
        obs::emit_dispatch_started(&id.0, attempt, record.council_size);

        match self.drive(id, &permit, &record, attempt).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                // A fault mid-run must not strand the record in `running`:
                // take the dispatcher_error transition so an operator retry
                // stays legal. The failure entry is best-effort, since the
                // ledger itself may be the component that faulted.
                if let Err(audit_err) = self
                    .recorder
                    .append(
                        id,
                        AuditEventKind::Failed,
                        json!({"reason": FailureReason::DispatcherError.as_str()}),
                    )
                    .await
                {
                    tracing::warn!(
                        event = "engine.failure_entry_lost",
                        verification_id = %id,
                        error = %audit_err,
                    );
                }
                if let Err(store_err) = self
                    .store
                    .update_lifecycle(id, VerificationStatus::Failed, None, attempt)
                    .await
                {
                    tracing::warn!(
                        event = "engine.failure_update_lost",
                        verification_id = %id,
                        error = %store_err,
                    );
                }
                self.recorder.retire(id);
                obs::emit_verification_failed(&id.0, FailureReason::DispatcherError.as_str());
                Err(err)
            }
        }
    }

    /// Dispatch, aggregate, and settle one attempt. Runs with the record
    /// already in `running`; the caller owns recovery when this errors.
    async fn drive(
        &self,
        id: &VerificationId,
        permit: &DispatchPermit,
        record: &VerificationRecord,
        attempt: u32,
    ) -> Result<RunOutcome> {
        let votes = match self.dispatcher.dispatch(permit, &record.payload, attempt).await {
            Ok(votes) => votes,
            Err(CouncilError::EmptyCouncil(_)) => {
                return self
                    .fail(id, attempt, FailureReason::DispatcherError, None)
                    .await;
            }
            Err(other) => return Err(other),
        };

        // The denominator is the configured council size, not the reachable
        // subset, so unanswered members weaken quorum instead of the bar.
        let outcome = aggregate_votes(&votes, record.council_size, &self.config.quorum);
        self.recorder
            .append(
                id,
                AuditEventKind::Aggregated,
                json!({
                    "verdict": outcome.verdict,
                    "reason": outcome.reason,
                    "tally": outcome.tally,
                    "summary": outcome.tally.summary(),
                }),
            )
            .await?;
        obs::emit_verdict_aggregated(&id.0, &outcome.tally.summary());

        let next = apply_transition(
            VerificationStatus::Running,
            LifecycleEvent::AggregationDone {
                quorum_met: outcome.quorum_met(),
            },
        )?;

        match next {
            VerificationStatus::Completed => {
                self.recorder
                    .append(
                        id,
                        AuditEventKind::Completed,
                        json!({"verdict": outcome.verdict}),
                    )
                    .await?;
                self.store
                    .update_lifecycle(id, next, Some(outcome.verdict), attempt)
                    .await?;
                self.recorder.retire(id);
                obs::emit_verification_completed(&id.0, outcome.verdict);
                Ok(RunOutcome {
                    verification_id: id.clone(),
                    status: next,
                    verdict: Some(outcome.verdict),
                    failure: None,
                    tally: Some(outcome.tally),
                })
            }
            _ => {
                debug_assert_eq!(outcome.reason, ReasonCode::InsufficientQuorum);
                self.fail(
                    id,
                    attempt,
                    FailureReason::InsufficientQuorum,
                    Some(outcome.tally),
                )
                .await
            }
        }
    }

    /// Fetch the caller-facing view: lifecycle state, current-attempt votes,
    /// and whether the audit chain still verifies.
    pub async fn get_verification(&self, id: &VerificationId) -> Result<VerificationView> {
        let record = self.get_record(id).await?;
        let votes = self.store.votes_for_attempt(id, record.attempt).await?;
        let chain = self.recorder.verify_chain(id).await?;
        Ok(VerificationView {
            id: record.id,
            status: record.status,
            verdict: record.verdict,
            votes,
            audit_chain_valid: chain.valid,
        })
    }

    /// The audit recorder, for direct chain inspection or export.
    pub fn recorder(&self) -> &Arc<AuditRecorder> {
        &self.recorder
    }

    async fn get_record(&self, id: &VerificationId) -> Result<VerificationRecord> {
        self.store.get(id).await.map_err(|err| match err {
            council_ledger::StorageError::VerificationNotFound { .. } => {
                CouncilError::VerificationNotFound(id.clone())
            }
            other => CouncilError::Storage(other),
        })
    }

    async fn fail(
        &self,
        id: &VerificationId,
        attempt: u32,
        reason: FailureReason,
        tally: Option<VoteTally>,
    ) -> Result<RunOutcome> {
        self.recorder
            .append(id, AuditEventKind::Failed, json!({"reason": reason.as_str()}))
            .await?;
        self.store
            .update_lifecycle(id, VerificationStatus::Failed, None, attempt)
            .await?;
        self.recorder.retire(id);
        obs::emit_verification_failed(&id.0, reason.as_str());
        Ok(RunOutcome {
            verification_id: id.clone(),
            status: VerificationStatus::Failed,
            verdict: None,
            failure: Some(reason),
            tally,
        })
    }
}
