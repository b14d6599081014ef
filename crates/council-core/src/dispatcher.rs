//! Council dispatcher: concurrent fan-out of one verification to all
//! configured evaluators.
//!
//! One tokio task per evaluator call; collection ends when every member has
//! answered or the global deadline elapses, whichever is first. Members that
//! have not answered by the deadline are recorded as timeout abstentions, in
//! evaluator-id order so the resulting audit order is deterministic.
//!
//! Votes stream to the store and audit recorder as they arrive, not batched
//! at the end, so partial progress survives a crash mid-dispatch.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::task::JoinSet;
use tokio::time::Instant;

use council_ledger::VerificationStore;

use crate::audit::AuditRecorder;
use crate::config::DispatchConfig;
use crate::domain::{
    AbstainReason, AuditEventKind, CouncilError, EvaluatorId, MemberVote, Result, VerificationId,
    VoteRecord,
};
use crate::evaluator::{EvaluatorClient, EvaluatorRequest, VoteDraft};
use crate::obs;

/// Exclusive right to run one dispatch for a verification id.
///
/// Held for the duration of a run; dropping it releases the id. While a
/// permit exists, a second acquisition for the same id is rejected with
/// [`CouncilError::DuplicateDispatch`] — rejected, not queued.
#[derive(Debug)]
pub struct DispatchPermit {
    id: VerificationId,
    registry: Arc<Mutex<HashSet<String>>>,
}

impl Drop for DispatchPermit {
    fn drop(&mut self) {
        self.registry.lock().unwrap().remove(&self.id.0);
    }
}

/// Fans a verification out to the council and collects the full vote set.
pub struct CouncilDispatcher {
    clients: Vec<Arc<EvaluatorClient>>,
    config: DispatchConfig,
    store: Arc<dyn VerificationStore>,
    recorder: Arc<AuditRecorder>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl CouncilDispatcher {
    pub fn new(
        clients: Vec<Arc<EvaluatorClient>>,
        config: DispatchConfig,
        store: Arc<dyn VerificationStore>,
        recorder: Arc<AuditRecorder>,
    ) -> Self {
        Self {
            clients,
            config,
            store,
            recorder,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Number of evaluators this dispatcher will invoke.
    pub fn council_size(&self) -> usize {
        self.clients.len()
    }

    /// Claim the per-id dispatch slot, or fail with `DuplicateDispatch` if a
    /// run is already in flight for this verification.
    pub fn try_acquire(&self, id: &VerificationId) -> Result<DispatchPermit> {
        let mut in_flight = self.in_flight.lock().unwrap();
        if !in_flight.insert(id.0.clone()) {
            return Err(CouncilError::DuplicateDispatch(id.clone()));
        }
        Ok(DispatchPermit {
            id: id.clone(),
            registry: Arc::clone(&self.in_flight),
        })
    }

    /// Invoke all evaluators concurrently and return the full vote set,
    /// including abstentions. Requires the caller to hold the permit for
    /// this verification.
    pub async fn dispatch(
        &self,
        permit: &DispatchPermit,
        payload: &serde_json::Value,
        attempt: u32,
    ) -> Result<Vec<VoteRecord>> {
        let id = &permit.id;
        if self.clients.is_empty() {
            return Err(CouncilError::EmptyCouncil(id.clone()));
        }

        let request = EvaluatorRequest {
            verification_id: id.clone(),
            payload: payload.clone(),
            deadline_ms: self.config.deadline_ms,
        };

        let mut join_set = JoinSet::new();
        for client in &self.clients {
            let client = Arc::clone(client);
            let request = request.clone();
            join_set.spawn(async move { client.call(&request).await });
        }

        let deadline = Instant::now() + Duration::from_millis(self.config.deadline_ms);
        let mut votes: Vec<VoteRecord> = Vec::with_capacity(self.clients.len());
        let mut responded: HashSet<EvaluatorId> = HashSet::new();

        loop {
            tokio::select! {
                joined = join_set.join_next() => {
                    match joined {
                        Some(Ok(draft)) => {
                            responded.insert(draft.evaluator_id.clone());
                            let vote = self.record_vote(id, attempt, draft).await?;
                            votes.push(vote);
                        }
                        // A panicked evaluator task yields no draft; the
                        // member is picked up below as a timeout abstention.
                        Some(Err(_join_error)) => {}
                        None => break,
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    // Cancel outstanding calls; late results are discarded.
                    join_set.abort_all();
                    break;
                }
            }
        }

        // Unanswered members become timeout abstentions, in evaluator-id
        // order for determinism.
        let mut missing: Vec<EvaluatorId> = self
            .clients
            .iter()
            .map(|c| c.evaluator_id().clone())
            .filter(|eid| !responded.contains(eid))
            .collect();
        missing.sort();
        for evaluator_id in missing {
            let draft = VoteDraft {
                evaluator_id,
                vote: MemberVote::Abstain {
                    reason: AbstainReason::Timeout,
                },
                latency_ms: self.config.deadline_ms,
                raw_rationale: None,
            };
            let vote = self.record_vote(id, attempt, draft).await?;
            votes.push(vote);
        }

        Ok(votes)
    }

    /// Persist one vote and stream its audit entry. Fails only on storage or
    /// audit errors; evaluator faults were already absorbed upstream.
    async fn record_vote(
        &self,
        id: &VerificationId,
        attempt: u32,
        draft: VoteDraft,
    ) -> Result<VoteRecord> {
        let vote = VoteRecord {
            verification_id: id.clone(),
            evaluator_id: draft.evaluator_id,
            attempt,
            vote: draft.vote,
            latency_ms: draft.latency_ms,
            raw_rationale: draft.raw_rationale,
            received_at: Utc::now(),
        };
        self.store.record_vote(vote.clone()).await?;
        self.recorder
            .append(
                id,
                AuditEventKind::VoteReceived,
                json!({
                    "evaluator_id": vote.evaluator_id.0,
                    "attempt": attempt,
                    "vote": serde_json::to_value(vote.vote)?,
                    "latency_ms": vote.latency_ms,
                }),
            )
            .await?;
        obs::emit_vote_received(&id.0, &vote.evaluator_id.0, vote.latency_ms);
        Ok(vote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AnchorConfig, AuditRetryConfig, CouncilMemberConfig};
    use crate::evaluator::{Evaluator, EvaluatorFault, EvaluatorReply};
    use async_trait::async_trait;
    use council_ledger::fakes::{MemoryAuditLedger, MemoryVerificationStore};
    use council_ledger::{VerificationRecord, VerificationStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_config() -> DispatchConfig {
        DispatchConfig {
            deadline_ms: 500,
            call_timeout_ms: 200,
            max_retries: 0,
            backoff_base_ms: 5,
        }
    }

    struct FixedEvaluator(MemberVote);

    #[async_trait]
    impl Evaluator for FixedEvaluator {
        async fn evaluate(
            &self,
            _request: &EvaluatorRequest,
        ) -> std::result::Result<EvaluatorReply, EvaluatorFault> {
            Ok(EvaluatorReply {
                vote: self.0,
                rationale: None,
            })
        }
    }

    struct SlowEvaluator {
        delay_ms: u64,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Evaluator for SlowEvaluator {
        async fn evaluate(
            &self,
            _request: &EvaluatorRequest,
        ) -> std::result::Result<EvaluatorReply, EvaluatorFault> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(EvaluatorReply {
                vote: MemberVote::Pass,
                rationale: None,
            })
        }
    }

    fn build_dispatcher(
        evaluators: Vec<(&str, Arc<dyn Evaluator>)>,
        config: DispatchConfig,
    ) -> (CouncilDispatcher, Arc<MemoryVerificationStore>, Arc<AuditRecorder>) {
        let store = Arc::new(MemoryVerificationStore::new());
        let recorder = Arc::new(AuditRecorder::new(
            Arc::new(MemoryAuditLedger::new()),
            None,
            AuditRetryConfig {
                max_attempts: 2,
                backoff_base_ms: 5,
            },
            AnchorConfig::default(),
        ));
        let clients = evaluators
            .into_iter()
            .map(|(id, inner)| {
                Arc::new(EvaluatorClient::new(
                    CouncilMemberConfig::new(id, id),
                    inner,
                    config.clone(),
                ))
            })
            .collect();
        let dispatcher =
            CouncilDispatcher::new(clients, config, store.clone(), recorder.clone());
        (dispatcher, store, recorder)
    }

    async fn seed_verification(store: &MemoryVerificationStore) -> VerificationId {
        let id = VerificationId::generate();
        store
            .create(VerificationRecord {
                id: id.clone(),
                status: VerificationStatus::Running,
                verdict: None,
                council_size: 3,
                attempt: 1,
                payload: json!({"claim": "x"}),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_dispatch_collects_all_votes() {
        let (dispatcher, store, _rec) = build_dispatcher(
            vec![
                ("eval-a", Arc::new(FixedEvaluator(MemberVote::Pass)) as Arc<dyn Evaluator>),
                ("eval-b", Arc::new(FixedEvaluator(MemberVote::Warning)) as _),
                ("eval-c", Arc::new(FixedEvaluator(MemberVote::Fail)) as _),
            ],
            fast_config(),
        );
        let id = seed_verification(&store).await;
        assert_eq!(dispatcher.council_size(), 3);
        let permit = dispatcher.try_acquire(&id).unwrap();
        let votes = dispatcher.dispatch(&permit, &json!({}), 1).await.unwrap();

        assert_eq!(votes.len(), 3);
        assert_eq!(store.votes_for_attempt(&id, 1).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_dispatch_runs_evaluators_concurrently() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));
        let evaluators: Vec<(&str, Arc<dyn Evaluator>)> = ["eval-a", "eval-b", "eval-c", "eval-d"]
            .into_iter()
            .map(|name| {
                (
                    name,
                    Arc::new(SlowEvaluator {
                        delay_ms: 50,
                        in_flight: in_flight.clone(),
                        max_in_flight: max_in_flight.clone(),
                    }) as Arc<dyn Evaluator>,
                )
            })
            .collect();

        let (dispatcher, store, _rec) = build_dispatcher(evaluators, fast_config());
        let id = seed_verification(&store).await;
        let permit = dispatcher.try_acquire(&id).unwrap();
        let votes = dispatcher.dispatch(&permit, &json!({}), 1).await.unwrap();

        assert_eq!(votes.len(), 4);
        assert!(
            max_in_flight.load(Ordering::SeqCst) > 1,
            "expected concurrent evaluator calls, max_in_flight={}",
            max_in_flight.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn test_deadline_records_timeout_abstentions_in_id_order() {
        let config = DispatchConfig {
            deadline_ms: 100,
            call_timeout_ms: 5_000,
            max_retries: 0,
            backoff_base_ms: 5,
        };
        let probe = Arc::new(AtomicUsize::new(0));
        let (dispatcher, store, _rec) = build_dispatcher(
            vec![
                ("eval-a", Arc::new(FixedEvaluator(MemberVote::Pass)) as Arc<dyn Evaluator>),
                (
                    "eval-c",
                    Arc::new(SlowEvaluator {
                        delay_ms: 10_000,
                        in_flight: probe.clone(),
                        max_in_flight: probe.clone(),
                    }) as _,
                ),
                (
                    "eval-b",
                    Arc::new(SlowEvaluator {
                        delay_ms: 10_000,
                        in_flight: probe.clone(),
                        max_in_flight: probe.clone(),
                    }) as _,
                ),
            ],
            config,
        );
        let id = seed_verification(&store).await;
        let permit = dispatcher.try_acquire(&id).unwrap();
        let votes = dispatcher.dispatch(&permit, &json!({}), 1).await.unwrap();

        assert_eq!(votes.len(), 3);
        let mut abstained: Vec<&str> = votes
            .iter()
            .filter(|v| !v.vote.is_cast())
            .map(|v| v.evaluator_id.0.as_str())
            .collect();
        abstained.sort();
        // Exactly the two hung members abstain, each with a timeout reason.
        assert_eq!(abstained, vec!["eval-b", "eval-c"]);
        assert!(votes.iter().all(|v| match v.vote {
            MemberVote::Abstain { reason } => reason == AbstainReason::Timeout,
            _ => true,
        }));
    }

    #[tokio::test]
    async fn test_second_acquire_is_rejected_not_queued() {
        let (dispatcher, store, _rec) = build_dispatcher(
            vec![("eval-a", Arc::new(FixedEvaluator(MemberVote::Pass)) as Arc<dyn Evaluator>)],
            fast_config(),
        );
        let id = seed_verification(&store).await;

        let permit = dispatcher.try_acquire(&id).unwrap();
        let err = dispatcher.try_acquire(&id).unwrap_err();
        assert!(matches!(err, CouncilError::DuplicateDispatch(_)));

        // Dropping the permit releases the slot.
        drop(permit);
        assert!(dispatcher.try_acquire(&id).is_ok());
    }

    #[tokio::test]
    async fn test_empty_council_is_an_error() {
        let (dispatcher, store, _rec) = build_dispatcher(vec![], fast_config());
        let id = seed_verification(&store).await;
        let permit = dispatcher.try_acquire(&id).unwrap();
        let err = dispatcher.dispatch(&permit, &json!({}), 1).await.unwrap_err();
        assert!(matches!(err, CouncilError::EmptyCouncil(_)));
    }

    #[tokio::test]
    async fn test_votes_stream_to_audit_log_as_they_arrive() {
        let (dispatcher, store, recorder) = build_dispatcher(
            vec![
                ("eval-a", Arc::new(FixedEvaluator(MemberVote::Pass)) as Arc<dyn Evaluator>),
                ("eval-b", Arc::new(FixedEvaluator(MemberVote::Pass)) as _),
            ],
            fast_config(),
        );
        let id = seed_verification(&store).await;
        let permit = dispatcher.try_acquire(&id).unwrap();
        dispatcher.dispatch(&permit, &json!({}), 1).await.unwrap();

        let entries = recorder.entries(&id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries
            .iter()
            .all(|e| e.event_kind == AuditEventKind::VoteReceived));
        let report = recorder.verify_chain(&id).await.unwrap();
        assert!(report.valid);
    }
}
