//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryVerificationStore`, `MemoryAuditLedger`, and
//! `MemoryAnchorSink` that satisfy the trait contracts without any external
//! dependencies.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{StorageError, StorageResult};
use crate::records::*;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryVerificationStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct VerificationState {
    record: Option<VerificationRecord>,
    votes: Vec<VoteRecord>,
}

/// In-memory verification store backed by a `HashMap<id, state>`.
#[derive(Debug, Default)]
pub struct MemoryVerificationStore {
    verifications: Mutex<HashMap<String, VerificationState>>,
}

impl MemoryVerificationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VerificationStore for MemoryVerificationStore {
    async fn create(&self, record: VerificationRecord) -> StorageResult<()> {
        let mut map = self.verifications.lock().unwrap();
        let state = map.entry(record.id.0.clone()).or_default();
        if state.record.is_some() {
            return Err(StorageError::WriteFailed(format!(
                "verification already exists: {}",
                record.id
            )));
        }
        state.record = Some(record);
        Ok(())
    }

    async fn get(&self, id: &VerificationId) -> StorageResult<VerificationRecord> {
        let map = self.verifications.lock().unwrap();
        map.get(&id.0)
            .and_then(|s| s.record.clone())
            .ok_or_else(|| StorageError::VerificationNotFound {
                verification_id: id.0.clone(),
            })
    }

    async fn update_lifecycle(
        &self,
        id: &VerificationId,
        status: VerificationStatus,
        verdict: Option<Verdict>,
        attempt: u32,
    ) -> StorageResult<()> {
        let mut map = self.verifications.lock().unwrap();
        let record = map
            .get_mut(&id.0)
            .and_then(|s| s.record.as_mut())
            .ok_or_else(|| StorageError::VerificationNotFound {
                verification_id: id.0.clone(),
            })?;
        record.status = status;
        record.verdict = verdict;
        record.attempt = attempt;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn record_vote(&self, vote: VoteRecord) -> StorageResult<()> {
        let mut map = self.verifications.lock().unwrap();
        let state = map.get_mut(&vote.verification_id.0).ok_or_else(|| {
            StorageError::VerificationNotFound {
                verification_id: vote.verification_id.0.clone(),
            }
        })?;
        let duplicate = state.votes.iter().any(|v| {
            v.evaluator_id == vote.evaluator_id && v.attempt == vote.attempt
        });
        if duplicate {
            return Err(StorageError::DuplicateVote {
                verification_id: vote.verification_id.0.clone(),
                evaluator_id: vote.evaluator_id.0.clone(),
                attempt: vote.attempt,
            });
        }
        state.votes.push(vote);
        Ok(())
    }

    async fn votes_for_attempt(
        &self,
        id: &VerificationId,
        attempt: u32,
    ) -> StorageResult<Vec<VoteRecord>> {
        let map = self.verifications.lock().unwrap();
        let state = map
            .get(&id.0)
            .ok_or_else(|| StorageError::VerificationNotFound {
                verification_id: id.0.clone(),
            })?;
        Ok(state
            .votes
            .iter()
            .filter(|v| v.attempt == attempt)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MemoryAuditLedger
// ---------------------------------------------------------------------------

/// In-memory insert-only audit ledger.
///
/// Enforces the gapless-sequence contract on append, so tests exercising the
/// recorder run against the same rules a relational backend would apply.
#[derive(Debug, Default)]
pub struct MemoryAuditLedger {
    chains: Mutex<HashMap<String, Vec<AuditEntryRecord>>>,
}

impl MemoryAuditLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditLedger for MemoryAuditLedger {
    async fn append(&self, entry: AuditEntryRecord) -> StorageResult<()> {
        let mut chains = self.chains.lock().unwrap();
        let chain = chains.entry(entry.verification_id.0.clone()).or_default();
        let expected = chain.len() as u64;
        if entry.sequence_no != expected {
            return Err(StorageError::SequenceViolation {
                verification_id: entry.verification_id.0.clone(),
                expected,
                got: entry.sequence_no,
            });
        }
        chain.push(entry);
        Ok(())
    }

    async fn head(&self, id: &VerificationId) -> StorageResult<Option<AuditEntryRecord>> {
        let chains = self.chains.lock().unwrap();
        Ok(chains.get(&id.0).and_then(|c| c.last().cloned()))
    }

    async fn entries(&self, id: &VerificationId) -> StorageResult<Vec<AuditEntryRecord>> {
        let chains = self.chains.lock().unwrap();
        Ok(chains.get(&id.0).cloned().unwrap_or_default())
    }

    async fn set_anchor_ref(
        &self,
        id: &VerificationId,
        sequence_no: u64,
        anchor_ref: &str,
    ) -> StorageResult<()> {
        let mut chains = self.chains.lock().unwrap();
        let entry = chains
            .get_mut(&id.0)
            .and_then(|c| c.get_mut(sequence_no as usize))
            .ok_or_else(|| StorageError::EntryNotFound {
                verification_id: id.0.clone(),
                sequence_no,
            })?;
        entry.anchored_ref = Some(anchor_ref.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryAnchorSink
// ---------------------------------------------------------------------------

/// In-memory anchor sink. Idempotent: resubmitting a digest returns the
/// original anchor reference.
#[derive(Debug, Default)]
pub struct MemoryAnchorSink {
    anchors: Mutex<HashMap<String, String>>,
}

impl MemoryAnchorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct digests anchored so far.
    pub fn anchored_count(&self) -> usize {
        self.anchors.lock().unwrap().len()
    }
}

#[async_trait]
impl AnchorSink for MemoryAnchorSink {
    async fn submit_hash(&self, digest: &ChainDigest) -> StorageResult<String> {
        let mut anchors = self.anchors.lock().unwrap();
        let next_ref = format!("anchor_{:08x}", anchors.len());
        Ok(anchors
            .entry(digest.as_str().to_string())
            .or_insert(next_ref)
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn verification(id: &VerificationId) -> VerificationRecord {
        VerificationRecord {
            id: id.clone(),
            status: VerificationStatus::Pending,
            verdict: None,
            council_size: 3,
            attempt: 0,
            payload: json!({"claim": "the sky is blue"}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn vote(id: &VerificationId, evaluator: &str, attempt: u32) -> VoteRecord {
        VoteRecord {
            verification_id: id.clone(),
            evaluator_id: EvaluatorId::new(evaluator),
            attempt,
            vote: MemberVote::Pass,
            latency_ms: 42,
            raw_rationale: Some("looks fine".to_string()),
            received_at: Utc::now(),
        }
    }

    fn entry(id: &VerificationId, seq: u64) -> AuditEntryRecord {
        let payload = json!({"seq": seq});
        let payload_hash = ChainDigest::from_bytes(payload.to_string().as_bytes());
        AuditEntryRecord {
            verification_id: id.clone(),
            sequence_no: seq,
            event_kind: AuditEventKind::Created,
            payload,
            payload_hash: payload_hash.clone(),
            prev_hash: ChainDigest::genesis(),
            this_hash: payload_hash,
            anchored_ref: None,
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_store_create_and_get() {
        let store = MemoryVerificationStore::new();
        let id = VerificationId::generate();
        store.create(verification(&id)).await.unwrap();
        let got = store.get(&id).await.unwrap();
        assert_eq!(got.status, VerificationStatus::Pending);
        assert_eq!(got.council_size, 3);
    }

    #[tokio::test]
    async fn test_store_rejects_duplicate_create() {
        let store = MemoryVerificationStore::new();
        let id = VerificationId::generate();
        store.create(verification(&id)).await.unwrap();
        assert!(store.create(verification(&id)).await.is_err());
    }

    #[tokio::test]
    async fn test_store_rejects_duplicate_vote_per_attempt() {
        let store = MemoryVerificationStore::new();
        let id = VerificationId::generate();
        store.create(verification(&id)).await.unwrap();

        store.record_vote(vote(&id, "eval-1", 1)).await.unwrap();
        let err = store.record_vote(vote(&id, "eval-1", 1)).await.unwrap_err();
        assert!(matches!(err, StorageError::DuplicateVote { .. }));

        // A new attempt may record a fresh vote from the same evaluator.
        store.record_vote(vote(&id, "eval-1", 2)).await.unwrap();
        assert_eq!(store.votes_for_attempt(&id, 2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ledger_enforces_gapless_sequence() {
        let ledger = MemoryAuditLedger::new();
        let id = VerificationId::generate();

        ledger.append(entry(&id, 0)).await.unwrap();
        ledger.append(entry(&id, 1)).await.unwrap();

        let err = ledger.append(entry(&id, 3)).await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::SequenceViolation {
                expected: 2,
                got: 3,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_ledger_head_and_anchor_ref() {
        let ledger = MemoryAuditLedger::new();
        let id = VerificationId::generate();
        ledger.append(entry(&id, 0)).await.unwrap();

        let head = ledger.head(&id).await.unwrap().unwrap();
        assert_eq!(head.sequence_no, 0);
        assert!(head.anchored_ref.is_none());

        ledger.set_anchor_ref(&id, 0, "anchor_0").await.unwrap();
        let head = ledger.head(&id).await.unwrap().unwrap();
        assert_eq!(head.anchored_ref.as_deref(), Some("anchor_0"));
    }

    #[tokio::test]
    async fn test_anchor_sink_is_idempotent() {
        let sink = MemoryAnchorSink::new();
        let d = ChainDigest::from_bytes(b"entry");
        let first = sink.submit_hash(&d).await.unwrap();
        let second = sink.submit_hash(&d).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(sink.anchored_count(), 1);
    }
}
