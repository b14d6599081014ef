//! Audit trail recorder: append-only, hash-chained lifecycle log.
//!
//! The recorder is the single serialization point for a verification's audit
//! history: appends for one id go through a per-id async mutex, turning
//! concurrent vote arrivals into a total order. Each entry links to its
//! predecessor via `this_hash = SHA256(prev_hash ∥ payload_hash ∥ seq)`.
//!
//! A failed append is retried with exponential backoff; only after the retry
//! budget is exhausted does [`CouncilError::AuditWriteFailure`] surface —
//! a transition that could not be audited is treated as not having happened.
//!
//! Anchoring is best-effort and asynchronous: each appended hash is submitted
//! to the optional [`AnchorSink`] from a background task with its own bounded
//! retries. Anchoring failures never block the verification.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use council_ledger::{AnchorSink, AuditLedger};

use crate::config::{AnchorConfig, AuditRetryConfig};
use crate::domain::{
    canonical_digest, chain_hash, AuditEntryRecord, AuditEventKind, ChainDigest, CouncilError,
    Result, VerificationId,
};
use crate::obs;

/// Outcome of verifying one verification's audit chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReport {
    /// True when every hash recomputes and sequence numbers are gapless.
    pub valid: bool,
    /// Number of entries examined.
    pub entries: usize,
    /// Sequence number of the first broken entry, if any.
    pub broken_at: Option<u64>,
}

/// Append-only recorder over an [`AuditLedger`], with optional anchoring.
pub struct AuditRecorder {
    ledger: Arc<dyn AuditLedger>,
    anchor: Option<Arc<dyn AnchorSink>>,
    retry: AuditRetryConfig,
    anchoring: AnchorConfig,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl AuditRecorder {
    pub fn new(
        ledger: Arc<dyn AuditLedger>,
        anchor: Option<Arc<dyn AnchorSink>>,
        retry: AuditRetryConfig,
        anchoring: AnchorConfig,
    ) -> Self {
        Self {
            ledger,
            anchor,
            retry,
            anchoring,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, id: &VerificationId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks.entry(id.0.clone()).or_default().clone()
    }

    /// Append one lifecycle event for `id`, in strict arrival order.
    ///
    /// Returns the appended entry (with its chain hash) on success.
    pub async fn append(
        &self,
        id: &VerificationId,
        kind: AuditEventKind,
        payload: serde_json::Value,
    ) -> Result<AuditEntryRecord> {
        let id_lock = self.lock_for(id);
        let _guard = id_lock.lock().await;

        let head = self.ledger.head(id).await?;
        let (sequence_no, prev_hash) = match &head {
            Some(entry) => (entry.sequence_no + 1, entry.this_hash.clone()),
            None => (0, ChainDigest::genesis()),
        };

        let payload_hash = canonical_digest(&payload);
        let this_hash = chain_hash(&prev_hash, &payload_hash, sequence_no);
        let entry = AuditEntryRecord {
            verification_id: id.clone(),
            sequence_no,
            event_kind: kind,
            payload,
            payload_hash,
            prev_hash,
            this_hash,
            anchored_ref: None,
            recorded_at: Utc::now(),
        };

        self.append_with_retry(&entry).await?;
        obs::emit_audit_appended(&id.0, kind.as_str(), sequence_no);

        if let Some(sink) = &self.anchor {
            self.spawn_anchor_task(Arc::clone(sink), entry.clone());
        }
        Ok(entry)
    }

    async fn append_with_retry(&self, entry: &AuditEntryRecord) -> Result<()> {
        let mut last_error = String::new();
        for attempt in 1..=self.retry.max_attempts {
            match self.ledger.append(entry.clone()).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!(
                        event = "audit.append_retry",
                        verification_id = %entry.verification_id,
                        seq = entry.sequence_no,
                        attempt = attempt,
                        error = %err,
                    );
                    last_error = err.to_string();
                }
            }
            if attempt < self.retry.max_attempts {
                let delay =
                    Duration::from_millis(self.retry.backoff_base_ms * 2u64.pow(attempt - 1));
                tokio::time::sleep(delay).await;
            }
        }
        Err(CouncilError::AuditWriteFailure {
            verification_id: entry.verification_id.clone(),
            attempts: self.retry.max_attempts,
            detail: last_error,
        })
    }

    fn spawn_anchor_task(&self, sink: Arc<dyn AnchorSink>, entry: AuditEntryRecord) {
        let ledger = Arc::clone(&self.ledger);
        let cfg = self.anchoring.clone();
        tokio::spawn(async move {
            for attempt in 1..=cfg.max_attempts {
                match sink.submit_hash(&entry.this_hash).await {
                    Ok(anchor_ref) => {
                        obs::emit_entry_anchored(
                            &entry.verification_id.0,
                            entry.sequence_no,
                            &anchor_ref,
                        );
                        if let Err(err) = ledger
                            .set_anchor_ref(&entry.verification_id, entry.sequence_no, &anchor_ref)
                            .await
                        {
                            warn!(
                                event = "audit.anchor_ref_write_failed",
                                verification_id = %entry.verification_id,
                                seq = entry.sequence_no,
                                error = %err,
                            );
                        }
                        return;
                    }
                    Err(err) => {
                        warn!(
                            event = "audit.anchor_retry",
                            verification_id = %entry.verification_id,
                            seq = entry.sequence_no,
                            attempt = attempt,
                            error = %err,
                        );
                    }
                }
                if attempt < cfg.max_attempts {
                    let delay = Duration::from_millis(cfg.backoff_base_ms * 2u64.pow(attempt - 1));
                    tokio::time::sleep(delay).await;
                }
            }
            // Entry stays observable as unanchored (anchored_ref = None).
            warn!(
                event = "audit.anchor_gave_up",
                verification_id = %entry.verification_id,
                seq = entry.sequence_no,
                attempts = cfg.max_attempts,
            );
        });
    }

    /// Release the per-id append lock once a verification reaches a terminal
    /// state, so a long-lived recorder does not hold one mutex per id seen.
    /// The lock is recreated on demand if the id is appended again (operator
    /// retry of a failed run).
    pub fn retire(&self, id: &VerificationId) {
        self.locks.lock().unwrap().remove(&id.0);
    }

    /// All entries for `id` in sequence order.
    pub async fn entries(&self, id: &VerificationId) -> Result<Vec<AuditEntryRecord>> {
        Ok(self.ledger.entries(id).await?)
    }

    /// Recompute every hash in sequence order and check for gaps.
    pub async fn verify_chain(&self, id: &VerificationId) -> Result<ChainReport> {
        let entries = self.ledger.entries(id).await?;
        let mut prev_hash = ChainDigest::genesis();
        for (i, entry) in entries.iter().enumerate() {
            let broken = entry.sequence_no != i as u64
                || entry.prev_hash != prev_hash
                || entry.payload_hash != canonical_digest(&entry.payload)
                || entry.this_hash
                    != chain_hash(&entry.prev_hash, &entry.payload_hash, entry.sequence_no);
            if broken {
                return Ok(ChainReport {
                    valid: false,
                    entries: entries.len(),
                    broken_at: Some(entry.sequence_no),
                });
            }
            prev_hash = entry.this_hash.clone();
        }
        Ok(ChainReport {
            valid: true,
            entries: entries.len(),
            broken_at: None,
        })
    }
}
