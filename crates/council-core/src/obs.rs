//! Structured observability hooks for verification lifecycle events.
//!
//! Events are emitted at `info!` level through `tracing` with a stable
//! `event = "..."` field, so log pipelines can filter on lifecycle stages
//! without parsing message text.

use tracing::info;

use crate::domain::Verdict;

/// Emit event: verification created in `pending`.
pub fn emit_verification_created(verification_id: &str, council_size: usize) {
    info!(
        event = "verification.created",
        verification_id = %verification_id,
        council_size = council_size,
    );
}

/// Emit event: dispatch accepted, council fan-out starting.
pub fn emit_dispatch_started(verification_id: &str, attempt: u32, council_size: usize) {
    info!(
        event = "verification.dispatch_started",
        verification_id = %verification_id,
        attempt = attempt,
        council_size = council_size,
    );
}

/// Emit event: one council vote arrived (or abstained).
pub fn emit_vote_received(verification_id: &str, evaluator_id: &str, latency_ms: u64) {
    info!(
        event = "verification.vote_received",
        verification_id = %verification_id,
        evaluator_id = %evaluator_id,
        latency_ms = latency_ms,
    );
}

/// Emit event: aggregation finished with the given tally summary.
pub fn emit_verdict_aggregated(verification_id: &str, summary: &str) {
    info!(
        event = "verification.aggregated",
        verification_id = %verification_id,
        summary = %summary,
    );
}

/// Emit event: verification completed with a final verdict.
pub fn emit_verification_completed(verification_id: &str, verdict: Verdict) {
    info!(
        event = "verification.completed",
        verification_id = %verification_id,
        verdict = ?verdict,
    );
}

/// Emit event: verification failed with a reason code.
pub fn emit_verification_failed(verification_id: &str, reason: &str) {
    info!(
        event = "verification.failed",
        verification_id = %verification_id,
        reason = %reason,
    );
}

/// Emit event: one audit entry appended to the chain.
pub fn emit_audit_appended(verification_id: &str, event_kind: &str, seq: u64) {
    info!(
        event = "audit.entry_appended",
        verification_id = %verification_id,
        kind = %event_kind,
        seq = seq,
    );
}

/// Emit event: one audit entry anchored externally.
pub fn emit_entry_anchored(verification_id: &str, seq: u64, anchor_ref: &str) {
    info!(
        event = "audit.entry_anchored",
        verification_id = %verification_id,
        seq = seq,
        anchor_ref = %anchor_ref,
    );
}
