//! Testing utilities for the GxP workflow workspace
//!
//! Fast configurations, decision builders and audit-trail assertions.

#![allow(missing_docs)]

use gxp_audit::{AuditRecord, MemoryAuditLog};
use gxp_core::{
    Confidence, ConsultationRequiredEvent, CorrelationId, Decision, GampCategory, RetryConfig,
    UserDecisionEvent, WorkflowConfig, WorkflowState,
};
use gxp_workflow::{RunStatus, WorkflowEngine};
use std::time::Duration;

/// Reviewer holding the default consultation role in the harness
pub const REVIEWER: &str = "qa_1";

/// Upper bound for any single wait in a test
pub const SETTLE_LIMIT: Duration = Duration::from_secs(10);

/// Defaults with timeouts and backoff short enough for tests
pub fn fast_config() -> WorkflowConfig {
    WorkflowConfig::new()
        .with_agent_timeout(Duration::from_millis(200))
        .with_collaborator_timeout(Duration::from_millis(500))
        .with_retry(RetryConfig {
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 5,
        })
        .with_consultation_timeout(Duration::from_secs(60))
}

/// Wait for a run to settle, panicking if it takes longer than [`SETTLE_LIMIT`]
pub async fn settled(engine: &WorkflowEngine, run: CorrelationId) -> RunStatus {
    tokio::time::timeout(SETTLE_LIMIT, engine.wait_settled(run))
        .await
        .expect("run did not settle in time")
        .expect("run is known to the engine")
}

/// Wait for a run to complete or fail, through any suspension
pub async fn terminal(engine: &WorkflowEngine, run: CorrelationId) -> RunStatus {
    tokio::time::timeout(SETTLE_LIMIT, async {
        loop {
            let status = engine.status(run).expect("run is known to the engine");
            if status.state.is_terminal() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("run did not terminate in time")
}

/// Poll `condition` until it holds, panicking after [`SETTLE_LIMIT`]
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(SETTLE_LIMIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never held");
}

/// The consultation a settled run is waiting on
pub fn pending(status: &RunStatus) -> ConsultationRequiredEvent {
    assert_eq!(status.state, WorkflowState::ConsultationPending, "run is not suspended");
    status.pending.clone().expect("suspended run carries its consultation")
}

pub fn decide(pending: &ConsultationRequiredEvent, decision: Decision, signer: &str) -> UserDecisionEvent {
    UserDecisionEvent::new(pending.correlation_id, pending.consultation_id, decision, signer)
}

pub fn confirm(pending: &ConsultationRequiredEvent, category: GampCategory, confidence: f64) -> UserDecisionEvent {
    decide(
        pending,
        Decision::ConfirmCategory {
            category,
            confidence: Confidence::new(confidence).expect("confidence in range"),
            rationale: Some("reviewed against the URS".into()),
        },
        REVIEWER,
    )
}

pub fn proceed(pending: &ConsultationRequiredEvent) -> UserDecisionEvent {
    decide(
        pending,
        Decision::Proceed {
            justification: Some("residual risk accepted".into()),
        },
        REVIEWER,
    )
}

pub fn retry(pending: &ConsultationRequiredEvent) -> UserDecisionEvent {
    decide(pending, Decision::Retry, REVIEWER)
}

pub fn abort(pending: &ConsultationRequiredEvent, reason: &str) -> UserDecisionEvent {
    decide(pending, Decision::Abort { reason: reason.into() }, REVIEWER)
}

/// `(prior, new)` state pairs of a run's audit records, in order
pub fn trail(log: &MemoryAuditLog, run: CorrelationId) -> Vec<(WorkflowState, WorkflowState)> {
    log.records_for(run)
        .iter()
        .map(|r: &AuditRecord| (r.prior_state, r.new_state))
        .collect()
}

/// One audit record per transition, sequenced from 1, with a valid chain
pub fn assert_audit_consistent(log: &MemoryAuditLog, run: CorrelationId, transitions: u64) {
    let records = log.records_for(run);
    assert_eq!(records.len() as u64, transitions, "one audit record per transition");
    for (i, record) in records.iter().enumerate() {
        assert_eq!(record.sequence, i as u64 + 1, "audit sequence is gap-free");
    }
    for pair in records.windows(2) {
        assert_eq!(pair[0].new_state, pair[1].prior_state, "audit trail is contiguous");
    }
    log.verify_integrity().expect("audit chain verifies");
}
