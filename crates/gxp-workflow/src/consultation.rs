//! Human consultation gate
//!
//! A run that needs a reviewer is suspended as a [`Continuation`]: a
//! serializable value holding the consultation event, the verified context
//! snapshot and where each decision leads. The gate keeps at most one
//! pending continuation per run and remembers every consultation it has
//! closed, so a decision is applied at most once.

use crate::collaborators::AccessControl;
use chrono::Utc;
use gxp_core::{
    CollaboratorError, ConsultationId, ConsultationReason, ConsultationRequiredEvent,
    ContextSnapshot, CorrelationId, DecisionKind, DecisionSchema, ErrorRecoveryEvent,
    UserDecisionEvent, WorkflowError, WorkflowState,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Action name checked with access control before a run is resumed
pub const RESUME_ACTION: &str = "resume_workflow";

/// A suspended run, sufficient to resume it in a fresh engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Continuation {
    pub consultation: ConsultationRequiredEvent,
    /// Re-entry state for a `retry` decision
    pub resume_from: WorkflowState,
    /// Acceptance state for a `proceed` decision
    #[serde(default)]
    pub proceed_to: Option<WorkflowState>,
    /// Transitions recorded before suspension
    pub sequence: u64,
    #[serde(default)]
    pub recoveries: Vec<ErrorRecoveryEvent>,
}

impl Continuation {
    #[inline]
    #[must_use]
    pub fn correlation_id(&self) -> CorrelationId {
        self.consultation.correlation_id
    }

    #[inline]
    #[must_use]
    pub fn consultation_id(&self) -> ConsultationId {
        self.consultation.consultation_id
    }

    /// Time left before the consultation expires
    #[must_use]
    pub fn remaining(&self) -> Duration {
        (self.consultation.deadline - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// What the machine asks for when it needs a reviewer
#[derive(Debug, Clone)]
pub struct ConsultationRequest {
    pub correlation_id: CorrelationId,
    pub reason: ConsultationReason,
    pub detail: String,
    pub raised_in: WorkflowState,
    pub snapshot: ContextSnapshot,
    pub resume_from: WorkflowState,
    pub proceed_to: Option<WorkflowState>,
    pub sequence: u64,
    pub recoveries: Vec<ErrorRecoveryEvent>,
}

/// Rejections of a decision; none of them changes run state
#[derive(Debug, thiserror::Error)]
pub enum ConsultationError {
    #[error("run {0} has no pending consultation")]
    NoPending(CorrelationId),

    #[error("consultation {0} was already resolved")]
    Duplicate(ConsultationId),

    #[error("decision targets consultation {got}, but {expected} is pending")]
    Mismatch {
        expected: ConsultationId,
        got: ConsultationId,
    },

    #[error("decision for run {got} submitted to run {expected}")]
    WrongRun {
        expected: CorrelationId,
        got: CorrelationId,
    },

    #[error("decision `{kind}` is not accepted for {reason}")]
    NotAdmitted {
        kind: DecisionKind,
        reason: ConsultationReason,
    },

    #[error("`{signer}` is not authorized as {role}")]
    Unauthorized { signer: String, role: String },

    #[error("authorization check failed")]
    Authorization(#[source] CollaboratorError),

    #[error("continuation for run {0} failed verification")]
    InvalidContinuation(CorrelationId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Closure {
    Decided,
    Expired,
    Withdrawn,
}

#[derive(Debug, Default)]
struct GateState {
    pending: HashMap<CorrelationId, Continuation>,
    closed: HashMap<ConsultationId, (CorrelationId, Closure)>,
}

/// Holds suspended runs until an authorized decision or expiry
#[derive(Debug)]
pub struct ConsultationGate {
    role: String,
    window: Duration,
    state: Mutex<GateState>,
}

impl ConsultationGate {
    /// # Arguments
    /// * `role` - Role a signer must hold to resume a run
    /// * `window` - Time a reviewer has before the run fails
    #[must_use]
    pub fn new(role: impl Into<String>, window: Duration) -> Self {
        Self {
            role: role.into(),
            window,
            state: Mutex::new(GateState::default()),
        }
    }

    #[inline]
    #[must_use]
    pub fn role(&self) -> &str {
        &self.role
    }

    /// Build the continuation for a request without registering it
    ///
    /// # Errors
    /// `WorkflowError::Internal` if the deadline is not representable.
    pub fn prepare(&self, request: ConsultationRequest) -> Result<Continuation, WorkflowError> {
        let can_proceed = request.proceed_to.is_some();
        let deadline = chrono::Duration::from_std(self.window)
            .ok()
            .and_then(|window| Utc::now().checked_add_signed(window))
            .ok_or_else(|| {
                WorkflowError::Internal(format!(
                    "consultation window of {}s has no representable deadline",
                    self.window.as_secs()
                ))
            })?;
        let consultation = ConsultationRequiredEvent {
            correlation_id: request.correlation_id,
            consultation_id: ConsultationId::new(),
            reason: request.reason,
            detail: request.detail,
            raised_in: request.raised_in,
            context_snapshot: request.snapshot,
            required_role: self.role.clone(),
            schema: DecisionSchema::for_reason(request.reason, self.role.clone(), can_proceed),
            deadline,
        };
        Ok(Continuation {
            consultation,
            resume_from: request.resume_from,
            proceed_to: request.proceed_to,
            sequence: request.sequence,
            recoveries: request.recoveries,
        })
    }

    /// Make a continuation claimable
    pub fn suspend(&self, continuation: Continuation) {
        let mut state = self.state.lock();
        tracing::info!(
            "Run {} awaiting {} decision ({})",
            continuation.correlation_id(),
            self.role,
            continuation.consultation.reason
        );
        state.pending.insert(continuation.correlation_id(), continuation);
    }

    /// Register a continuation persisted by an earlier process
    ///
    /// # Errors
    /// `InvalidContinuation` if the snapshot digest does not verify,
    /// `Duplicate` if this gate already closed the consultation.
    pub fn restore(&self, continuation: Continuation) -> Result<(), ConsultationError> {
        let correlation_id = continuation.correlation_id();
        if continuation.consultation.context_snapshot.verify().is_err()
            || continuation.consultation.context_snapshot.correlation_id != correlation_id
        {
            return Err(ConsultationError::InvalidContinuation(correlation_id));
        }
        if self
            .state
            .lock()
            .closed
            .contains_key(&continuation.consultation_id())
        {
            return Err(ConsultationError::Duplicate(continuation.consultation_id()));
        }
        self.suspend(continuation);
        Ok(())
    }

    /// The pending consultation of a run, if any
    #[must_use]
    pub fn pending(&self, correlation_id: CorrelationId) -> Option<ConsultationRequiredEvent> {
        self.state
            .lock()
            .pending
            .get(&correlation_id)
            .map(|c| c.consultation.clone())
    }

    /// Every suspended run, for persistence across restarts
    #[must_use]
    pub fn suspended(&self) -> Vec<Continuation> {
        self.state.lock().pending.values().cloned().collect()
    }

    /// Check a decision against the pending consultation without consuming it
    ///
    /// # Errors
    /// Any [`ConsultationError`] other than the authorization variants.
    pub fn check(&self, decision: &UserDecisionEvent) -> Result<(), ConsultationError> {
        let state = self.state.lock();
        Self::check_locked(&state, decision)
    }

    fn check_locked(state: &GateState, decision: &UserDecisionEvent) -> Result<(), ConsultationError> {
        let Some(continuation) = state.pending.get(&decision.correlation_id) else {
            if state.closed.contains_key(&decision.consultation_id) {
                return Err(ConsultationError::Duplicate(decision.consultation_id));
            }
            return Err(ConsultationError::NoPending(decision.correlation_id));
        };
        let pending = &continuation.consultation;
        if pending.consultation_id != decision.consultation_id {
            if state.closed.contains_key(&decision.consultation_id) {
                return Err(ConsultationError::Duplicate(decision.consultation_id));
            }
            return Err(ConsultationError::Mismatch {
                expected: pending.consultation_id,
                got: decision.consultation_id,
            });
        }
        if !pending.schema.admits(&decision.decision) {
            return Err(ConsultationError::NotAdmitted {
                kind: decision.decision.kind(),
                reason: pending.reason,
            });
        }
        Ok(())
    }

    /// Verify the signer holds the consultation role
    ///
    /// # Errors
    /// `Unauthorized` when access control says no, `Authorization` when it
    /// cannot be reached.
    pub async fn authorize(
        &self,
        access: &dyn AccessControl,
        decision: &UserDecisionEvent,
    ) -> Result<(), ConsultationError> {
        let allowed = access
            .authorize(&decision.signer, &self.role, RESUME_ACTION)
            .await
            .map_err(ConsultationError::Authorization)?;
        if allowed {
            Ok(())
        } else {
            tracing::warn!(
                "Rejected decision from `{}` for run {}: missing role {}",
                decision.signer,
                decision.correlation_id,
                self.role
            );
            Err(ConsultationError::Unauthorized {
                signer: decision.signer.clone(),
                role: self.role.clone(),
            })
        }
    }

    /// Atomically re-check and take the pending continuation
    ///
    /// Exactly one of any concurrent claims for the same consultation wins.
    ///
    /// # Errors
    /// As [`ConsultationGate::check`].
    pub fn claim(&self, decision: &UserDecisionEvent) -> Result<Continuation, ConsultationError> {
        let mut state = self.state.lock();
        Self::check_locked(&state, decision)?;
        let continuation = state
            .pending
            .remove(&decision.correlation_id)
            .ok_or(ConsultationError::NoPending(decision.correlation_id))?;
        state
            .closed
            .insert(decision.consultation_id, (decision.correlation_id, Closure::Decided));
        Ok(continuation)
    }

    /// Take the continuation if `consultation_id` is still pending
    ///
    /// Returns `None` when a decision already won the race.
    pub fn expire(
        &self,
        correlation_id: CorrelationId,
        consultation_id: ConsultationId,
    ) -> Option<Continuation> {
        self.close(correlation_id, consultation_id, Closure::Expired)
    }

    /// Take whatever continuation a run has pending, for cancellation
    pub fn withdraw(&self, correlation_id: CorrelationId) -> Option<Continuation> {
        let consultation_id = self.state.lock().pending.get(&correlation_id)?.consultation_id();
        self.close(correlation_id, consultation_id, Closure::Withdrawn)
    }

    fn close(
        &self,
        correlation_id: CorrelationId,
        consultation_id: ConsultationId,
        closure: Closure,
    ) -> Option<Continuation> {
        let mut state = self.state.lock();
        let matches = state
            .pending
            .get(&correlation_id)
            .is_some_and(|c| c.consultation_id() == consultation_id);
        if !matches {
            return None;
        }
        state.closed.insert(consultation_id, (correlation_id, closure));
        state.pending.remove(&correlation_id)
    }

    /// Drop the closed consultations of a finished run
    ///
    /// The caller must keep rejecting the run itself; once forgotten, the
    /// gate no longer recognizes its decisions as duplicates.
    pub fn forget(&self, correlation_id: CorrelationId) -> usize {
        let mut state = self.state.lock();
        let before = state.closed.len();
        state.closed.retain(|_, (run, _)| *run != correlation_id);
        before - state.closed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::MockAccessControl;
    use gxp_core::{Confidence, Decision, GampCategory, RunContext};

    fn gate() -> ConsultationGate {
        ConsultationGate::new("validation_engineer", Duration::from_secs(60))
    }

    fn request(id: CorrelationId, reason: ConsultationReason) -> ConsultationRequest {
        ConsultationRequest {
            correlation_id: id,
            reason,
            detail: "confidence 0.40 below 0.60".into(),
            raised_in: WorkflowState::Ingested,
            snapshot: RunContext::new(id).snapshot().unwrap(),
            resume_from: WorkflowState::Ingested,
            proceed_to: None,
            sequence: 1,
            recoveries: vec![],
        }
    }

    fn confirm(id: CorrelationId, consultation: ConsultationId) -> UserDecisionEvent {
        UserDecisionEvent::new(
            id,
            consultation,
            Decision::ConfirmCategory {
                category: GampCategory::Configured,
                confidence: Confidence::new(0.85).unwrap(),
                rationale: None,
            },
            "qa_1",
        )
    }

    #[test]
    fn decision_is_claimed_once() {
        let gate = gate();
        let id = CorrelationId::new();
        let cont = gate.prepare(request(id, ConsultationReason::LowConfidence)).unwrap();
        let cid = cont.consultation_id();
        gate.suspend(cont);

        let decision = confirm(id, cid);
        assert!(gate.check(&decision).is_ok());
        assert!(gate.claim(&decision).is_ok());

        let again = gate.claim(&decision).unwrap_err();
        assert!(matches!(again, ConsultationError::Duplicate(c) if c == cid));
        assert!(gate.pending(id).is_none());
    }

    #[test]
    fn decision_outside_schema_is_rejected() {
        let gate = gate();
        let id = CorrelationId::new();
        let cont = gate.prepare(request(id, ConsultationReason::LowConfidence)).unwrap();
        let cid = cont.consultation_id();
        gate.suspend(cont);

        let proceed = UserDecisionEvent::new(id, cid, Decision::Proceed { justification: None }, "qa_1");
        let err = gate.check(&proceed).unwrap_err();
        assert!(matches!(err, ConsultationError::NotAdmitted { kind: DecisionKind::Proceed, .. }));
        assert!(gate.pending(id).is_some());
    }

    #[test]
    fn proceed_is_offered_only_with_an_acceptance_state() {
        let gate = gate();
        let id = CorrelationId::new();
        let mut req = request(id, ConsultationReason::AggregationIncomplete);
        let without = gate.prepare(req.clone()).unwrap();
        assert!(!without.consultation.schema.accepted.contains(&DecisionKind::Proceed));

        req.proceed_to = Some(WorkflowState::AgentsAggregated);
        let with = gate.prepare(req).unwrap();
        assert!(with.consultation.schema.accepted.contains(&DecisionKind::Proceed));
    }

    #[test]
    fn wrong_consultation_id_is_a_mismatch() {
        let gate = gate();
        let id = CorrelationId::new();
        gate.suspend(gate.prepare(request(id, ConsultationReason::LowConfidence)).unwrap());
        let err = gate.check(&confirm(id, ConsultationId::new())).unwrap_err();
        assert!(matches!(err, ConsultationError::Mismatch { .. }));
    }

    #[test]
    fn expiry_loses_to_an_earlier_claim() {
        let gate = gate();
        let id = CorrelationId::new();
        let cont = gate.prepare(request(id, ConsultationReason::LowConfidence)).unwrap();
        let cid = cont.consultation_id();
        gate.suspend(cont);

        gate.claim(&confirm(id, cid)).unwrap();
        assert!(gate.expire(id, cid).is_none());
    }

    #[test]
    fn decision_after_expiry_is_duplicate() {
        let gate = gate();
        let id = CorrelationId::new();
        let cont = gate.prepare(request(id, ConsultationReason::LowConfidence)).unwrap();
        let cid = cont.consultation_id();
        gate.suspend(cont);

        assert!(gate.expire(id, cid).is_some());
        assert!(matches!(
            gate.check(&confirm(id, cid)).unwrap_err(),
            ConsultationError::Duplicate(_)
        ));
    }

    #[test]
    fn unrepresentable_deadline_is_an_error() {
        let gate = ConsultationGate::new("validation_engineer", Duration::from_secs(10_000_000_000_000));
        let id = CorrelationId::new();
        let err = gate.prepare(request(id, ConsultationReason::LowConfidence)).unwrap_err();
        assert!(matches!(err, WorkflowError::Internal(_)));
        assert!(gate.pending(id).is_none());
    }

    #[test]
    fn forget_drops_only_that_run() {
        let gate = gate();
        let (a, b) = (CorrelationId::new(), CorrelationId::new());
        let first = gate.prepare(request(a, ConsultationReason::LowConfidence)).unwrap();
        let second = gate.prepare(request(b, ConsultationReason::LowConfidence)).unwrap();
        let (first_id, second_id) = (first.consultation_id(), second.consultation_id());
        gate.suspend(first);
        gate.suspend(second);
        gate.claim(&confirm(a, first_id)).unwrap();
        gate.expire(b, second_id).unwrap();

        assert_eq!(gate.forget(a), 1);
        assert!(matches!(
            gate.check(&confirm(a, first_id)).unwrap_err(),
            ConsultationError::NoPending(_)
        ));
        assert!(matches!(
            gate.check(&confirm(b, second_id)).unwrap_err(),
            ConsultationError::Duplicate(_)
        ));
    }

    #[test]
    fn tampered_continuation_is_not_restored() {
        let gate = gate();
        let id = CorrelationId::new();
        let mut cont = gate.prepare(request(id, ConsultationReason::LowConfidence)).unwrap();
        cont.consultation.context_snapshot.digest = "0".repeat(64);
        assert!(matches!(
            gate.restore(cont).unwrap_err(),
            ConsultationError::InvalidContinuation(_)
        ));
    }

    #[tokio::test]
    async fn unauthorized_signer_is_rejected() {
        let mut access = MockAccessControl::new();
        access
            .expect_authorize()
            .withf(|user, role, action| user == "intern" && role == "validation_engineer" && action == RESUME_ACTION)
            .returning(|_, _, _| Ok(false));

        let gate = gate();
        let id = CorrelationId::new();
        let cont = gate.prepare(request(id, ConsultationReason::LowConfidence)).unwrap();
        let mut decision = confirm(id, cont.consultation_id());
        decision.signer = "intern".into();
        gate.suspend(cont);

        let err = gate.authorize(&access, &decision).await.unwrap_err();
        assert!(matches!(err, ConsultationError::Unauthorized { .. }));
        assert!(gate.pending(id).is_some());
    }
}
