//! Views of a run exposed by the engine

use gxp_core::{
    ConsultationRequiredEvent, ContextSnapshot, CorrelationId, DecisionSchema, ErrorKind,
    ErrorRecoveryEvent, TestSuite, WorkflowEvent, WorkflowState,
};
use serde::{Deserialize, Serialize};

/// Point-in-time status of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStatus {
    pub correlation_id: CorrelationId,
    pub state: WorkflowState,
    pub last_event: Option<WorkflowEvent>,
    /// Set while the run is in `ConsultationPending`
    pub pending: Option<ConsultationRequiredEvent>,
    /// Audited transitions so far
    pub transitions: u64,
    /// Retries taken by collaborator calls
    pub recoveries: Vec<ErrorRecoveryEvent>,
}

impl RunStatus {
    /// Exactly the schema a resuming decision must satisfy
    #[must_use]
    pub fn pending_schema(&self) -> Option<&DecisionSchema> {
        self.pending.as_ref().map(|p| &p.schema)
    }
}

/// Artifact of a completed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedRun {
    pub correlation_id: CorrelationId,
    pub suite: TestSuite,
    pub suite_digest: String,
    pub transitions: u64,
    /// The run context as it stood at completion
    pub archive: ContextSnapshot,
}

/// Everything known about a failed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureReport {
    pub correlation_id: CorrelationId,
    /// State in which the originating error occurred
    pub stage: WorkflowState,
    pub error_kind: ErrorKind,
    /// Originating error first, then its sources
    pub error_chain: Vec<String>,
    pub context_snapshot: Option<ContextSnapshot>,
    pub last_event: Option<WorkflowEvent>,
    /// Escalation record, for expired consultations
    pub recovery: Option<ErrorRecoveryEvent>,
    pub recoveries: Vec<ErrorRecoveryEvent>,
    /// False when the transition to `Failed` itself could not be audited
    pub audit_complete: bool,
}

/// Terminal outcome of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunResult {
    Completed(CompletedRun),
    Failed(FailureReport),
}

impl RunResult {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, RunResult::Completed(_))
    }

    #[must_use]
    pub fn suite(&self) -> Option<&TestSuite> {
        match self {
            RunResult::Completed(run) => Some(&run.suite),
            RunResult::Failed(_) => None,
        }
    }

    #[must_use]
    pub fn failure(&self) -> Option<&FailureReport> {
        match self {
            RunResult::Completed(_) => None,
            RunResult::Failed(report) => Some(report),
        }
    }
}
