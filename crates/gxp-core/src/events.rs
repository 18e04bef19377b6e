//! Workflow events
//!
//! Every transition carries exactly one immutable [`WorkflowEvent`]. The enum
//! is closed: code that reacts to events matches on it exhaustively.

use crate::context::ContextSnapshot;
use crate::decision::{Decision, DecisionSchema};
use crate::error::ErrorKind;
use crate::ids::{ConsultationId, CorrelationId};
use crate::types::{
    AgentResult, Confidence, DocumentRef, GampCategory, TestStrategy, ValidationStatus,
    WorkflowState,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A document entered the workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionEvent {
    pub correlation_id: CorrelationId,
    pub document: DocumentRef,
    pub received_at: DateTime<Utc>,
}

/// The document was assigned a GAMP category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorizationEvent {
    pub correlation_id: CorrelationId,
    pub category: GampCategory,
    pub confidence: Confidence,
    pub rationale: String,
    /// Reviewer who supplied the category, if it came from a consultation
    #[serde(default)]
    pub confirmed_by: Option<String>,
}

/// A test strategy was planned
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanningEvent {
    pub correlation_id: CorrelationId,
    pub strategy: TestStrategy,
    /// Knowledge-store references consulted while planning
    #[serde(default)]
    pub knowledge_refs: Vec<String>,
}

/// All planned agents settled
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchEvent {
    pub correlation_id: CorrelationId,
    pub results: Vec<AgentResult>,
}

/// Agent results were evaluated against the aggregation policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationEvent {
    pub correlation_id: CorrelationId,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub required: usize,
    /// Reviewer who accepted a partial aggregation
    #[serde(default)]
    pub accepted_by: Option<String>,
}

/// A test suite was generated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteGeneratedEvent {
    pub correlation_id: CorrelationId,
    pub suite_id: String,
    pub test_count: usize,
    pub suite_digest: String,
}

/// The generated suite was validated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationEvent {
    pub correlation_id: CorrelationId,
    pub status: ValidationStatus,
    #[serde(default)]
    pub findings: Vec<String>,
    /// Reviewer who accepted a suite that did not pass on its own
    #[serde(default)]
    pub accepted_by: Option<String>,
}

/// Why a run was suspended for a human decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationReason {
    LowConfidence,
    ValidationError,
    AggregationIncomplete,
    RetriesExhausted,
}

impl fmt::Display for ConsultationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConsultationReason::LowConfidence => "low_confidence",
            ConsultationReason::ValidationError => "validation_error",
            ConsultationReason::AggregationIncomplete => "aggregation_incomplete",
            ConsultationReason::RetriesExhausted => "retries_exhausted",
        };
        f.write_str(s)
    }
}

/// The run is suspended until an authorized decision arrives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultationRequiredEvent {
    pub correlation_id: CorrelationId,
    pub consultation_id: ConsultationId,
    pub reason: ConsultationReason,
    /// Human-readable cause
    pub detail: String,
    /// State the run was in when it was suspended
    pub raised_in: WorkflowState,
    pub context_snapshot: ContextSnapshot,
    pub required_role: String,
    pub schema: DecisionSchema,
    pub deadline: DateTime<Utc>,
}

/// A reviewer's decision on a pending consultation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserDecisionEvent {
    pub correlation_id: CorrelationId,
    pub consultation_id: ConsultationId,
    pub decision: Decision,
    pub signer: String,
    pub timestamp: DateTime<Utc>,
}

impl UserDecisionEvent {
    pub fn new(
        correlation_id: CorrelationId,
        consultation_id: ConsultationId,
        decision: Decision,
        signer: impl Into<String>,
    ) -> Self {
        Self {
            correlation_id,
            consultation_id,
            decision,
            signer: signer.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Retry or escalation bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecoveryEvent {
    pub correlation_id: CorrelationId,
    pub error_kind: ErrorKind,
    pub retry_count: u32,
    pub escalated: bool,
    pub detail: String,
}

/// The run produced a validated suite
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub correlation_id: CorrelationId,
    pub suite_id: String,
    pub suite_digest: String,
}

/// The run terminated unsuccessfully
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureEvent {
    pub correlation_id: CorrelationId,
    /// State in which the failure was raised
    pub stage: WorkflowState,
    pub error_kind: ErrorKind,
    /// Originating error followed by its sources
    pub error_chain: Vec<String>,
    #[serde(default)]
    pub recovery: Option<ErrorRecoveryEvent>,
    /// Agent results settled before the failure, kept for the record
    #[serde(default)]
    pub partial_results: Vec<AgentResult>,
}

/// Closed set of events carried by transitions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    Ingestion(IngestionEvent),
    Categorization(CategorizationEvent),
    Planning(PlanningEvent),
    Dispatch(DispatchEvent),
    Aggregation(AggregationEvent),
    SuiteGenerated(SuiteGeneratedEvent),
    Validation(ValidationEvent),
    ConsultationRequired(ConsultationRequiredEvent),
    Decision(UserDecisionEvent),
    Completion(CompletionEvent),
    Failure(FailureEvent),
}

/// Discriminant of [`WorkflowEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Ingestion,
    Categorization,
    Planning,
    Dispatch,
    Aggregation,
    SuiteGenerated,
    Validation,
    ConsultationRequired,
    Decision,
    Completion,
    Failure,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl WorkflowEvent {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            WorkflowEvent::Ingestion(_) => EventKind::Ingestion,
            WorkflowEvent::Categorization(_) => EventKind::Categorization,
            WorkflowEvent::Planning(_) => EventKind::Planning,
            WorkflowEvent::Dispatch(_) => EventKind::Dispatch,
            WorkflowEvent::Aggregation(_) => EventKind::Aggregation,
            WorkflowEvent::SuiteGenerated(_) => EventKind::SuiteGenerated,
            WorkflowEvent::Validation(_) => EventKind::Validation,
            WorkflowEvent::ConsultationRequired(_) => EventKind::ConsultationRequired,
            WorkflowEvent::Decision(_) => EventKind::Decision,
            WorkflowEvent::Completion(_) => EventKind::Completion,
            WorkflowEvent::Failure(_) => EventKind::Failure,
        }
    }

    #[must_use]
    pub fn correlation_id(&self) -> CorrelationId {
        match self {
            WorkflowEvent::Ingestion(e) => e.correlation_id,
            WorkflowEvent::Categorization(e) => e.correlation_id,
            WorkflowEvent::Planning(e) => e.correlation_id,
            WorkflowEvent::Dispatch(e) => e.correlation_id,
            WorkflowEvent::Aggregation(e) => e.correlation_id,
            WorkflowEvent::SuiteGenerated(e) => e.correlation_id,
            WorkflowEvent::Validation(e) => e.correlation_id,
            WorkflowEvent::ConsultationRequired(e) => e.correlation_id,
            WorkflowEvent::Decision(e) => e.correlation_id,
            WorkflowEvent::Completion(e) => e.correlation_id,
            WorkflowEvent::Failure(e) => e.correlation_id,
        }
    }
}
