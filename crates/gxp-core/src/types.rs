//! Core domain types
//!
//! Defines the fundamental types shared by every stage:
//! - GAMP software category and categorization confidence
//! - Workflow states and the terminal/suspended split
//! - Agent requests, results and statuses
//! - The planned test strategy and the generated test suite

use crate::error::WorkflowError;
use crate::ids::{CorrelationId, SubTaskId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// GAMP 5 software category
///
/// Category 2 was retired from GAMP 5 and is rejected rather than mapped to a
/// neighbouring category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum GampCategory {
    /// Category 1: infrastructure software
    Infrastructure,
    /// Category 3: non-configured products
    NonConfigured,
    /// Category 4: configured products
    Configured,
    /// Category 5: custom applications
    Custom,
}

impl GampCategory {
    /// Numeric category as used in GAMP literature
    #[inline]
    #[must_use]
    pub fn number(self) -> u8 {
        match self {
            GampCategory::Infrastructure => 1,
            GampCategory::NonConfigured => 3,
            GampCategory::Configured => 4,
            GampCategory::Custom => 5,
        }
    }
}

impl TryFrom<i64> for GampCategory {
    type Error = WorkflowError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(GampCategory::Infrastructure),
            3 => Ok(GampCategory::NonConfigured),
            4 => Ok(GampCategory::Configured),
            5 => Ok(GampCategory::Custom),
            other => Err(WorkflowError::InvalidCategory(other)),
        }
    }
}

impl From<GampCategory> for i64 {
    fn from(value: GampCategory) -> Self {
        i64::from(value.number())
    }
}

impl fmt::Display for GampCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "category {}", self.number())
    }
}

/// Confidence score in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Confidence(f64);

impl Confidence {
    /// Validate and wrap a raw score
    ///
    /// # Errors
    /// `WorkflowError::InvalidConfidence` for NaN or values outside `[0, 1]`.
    pub fn new(value: f64) -> Result<Self, WorkflowError> {
        if value.is_nan() || !(0.0..=1.0).contains(&value) {
            return Err(WorkflowError::InvalidConfidence(value));
        }
        Ok(Self(value))
    }

    /// The raw score
    #[inline]
    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }

    /// Whether this score satisfies the given threshold (inclusive)
    #[inline]
    #[must_use]
    pub fn meets(self, threshold: f64) -> bool {
        self.0 >= threshold
    }
}

impl TryFrom<f64> for Confidence {
    type Error = WorkflowError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Confidence> for f64 {
    fn from(value: Confidence) -> Self {
        value.0
    }
}

/// States of the workflow state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    /// Document accepted, awaiting categorization
    Ingested,
    /// GAMP category fixed, by the model or a reviewer
    Categorized,
    /// Test strategy chosen
    Planned,
    /// Every planned agent has settled
    AgentsDispatched,
    /// Agent results meet the success threshold or were accepted
    AgentsAggregated,
    /// Suite produced by the model
    SuiteGenerated,
    /// Suite passed review or was accepted
    Validated,
    /// Terminal success
    Completed,
    /// Suspended until a reviewer decides
    ConsultationPending,
    /// Terminal failure
    Failed,
}

impl WorkflowState {
    /// All states, in pipeline order followed by the side states
    pub const ALL: [WorkflowState; 10] = [
        WorkflowState::Ingested,
        WorkflowState::Categorized,
        WorkflowState::Planned,
        WorkflowState::AgentsDispatched,
        WorkflowState::AgentsAggregated,
        WorkflowState::SuiteGenerated,
        WorkflowState::Validated,
        WorkflowState::Completed,
        WorkflowState::ConsultationPending,
        WorkflowState::Failed,
    ];

    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowState::Completed | WorkflowState::Failed)
    }

    /// Terminal or waiting on a human decision
    #[inline]
    #[must_use]
    pub fn is_settled(self) -> bool {
        self.is_terminal() || self == WorkflowState::ConsultationPending
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowState::Ingested => "ingested",
            WorkflowState::Categorized => "categorized",
            WorkflowState::Planned => "planned",
            WorkflowState::AgentsDispatched => "agents_dispatched",
            WorkflowState::AgentsAggregated => "agents_aggregated",
            WorkflowState::SuiteGenerated => "suite_generated",
            WorkflowState::Validated => "validated",
            WorkflowState::Completed => "completed",
            WorkflowState::ConsultationPending => "consultation_pending",
            WorkflowState::Failed => "failed",
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Worker agent kinds that planning can request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    /// Pulls regulatory context from the knowledge store
    ContextProvider,
    /// Domain subject-matter review
    SubjectMatterExpert,
    /// Regulatory and industry research
    Research,
}

impl AgentType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AgentType::ContextProvider => "context_provider",
            AgentType::SubjectMatterExpert => "subject_matter_expert",
            AgentType::Research => "research",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settlement status of one agent request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Success,
    Failure,
    Timeout,
}

/// Reference to the raw input document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Location understood by the document processor
    pub uri: String,
    /// Optional media type hint
    #[serde(default)]
    pub media_type: Option<String>,
}

impl DocumentRef {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            media_type: None,
        }
    }

    #[must_use]
    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }
}

/// One dispatched sub-analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    pub correlation_id: CorrelationId,
    pub sub_task_id: SubTaskId,
    pub agent_type: AgentType,
    pub payload: serde_json::Value,
}

impl AgentRequest {
    pub fn new(correlation_id: CorrelationId, agent_type: AgentType, payload: serde_json::Value) -> Self {
        Self {
            correlation_id,
            sub_task_id: SubTaskId::new(),
            agent_type,
            payload,
        }
    }
}

/// Settled outcome of one agent request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub correlation_id: CorrelationId,
    pub sub_task_id: SubTaskId,
    pub agent_type: AgentType,
    pub status: AgentStatus,
    /// Agent output, present only on success
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    /// Failure or timeout description
    #[serde(default)]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl AgentResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == AgentStatus::Success
    }
}

/// Planned test strategy for a categorized document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestStrategy {
    pub category: GampCategory,
    /// Testing approach descriptor
    pub approach: String,
    /// Expected number of test cases
    pub estimated_test_count: u32,
    /// One agent request is dispatched per entry
    pub required_agents: Vec<AgentType>,
    /// Minimum number of successful agent results for aggregation
    pub min_successful_agents: usize,
}

/// Outcome of suite validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Pass,
    Fail,
    NeedsConsultation,
}

/// A single generated test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub objective: String,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    /// Requirement identifiers this test traces to
    #[serde(default)]
    pub requirement_refs: Vec<String>,
}

/// The generated test-suite artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSuite {
    pub suite_id: String,
    pub category: GampCategory,
    pub tests: Vec<TestCase>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn category_two_is_rejected() {
        let err = GampCategory::try_from(2).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidCategory(2)));
    }

    #[test]
    fn category_deserializes_from_number() {
        let cat: GampCategory = serde_json::from_str("4").unwrap();
        assert_eq!(cat, GampCategory::Configured);
        assert!(serde_json::from_str::<GampCategory>("2").is_err());
        assert_eq!(serde_json::to_string(&GampCategory::Custom).unwrap(), "5");
    }

    #[test]
    fn confidence_bounds() {
        assert!(Confidence::new(0.0).is_ok());
        assert!(Confidence::new(1.0).is_ok());
        assert!(Confidence::new(1.01).is_err());
        assert!(Confidence::new(-0.1).is_err());
        assert!(Confidence::new(f64::NAN).is_err());
        assert!(serde_json::from_str::<Confidence>("1.5").is_err());
    }

    #[test]
    fn confidence_threshold_is_inclusive() {
        let c = Confidence::new(0.6).unwrap();
        assert!(c.meets(0.6));
        assert!(!Confidence::new(0.4).unwrap().meets(0.6));
    }

    #[test]
    fn terminal_states() {
        for state in WorkflowState::ALL {
            let expected = matches!(state, WorkflowState::Completed | WorkflowState::Failed);
            assert_eq!(state.is_terminal(), expected, "{state}");
        }
        assert!(WorkflowState::ConsultationPending.is_settled());
    }

    proptest! {
        #[test]
        fn prop_only_gamp_categories_accepted(value in -10i64..20) {
            let parsed = GampCategory::try_from(value);
            if [1, 3, 4, 5].contains(&value) {
                prop_assert_eq!(i64::from(parsed.unwrap()), value);
            } else {
                prop_assert!(parsed.is_err());
            }
        }
    }
}
