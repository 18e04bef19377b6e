//! GxP Core
//!
//! Shared vocabulary of the workflow engine:
//! - Identifiers for runs, sub-tasks, consultations and transitions
//! - Domain types (GAMP category, confidence, workflow states, test suites)
//! - Immutable cross-stage events
//! - The per-run [`RunContext`] with required-key validation
//! - Configuration and the error taxonomy with its classification
//!
//! # Example
//!
//! ```rust
//! use gxp_core::{ContextKey, CorrelationId, RunContext, WorkflowError};
//!
//! let ctx = RunContext::new(CorrelationId::new());
//! let missing = ctx.require::<String>(ContextKey::DocumentText);
//! assert!(matches!(missing, Err(WorkflowError::MissingContextKey(ContextKey::DocumentText))));
//! ```

pub mod config;
pub mod context;
pub mod decision;
pub mod digest;
pub mod error;
pub mod events;
pub mod ids;
pub mod types;

pub use config::{ConfigError, RetryConfig, WorkflowConfig, MAX_CONSULTATION_TIMEOUT_SECS};
pub use context::{ContextKey, ContextSnapshot, RunContext};
pub use decision::{Decision, DecisionField, DecisionKind, DecisionSchema};
pub use error::{CollaboratorError, ErrorClass, ErrorKind, WorkflowError};
pub use events::{
    AggregationEvent, CategorizationEvent, CompletionEvent, ConsultationReason,
    ConsultationRequiredEvent, DispatchEvent, ErrorRecoveryEvent, EventKind, FailureEvent,
    IngestionEvent, PlanningEvent, SuiteGeneratedEvent, UserDecisionEvent, ValidationEvent,
    WorkflowEvent,
};
pub use ids::{ConsultationId, CorrelationId, RecordId, SubTaskId, TransitionId};
pub use types::{
    AgentRequest, AgentResult, AgentStatus, AgentType, Confidence, DocumentRef, GampCategory,
    TestCase, TestStrategy, TestSuite, ValidationStatus, WorkflowState,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
