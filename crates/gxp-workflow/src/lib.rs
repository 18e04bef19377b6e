//! GxP Workflow Engine
//!
//! Drives a regulated document through categorization, planning, parallel
//! specialist analysis, suite generation and validation. Every transition is
//! written to the audit store before the run moves on. Whenever the engine
//! cannot proceed on its own it suspends the run for an authorized reviewer.
//!
//! # Example
//!
//! ```rust,no_run
//! use gxp_core::WorkflowConfig;
//! use gxp_workflow::test_harness::Harness;
//!
//! # async fn demo() -> Result<(), gxp_workflow::EngineError> {
//! let harness = Harness::new(WorkflowConfig::new())?;
//! let run = harness.start()?;
//! let status = harness.engine.wait_settled(run).await?;
//! println!("{} is {}", run, status.state);
//! # Ok(())
//! # }
//! ```

#![allow(missing_docs)]

pub mod collaborators;
pub mod consultation;
pub mod coordinator;
pub mod engine;
mod machine;
pub mod planning;
pub mod prompts;
pub mod recovery;
pub mod report;
pub mod response;
pub mod state_machine;
pub mod test_harness;
pub mod validation;

pub use collaborators::{
    AccessControl, AgentWorker, Collaborators, CompletionOptions, DocumentProcessor,
    ExtractedDocument, KnowledgeMatch, KnowledgeStore, LanguageModel, Prompt, PromptPurpose,
    SignatureId,
};
pub use consultation::{ConsultationError, ConsultationGate, Continuation, RESUME_ACTION};
pub use coordinator::{AgentCoordinator, AggregationPolicy, AggregationSummary, DispatchOutcome};
pub use engine::{EngineError, IngestionPayload, WorkflowEngine};
pub use planning::TestPlanner;
pub use recovery::{RecoveryManager, RetryPolicy};
pub use report::{CompletedRun, FailureReport, RunResult, RunStatus};
pub use response::parse_json_response;
pub use state_machine::{allowed_transitions, validate_transition};
pub use validation::{review_suite, SuiteReview};
