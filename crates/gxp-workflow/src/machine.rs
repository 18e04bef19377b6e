//! Per-run state machine
//!
//! One [`RunMachine`] exists per live run and is the only writer of that run's
//! context. A stage never changes state itself: it returns a [`StageOutcome`]
//! and [`RunMachine::commit`] validates the transition, writes the audit
//! record, and only then moves the state pointer.

use crate::collaborators::{Collaborators, CompletionOptions};
use crate::consultation::{ConsultationGate, ConsultationRequest, Continuation};
use crate::coordinator::{successful_outputs, AgentCoordinator, AggregationPolicy};
use crate::planning::TestPlanner;
use crate::prompts::{self, CategorizationResponse, SuiteResponse};
use crate::recovery::RecoveryManager;
use crate::report::{CompletedRun, FailureReport, RunResult, RunStatus};
use crate::response::parse_json_response;
use crate::state_machine::validate_transition;
use crate::validation::review_suite;
use chrono::Utc;
use gxp_audit::AuditEmitter;
use gxp_core::digest::json_digest;
use gxp_core::{
    AgentRequest, AgentResult, AgentStatus, AggregationEvent, CategorizationEvent,
    CompletionEvent, Confidence, ConsultationReason, ContextKey, CorrelationId, Decision,
    DispatchEvent, DocumentRef, ErrorClass, ErrorRecoveryEvent, FailureEvent, GampCategory,
    IngestionEvent, PlanningEvent, RecordId, RunContext, SuiteGeneratedEvent, TestSuite,
    UserDecisionEvent, ValidationEvent, ValidationStatus, WorkflowConfig, WorkflowError,
    WorkflowEvent, WorkflowState,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Services shared by every run of one engine
#[derive(Debug)]
pub(crate) struct Runtime {
    pub(crate) config: WorkflowConfig,
    pub(crate) collaborators: Collaborators,
    pub(crate) audit: AuditEmitter,
    pub(crate) coordinator: AgentCoordinator,
    pub(crate) recovery: RecoveryManager,
    pub(crate) planner: TestPlanner,
    pub(crate) gate: ConsultationGate,
}

/// A stage's request for human review
#[derive(Debug, Clone)]
pub(crate) struct Consult {
    pub(crate) reason: ConsultationReason,
    pub(crate) detail: String,
    pub(crate) resume_from: WorkflowState,
    pub(crate) proceed_to: Option<WorkflowState>,
}

/// What a stage decided
#[derive(Debug)]
pub(crate) enum StageOutcome {
    Advance { to: WorkflowState, event: WorkflowEvent },
    Consult(Consult),
    Fail(WorkflowError),
}

pub(crate) struct RunMachine {
    correlation_id: CorrelationId,
    state: WorkflowState,
    context: RunContext,
    sequence: u64,
    last_event: Option<WorkflowEvent>,
    recoveries: Vec<ErrorRecoveryEvent>,
    suspended: Option<Continuation>,
    failure: Option<FailureReport>,
    runtime: Arc<Runtime>,
    cancel: CancellationToken,
}

impl RunMachine {
    /// A fresh run in `Ingested`
    pub(crate) fn start(
        correlation_id: CorrelationId,
        document: DocumentRef,
        runtime: Arc<Runtime>,
        cancel: CancellationToken,
    ) -> Result<Self, WorkflowError> {
        let mut context = RunContext::new(correlation_id);
        context.insert(ContextKey::Document, &document)?;
        let event = WorkflowEvent::Ingestion(IngestionEvent {
            correlation_id,
            document,
            received_at: Utc::now(),
        });
        Ok(Self {
            correlation_id,
            state: WorkflowState::Ingested,
            context,
            sequence: 0,
            last_event: Some(event),
            recoveries: Vec::new(),
            suspended: None,
            failure: None,
            runtime,
            cancel,
        })
    }

    /// Rehydrate a suspended run
    ///
    /// A snapshot that fails verification yields a machine with an empty
    /// context and the corruption error, which the caller must fail the run with.
    pub(crate) fn from_continuation(
        continuation: &Continuation,
        runtime: Arc<Runtime>,
        cancel: CancellationToken,
    ) -> (Self, Option<WorkflowError>) {
        let correlation_id = continuation.correlation_id();
        let (context, corrupted) = match RunContext::from_snapshot(&continuation.consultation.context_snapshot) {
            Ok(context) if context.correlation_id() == correlation_id => (context, None),
            Ok(_) => (
                RunContext::new(correlation_id),
                Some(WorkflowError::CorruptedContext(format!(
                    "snapshot does not belong to run {correlation_id}"
                ))),
            ),
            Err(e) => (RunContext::new(correlation_id), Some(e)),
        };
        let machine = Self {
            correlation_id,
            state: WorkflowState::ConsultationPending,
            context,
            sequence: continuation.sequence,
            last_event: Some(WorkflowEvent::ConsultationRequired(continuation.consultation.clone())),
            recoveries: continuation.recoveries.clone(),
            suspended: Some(continuation.clone()),
            failure: None,
            runtime,
            cancel,
        };
        (machine, corrupted)
    }

    #[inline]
    pub(crate) fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    #[inline]
    pub(crate) fn state(&self) -> WorkflowState {
        self.state
    }

    #[inline]
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn status(&self) -> RunStatus {
        let pending = if self.state == WorkflowState::ConsultationPending {
            self.suspended.as_ref().map(|c| c.consultation.clone())
        } else {
            None
        };
        RunStatus {
            correlation_id: self.correlation_id,
            state: self.state,
            last_event: self.last_event.clone(),
            pending,
            transitions: self.sequence,
            recoveries: self.recoveries.clone(),
        }
    }

    /// The continuation produced by the last suspension
    pub(crate) fn take_suspended(&mut self) -> Option<Continuation> {
        self.suspended.take()
    }

    /// Terminal outcome, once the run is `Completed` or `Failed`
    pub(crate) fn result(&self) -> Option<RunResult> {
        match self.state {
            WorkflowState::Completed => {
                let suite: TestSuite = self.context.require(ContextKey::TestSuite).ok()?;
                let suite_digest = json_digest(&suite).ok()?;
                let archive = self.context.snapshot().ok()?;
                Some(RunResult::Completed(CompletedRun {
                    correlation_id: self.correlation_id,
                    suite,
                    suite_digest,
                    transitions: self.sequence,
                    archive,
                }))
            }
            WorkflowState::Failed => self.failure.clone().map(RunResult::Failed),
            _ => None,
        }
    }

    /// Run the stage owned by the current state
    pub(crate) async fn execute_stage(&mut self) -> StageOutcome {
        let state = self.state;
        let result = match state {
            WorkflowState::Ingested => self.categorize().await,
            WorkflowState::Categorized => self.plan().await,
            WorkflowState::Planned => self.dispatch().await,
            WorkflowState::AgentsDispatched => self.aggregate(),
            WorkflowState::AgentsAggregated => self.generate_suite().await,
            WorkflowState::SuiteGenerated => self.validate_suite(),
            WorkflowState::Validated => self.complete(),
            WorkflowState::ConsultationPending | WorkflowState::Completed | WorkflowState::Failed => {
                Err(WorkflowError::IllegalTransition { from: state, to: state })
            }
        };
        match result {
            Ok(outcome) => outcome,
            Err(error) => self.escalate(error),
        }
    }

    /// Route an error by its class
    fn escalate(&self, error: WorkflowError) -> StageOutcome {
        let reason = match error.class() {
            ErrorClass::Fatal => return StageOutcome::Fail(error),
            ErrorClass::Transient => ConsultationReason::RetriesExhausted,
            ErrorClass::Validation => {
                if matches!(error, WorkflowError::RetriesExhausted { .. }) {
                    ConsultationReason::RetriesExhausted
                } else {
                    ConsultationReason::ValidationError
                }
            }
        };
        StageOutcome::Consult(Consult {
            reason,
            detail: error.chain().join(": "),
            resume_from: self.state,
            proceed_to: None,
        })
    }

    /// Apply a stage outcome
    pub(crate) async fn commit(&mut self, outcome: StageOutcome) {
        match outcome {
            StageOutcome::Advance { to, event } => {
                if let Err(error) = self.transition(to, event).await {
                    self.fail(error, None).await;
                }
            }
            StageOutcome::Consult(consult) => self.suspend(consult).await,
            StageOutcome::Fail(error) => {
                self.fail(error, None).await;
            }
        }
    }

    async fn transition(&mut self, to: WorkflowState, event: WorkflowEvent) -> Result<RecordId, WorkflowError> {
        validate_transition(self.state, to)?;
        let sequence = self.sequence + 1;
        let record = self
            .runtime
            .audit
            .record_transition(self.correlation_id, sequence, self.state, to, &event)
            .await?;
        tracing::info!(
            "Run {} {} -> {} ({})",
            self.correlation_id,
            self.state,
            to,
            event.kind()
        );
        self.sequence = sequence;
        self.state = to;
        self.last_event = Some(event);
        Ok(record)
    }

    async fn suspend(&mut self, consult: Consult) {
        let snapshot = match self.context.snapshot() {
            Ok(snapshot) => snapshot,
            Err(error) => {
                self.fail(error, None).await;
                return;
            }
        };
        let prepared = self.runtime.gate.prepare(ConsultationRequest {
            correlation_id: self.correlation_id,
            reason: consult.reason,
            detail: consult.detail,
            raised_in: self.state,
            snapshot,
            resume_from: consult.resume_from,
            proceed_to: consult.proceed_to,
            sequence: self.sequence + 1,
            recoveries: self.recoveries.clone(),
        });
        let continuation = match prepared {
            Ok(continuation) => continuation,
            Err(error) => {
                self.fail(error, None).await;
                return;
            }
        };
        let event = WorkflowEvent::ConsultationRequired(continuation.consultation.clone());
        match self.transition(WorkflowState::ConsultationPending, event).await {
            Ok(_) => self.suspended = Some(continuation),
            Err(error) => {
                self.fail(error, None).await;
            }
        }
    }

    /// Move the run to `Failed`, keeping everything known for the report
    ///
    /// If the failure itself cannot be audited the run is still marked
    /// `Failed` and the report says so.
    pub(crate) async fn fail(
        &mut self,
        error: WorkflowError,
        recovery: Option<ErrorRecoveryEvent>,
    ) -> Option<RecordId> {
        let stage = self.state;
        let partial_results: Vec<AgentResult> = self
            .context
            .require(ContextKey::AgentResults)
            .unwrap_or_default();
        let event = WorkflowEvent::Failure(FailureEvent {
            correlation_id: self.correlation_id,
            stage,
            error_kind: error.kind(),
            error_chain: error.chain(),
            recovery: recovery.clone(),
            partial_results,
        });
        tracing::error!("Run {} failed in {}: {}", self.correlation_id, stage, error);

        let context_snapshot = self.context.snapshot().ok();
        let (record, audit_complete) = match self.transition(WorkflowState::Failed, event.clone()).await {
            Ok(record) => (Some(record), true),
            Err(audit_error) => {
                tracing::error!(
                    "Run {} failure could not be recorded: {}",
                    self.correlation_id,
                    audit_error
                );
                self.state = WorkflowState::Failed;
                self.last_event = Some(event);
                (None, false)
            }
        };

        self.suspended = None;
        self.failure = Some(FailureReport {
            correlation_id: self.correlation_id,
            stage,
            error_kind: error.kind(),
            error_chain: error.chain(),
            context_snapshot,
            last_event: self.last_event.clone(),
            recovery,
            recoveries: self.recoveries.clone(),
            audit_complete,
        });
        record
    }

    /// Apply an authorized decision to a run rehydrated from `continuation`
    pub(crate) async fn apply_decision(&mut self, decision: UserDecisionEvent, continuation: &Continuation) {
        let signer = decision.signer.clone();
        let (target, meaning) = match &decision.decision {
            Decision::Abort { reason } => {
                let error = WorkflowError::Aborted {
                    signer: signer.clone(),
                    reason: reason.clone(),
                };
                if let Some(record) = self.fail(error, None).await {
                    self.sign(record, &signer, "abort").await;
                }
                return;
            }
            Decision::ConfirmCategory {
                category,
                confidence,
                rationale,
            } => {
                if let Err(error) = self.confirm_category(*category, *confidence, rationale.clone(), &signer) {
                    self.fail(error, None).await;
                    return;
                }
                (WorkflowState::Categorized, "category confirmation")
            }
            Decision::Proceed { .. } => {
                let Some(target) = continuation.proceed_to else {
                    self.fail(
                        WorkflowError::ValidationFailed("consultation offers no acceptance state".into()),
                        None,
                    )
                    .await;
                    return;
                };
                if let Err(error) = self.accept(target, &signer) {
                    self.fail(error, None).await;
                    return;
                }
                (target, "acceptance")
            }
            Decision::Retry => (continuation.resume_from, "retry authorization"),
        };

        tracing::info!(
            "Run {} resumed by `{}` with {}",
            self.correlation_id,
            signer,
            decision.decision.kind()
        );
        match self.transition(target, WorkflowEvent::Decision(decision)).await {
            Ok(record) => self.sign(record, &signer, meaning).await,
            Err(error) => {
                self.fail(error, None).await;
            }
        }
    }

    async fn sign(&mut self, record: RecordId, signer: &str, meaning: &str) {
        match self
            .runtime
            .collaborators
            .access
            .bind_signature(record, signer, meaning)
            .await
        {
            Ok(signature) => {
                tracing::info!("Signature {} of `{}` bound to record {}", signature, signer, record);
            }
            Err(e) => {
                let error = WorkflowError::SignatureValidationFailure {
                    signer: signer.to_string(),
                    reason: e.to_string(),
                };
                if self.state == WorkflowState::Failed {
                    tracing::error!("Run {}: {}", self.correlation_id, error);
                } else {
                    self.fail(error, None).await;
                }
            }
        }
    }

    fn confirm_category(
        &mut self,
        category: GampCategory,
        confidence: Confidence,
        rationale: Option<String>,
        signer: &str,
    ) -> Result<(), WorkflowError> {
        let event = CategorizationEvent {
            correlation_id: self.correlation_id,
            category,
            confidence,
            rationale: rationale.unwrap_or_else(|| format!("confirmed by {signer}")),
            confirmed_by: Some(signer.to_string()),
        };
        self.context.insert(ContextKey::Categorization, &event)
    }

    fn accept(&mut self, target: WorkflowState, signer: &str) -> Result<(), WorkflowError> {
        match target {
            WorkflowState::AgentsAggregated => {
                let mut aggregation: AggregationEvent = self.context.require(ContextKey::Aggregation)?;
                aggregation.accepted_by = Some(signer.to_string());
                self.context.insert(ContextKey::Aggregation, &aggregation)
            }
            WorkflowState::Validated => {
                let mut validation: ValidationEvent = self.context.require(ContextKey::Validation)?;
                validation.accepted_by = Some(signer.to_string());
                self.context.insert(ContextKey::Validation, &validation)
            }
            other => Err(WorkflowError::IllegalTransition {
                from: WorkflowState::ConsultationPending,
                to: other,
            }),
        }
    }

    // Stages

    async fn categorize(&mut self) -> Result<StageOutcome, WorkflowError> {
        let runtime = Arc::clone(&self.runtime);
        let document: DocumentRef = self.context.require(ContextKey::Document)?;

        let extracted = runtime
            .recovery
            .call(self.correlation_id, "extract_document", &self.cancel, &mut self.recoveries, || {
                runtime.collaborators.documents.extract(&document)
            })
            .await?;
        if extracted.text.trim().is_empty() {
            return Err(WorkflowError::ValidationFailed(format!(
                "document {} has no extractable text",
                document.uri
            )));
        }
        self.context.insert(ContextKey::DocumentText, &extracted.text)?;
        self.context.insert(ContextKey::DocumentMetadata, &extracted.metadata)?;

        let prompt = prompts::categorization(&extracted.text);
        let options = CompletionOptions::deterministic(1_024);
        let raw = runtime
            .recovery
            .call(self.correlation_id, "categorize", &self.cancel, &mut self.recoveries, || {
                runtime.collaborators.model.complete(&prompt, &options)
            })
            .await?;
        let parsed: CategorizationResponse =
            parse_json_response(&raw).map_err(|e| WorkflowError::collaborator("categorize", e))?;

        let category = GampCategory::try_from(parsed.category)?;
        let confidence = Confidence::new(parsed.confidence)?;
        let event = CategorizationEvent {
            correlation_id: self.correlation_id,
            category,
            confidence,
            rationale: parsed.rationale,
            confirmed_by: None,
        };
        self.context.insert(ContextKey::Categorization, &event)?;

        let threshold = runtime.config.confidence_threshold;
        if !confidence.meets(threshold) {
            let low = WorkflowError::LowConfidence {
                confidence: confidence.value(),
                threshold,
            };
            return Ok(StageOutcome::Consult(Consult {
                reason: ConsultationReason::LowConfidence,
                detail: format!("proposed category {category}: {low}"),
                resume_from: WorkflowState::Ingested,
                proceed_to: None,
            }));
        }

        Ok(StageOutcome::Advance {
            to: WorkflowState::Categorized,
            event: WorkflowEvent::Categorization(event),
        })
    }

    async fn plan(&mut self) -> Result<StageOutcome, WorkflowError> {
        let runtime = Arc::clone(&self.runtime);
        let categorization: CategorizationEvent = self.context.require(ContextKey::Categorization)?;
        let text: String = self.context.require(ContextKey::DocumentText)?;

        let strategy = runtime.planner.plan(categorization.category);
        let limit = runtime.config.knowledge_matches;
        let matches = if limit == 0 {
            Vec::new()
        } else {
            runtime
                .recovery
                .call(self.correlation_id, "query_knowledge", &self.cancel, &mut self.recoveries, || {
                    runtime.collaborators.knowledge.query(prompts::excerpt(&text), limit)
                })
                .await?
        };

        let event = PlanningEvent {
            correlation_id: self.correlation_id,
            strategy,
            knowledge_refs: matches.into_iter().map(|m| m.reference).collect(),
        };
        self.context.insert(ContextKey::Plan, &event)?;
        Ok(StageOutcome::Advance {
            to: WorkflowState::Planned,
            event: WorkflowEvent::Planning(event),
        })
    }

    async fn dispatch(&mut self) -> Result<StageOutcome, WorkflowError> {
        let categorization: CategorizationEvent = self.context.require(ContextKey::Categorization)?;
        let plan: PlanningEvent = self.context.require(ContextKey::Plan)?;
        let text: String = self.context.require(ContextKey::DocumentText)?;

        let requests: Vec<AgentRequest> = plan
            .strategy
            .required_agents
            .iter()
            .map(|agent| {
                AgentRequest::new(
                    self.correlation_id,
                    *agent,
                    serde_json::json!({
                        "category": categorization.category,
                        "approach": plan.strategy.approach,
                        "knowledge_refs": plan.knowledge_refs,
                        "document": prompts::excerpt(&text),
                    }),
                )
            })
            .collect();

        let outcome = self.runtime.coordinator.dispatch(requests, &self.cancel).await;
        let cancelled = outcome.cancelled;
        let results = outcome.into_results();
        self.context.insert(ContextKey::AgentResults, &results)?;
        if cancelled {
            return Err(WorkflowError::Cancelled);
        }

        Ok(StageOutcome::Advance {
            to: WorkflowState::AgentsDispatched,
            event: WorkflowEvent::Dispatch(DispatchEvent {
                correlation_id: self.correlation_id,
                results,
            }),
        })
    }

    fn aggregate(&mut self) -> Result<StageOutcome, WorkflowError> {
        let plan: PlanningEvent = self.context.require(ContextKey::Plan)?;
        let results: Vec<AgentResult> = self.context.require(ContextKey::AgentResults)?;

        let summary = AggregationPolicy::new(plan.strategy.min_successful_agents).evaluate(&results);
        let event = AggregationEvent {
            correlation_id: self.correlation_id,
            succeeded: summary.succeeded,
            failed: summary.failed,
            timed_out: summary.timed_out,
            required: summary.required,
            accepted_by: None,
        };
        self.context.insert(ContextKey::Aggregation, &event)?;

        if !summary.satisfied() {
            let agent_timeout = self.runtime.config.agent_timeout_ms;
            let mut detail = vec![WorkflowError::AggregationIncomplete {
                succeeded: summary.succeeded,
                required: summary.required,
            }
            .to_string()];
            detail.extend(results.iter().filter_map(|r| match r.status {
                AgentStatus::Success => None,
                AgentStatus::Timeout => Some(
                    WorkflowError::AgentTimeout {
                        agent: r.agent_type,
                        after_ms: agent_timeout,
                    }
                    .to_string(),
                ),
                AgentStatus::Failure => Some(
                    WorkflowError::AgentFailure {
                        agent: r.agent_type,
                        reason: r.error.clone().unwrap_or_default(),
                    }
                    .to_string(),
                ),
            }));
            return Ok(StageOutcome::Consult(Consult {
                reason: ConsultationReason::AggregationIncomplete,
                detail: detail.join("; "),
                resume_from: WorkflowState::Planned,
                proceed_to: Some(WorkflowState::AgentsAggregated),
            }));
        }

        Ok(StageOutcome::Advance {
            to: WorkflowState::AgentsAggregated,
            event: WorkflowEvent::Aggregation(event),
        })
    }

    async fn generate_suite(&mut self) -> Result<StageOutcome, WorkflowError> {
        let runtime = Arc::clone(&self.runtime);
        let categorization: CategorizationEvent = self.context.require(ContextKey::Categorization)?;
        let plan: PlanningEvent = self.context.require(ContextKey::Plan)?;
        let results: Vec<AgentResult> = self.context.require(ContextKey::AgentResults)?;
        let text: String = self.context.require(ContextKey::DocumentText)?;

        let findings = successful_outputs(&results);
        let prompt = prompts::suite_generation(&categorization, &plan.strategy, &text, &findings);
        let options = CompletionOptions::deterministic(8_192);
        let raw = runtime
            .recovery
            .call(self.correlation_id, "generate_suite", &self.cancel, &mut self.recoveries, || {
                runtime.collaborators.model.complete(&prompt, &options)
            })
            .await?;
        let response: SuiteResponse =
            parse_json_response(&raw).map_err(|e| WorkflowError::collaborator("generate_suite", e))?;

        let suite = TestSuite {
            suite_id: format!("TS-{}", self.correlation_id),
            category: categorization.category,
            tests: response.tests,
        };
        let suite_digest = json_digest(&suite).map_err(|e| WorkflowError::CorruptedContext(e.to_string()))?;
        self.context.insert(ContextKey::TestSuite, &suite)?;
        self.context.remove(ContextKey::Validation);

        Ok(StageOutcome::Advance {
            to: WorkflowState::SuiteGenerated,
            event: WorkflowEvent::SuiteGenerated(SuiteGeneratedEvent {
                correlation_id: self.correlation_id,
                suite_id: suite.suite_id,
                test_count: suite.tests.len(),
                suite_digest,
            }),
        })
    }

    fn validate_suite(&mut self) -> Result<StageOutcome, WorkflowError> {
        let suite: TestSuite = self.context.require(ContextKey::TestSuite)?;
        let plan: PlanningEvent = self.context.require(ContextKey::Plan)?;

        let review = review_suite(&suite, &plan.strategy);
        let event = ValidationEvent {
            correlation_id: self.correlation_id,
            status: review.status,
            findings: review.findings,
            accepted_by: None,
        };
        self.context.insert(ContextKey::Validation, &event)?;

        let proceed_to = match review.status {
            ValidationStatus::Pass => {
                return Ok(StageOutcome::Advance {
                    to: WorkflowState::Validated,
                    event: WorkflowEvent::Validation(event),
                });
            }
            ValidationStatus::NeedsConsultation => Some(WorkflowState::Validated),
            ValidationStatus::Fail => None,
        };
        Ok(StageOutcome::Consult(Consult {
            reason: ConsultationReason::ValidationError,
            detail: event.findings.join("; "),
            resume_from: WorkflowState::AgentsAggregated,
            proceed_to,
        }))
    }

    fn complete(&mut self) -> Result<StageOutcome, WorkflowError> {
        let suite: TestSuite = self.context.require(ContextKey::TestSuite)?;
        let validation: ValidationEvent = self.context.require(ContextKey::Validation)?;
        if validation.status != ValidationStatus::Pass && validation.accepted_by.is_none() {
            return Err(WorkflowError::ValidationFailed(format!(
                "suite {} was neither validated nor accepted",
                suite.suite_id
            )));
        }
        let suite_digest = json_digest(&suite).map_err(|e| WorkflowError::CorruptedContext(e.to_string()))?;
        Ok(StageOutcome::Advance {
            to: WorkflowState::Completed,
            event: WorkflowEvent::Completion(CompletionEvent {
                correlation_id: self.correlation_id,
                suite_id: suite.suite_id,
                suite_digest,
            }),
        })
    }
}
