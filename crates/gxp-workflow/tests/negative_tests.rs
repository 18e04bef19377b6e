//! Failure modes: rejected decisions, fatal errors, cancellation and expiry

use gxp_audit::AuditSink;
use gxp_core::{
    AgentStatus, AgentType, CollaboratorError, ConsultationId, ConsultationReason, ContextKey,
    Decision, ErrorKind, GampCategory, RunContext, UserDecisionEvent, WorkflowEvent, WorkflowState,
};
use gxp_test_utils::{
    abort, assert_audit_consistent, confirm, decide, eventually, fast_config, pending, proceed,
    retry, settled, terminal, trail, REVIEWER,
};
use gxp_workflow::test_harness::{
    categorization_reply, AgentBehavior, FailingAuditSink, Harness, Reply, ScriptedAgents,
    ScriptedDocuments, ScriptedModel, SAMPLE_REQUIREMENTS,
};
use gxp_workflow::{ConsultationError, EngineError, FailureReport, PromptPurpose, RunResult};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn failed(result: RunResult) -> FailureReport {
    match result {
        RunResult::Failed(report) => report,
        RunResult::Completed(run) => panic!("run {} completed unexpectedly", run.correlation_id),
    }
}

fn low_confidence_harness() -> Harness {
    let harness = Harness::new(fast_config()).unwrap();
    harness.model.replace(
        PromptPurpose::Categorization,
        Reply::Text(categorization_reply(4, 0.4)),
    );
    harness
}

#[tokio::test]
async fn test_rejects_category_two() {
    let harness = Harness::new(fast_config()).unwrap();
    harness.model.replace(
        PromptPurpose::Categorization,
        Reply::Text(categorization_reply(2, 0.95)),
    );

    let run = harness.start().unwrap();
    let status = settled(&harness.engine, run).await;
    assert_eq!(status.state, WorkflowState::Failed);
    assert!(status.pending.is_none());
    assert_eq!(trail(&harness.audit, run), vec![(WorkflowState::Ingested, WorkflowState::Failed)]);

    let report = failed(harness.engine.result(run).unwrap());
    assert_eq!(report.stage, WorkflowState::Ingested);
    assert_eq!(report.error_kind, ErrorKind::InvalidCategory);
    assert!(report.audit_complete);
    assert!(report.error_chain[0].contains("invalid GAMP category 2"));
    assert!(report.context_snapshot.is_some());
    assert_eq!(harness.agents.calls(), 0);
}

#[tokio::test]
async fn test_rejects_resume_without_pending_consultation() {
    let harness = Harness::new(fast_config()).unwrap();
    let run = harness.start().unwrap();
    assert_eq!(settled(&harness.engine, run).await.state, WorkflowState::Completed);
    let before = harness.audit.len();

    let stray = UserDecisionEvent::new(run, ConsultationId::new(), Decision::Retry, REVIEWER);
    let result = harness.engine.resume(run, stray).await;
    assert!(matches!(
        result,
        Err(EngineError::Consultation(ConsultationError::NoPending(id))) if id == run
    ));
    assert_eq!(harness.audit.len(), before);
    assert_eq!(harness.engine.status(run).unwrap().state, WorkflowState::Completed);
}

#[tokio::test]
async fn test_rejects_unknown_run() {
    let harness = Harness::new(fast_config()).unwrap();
    let unknown = gxp_core::CorrelationId::new();
    assert!(matches!(harness.engine.status(unknown), Err(EngineError::UnknownRun(_))));
    assert!(matches!(harness.engine.result(unknown), Err(EngineError::UnknownRun(_))));
    let decision = UserDecisionEvent::new(unknown, ConsultationId::new(), Decision::Retry, REVIEWER);
    assert!(matches!(
        harness.engine.resume(unknown, decision).await,
        Err(EngineError::UnknownRun(_))
    ));
}

#[tokio::test]
async fn test_rejects_decision_for_other_run() {
    let harness = low_confidence_harness();
    let run = harness.start().unwrap();
    let consultation = pending(&settled(&harness.engine, run).await);
    let other = gxp_core::CorrelationId::new();

    let decision = confirm(&consultation, GampCategory::Configured, 0.9);
    assert!(matches!(
        harness.engine.resume(other, decision).await,
        Err(EngineError::Consultation(ConsultationError::WrongRun { .. }))
    ));
    assert_eq!(harness.engine.status(run).unwrap().state, WorkflowState::ConsultationPending);
}

#[tokio::test]
async fn test_rejects_duplicate_decision() {
    let harness = low_confidence_harness();
    let run = harness.start().unwrap();
    let consultation = pending(&settled(&harness.engine, run).await);
    let decision = confirm(&consultation, GampCategory::Configured, 0.9);

    harness.engine.resume(run, decision.clone()).await.unwrap();
    let second = harness.engine.resume(run, decision).await;
    assert!(matches!(
        second,
        Err(EngineError::Consultation(ConsultationError::Duplicate(id))) if id == consultation.consultation_id
    ));

    let status = settled(&harness.engine, run).await;
    assert_eq!(status.state, WorkflowState::Completed);
    assert_eq!(harness.access.signatures().len(), 1);
    assert_audit_consistent(&harness.audit, run, status.transitions);
}

#[tokio::test]
async fn test_concurrent_decisions_apply_once() {
    let harness = low_confidence_harness();
    let run = harness.start().unwrap();
    let consultation = pending(&settled(&harness.engine, run).await);
    let decision = confirm(&consultation, GampCategory::Configured, 0.9);

    let (a, b) = tokio::join!(
        harness.engine.resume(run, decision.clone()),
        harness.engine.resume(run, decision)
    );
    assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1, "exactly one decision wins");

    let status = settled(&harness.engine, run).await;
    assert_eq!(status.state, WorkflowState::Completed);
    assert_audit_consistent(&harness.audit, run, 8);
}

#[tokio::test]
async fn test_rejects_unauthorized_signer() {
    let harness = low_confidence_harness();
    let run = harness.start().unwrap();
    let consultation = pending(&settled(&harness.engine, run).await);
    let before = harness.audit.len();

    let intern = decide(
        &consultation,
        Decision::ConfirmCategory {
            category: GampCategory::Configured,
            confidence: gxp_core::Confidence::new(0.9).unwrap(),
            rationale: None,
        },
        "intern",
    );
    let result = harness.engine.resume(run, intern).await;
    assert!(matches!(
        result,
        Err(EngineError::Consultation(ConsultationError::Unauthorized { ref signer, ref role }))
            if signer == "intern" && role == "validation_engineer"
    ));
    assert_eq!(harness.audit.len(), before);
    assert_eq!(harness.engine.status(run).unwrap().state, WorkflowState::ConsultationPending);

    // The consultation is still open for an authorized reviewer
    harness
        .engine
        .resume(run, confirm(&consultation, GampCategory::Configured, 0.9))
        .await
        .unwrap();
    assert_eq!(settled(&harness.engine, run).await.state, WorkflowState::Completed);
}

#[tokio::test]
async fn test_rejects_decision_outside_schema() {
    let harness = low_confidence_harness();
    let run = harness.start().unwrap();
    let consultation = pending(&settled(&harness.engine, run).await);

    let result = harness.engine.resume(run, retry(&consultation)).await;
    assert!(matches!(
        result,
        Err(EngineError::Consultation(ConsultationError::NotAdmitted {
            reason: ConsultationReason::LowConfidence,
            ..
        }))
    ));
    assert_eq!(harness.engine.status(run).unwrap().state, WorkflowState::ConsultationPending);
    assert_eq!(harness.audit.records_for(run).len(), 1);
}

#[tokio::test]
async fn test_rejects_mismatched_consultation_id() {
    let harness = low_confidence_harness();
    let run = harness.start().unwrap();
    let consultation = pending(&settled(&harness.engine, run).await);

    let mut decision = confirm(&consultation, GampCategory::Configured, 0.9);
    decision.consultation_id = ConsultationId::new();
    assert!(matches!(
        harness.engine.resume(run, decision).await,
        Err(EngineError::Consultation(ConsultationError::Mismatch { expected, .. }))
            if expected == consultation.consultation_id
    ));
}

#[tokio::test]
async fn test_abort_fails_run_and_signs() {
    let harness = low_confidence_harness();
    let run = harness.start().unwrap();
    let consultation = pending(&settled(&harness.engine, run).await);

    let state = harness
        .engine
        .resume(run, abort(&consultation, "wrong document submitted"))
        .await
        .unwrap();
    assert_eq!(state, WorkflowState::Failed);

    let report = failed(harness.engine.result(run).unwrap());
    assert_eq!(report.error_kind, ErrorKind::Aborted);
    assert_eq!(report.stage, WorkflowState::ConsultationPending);
    let signatures = harness.access.signatures();
    assert_eq!(signatures.len(), 1);
    assert_eq!(signatures[0].meaning, "abort");
    assert_audit_consistent(&harness.audit, run, 2);
}

#[tokio::test]
async fn test_signature_failure_fails_run() {
    let harness = low_confidence_harness();
    let run = harness.start().unwrap();
    let consultation = pending(&settled(&harness.engine, run).await);
    harness.access.reject_signatures();

    let state = harness
        .engine
        .resume(run, confirm(&consultation, GampCategory::Configured, 0.9))
        .await
        .unwrap();
    assert_eq!(state, WorkflowState::Failed);

    let report = failed(harness.engine.result(run).unwrap());
    assert_eq!(report.error_kind, ErrorKind::SignatureValidationFailure);
    assert_eq!(report.stage, WorkflowState::Categorized);
    assert_eq!(
        trail(&harness.audit, run),
        vec![
            (WorkflowState::Ingested, WorkflowState::ConsultationPending),
            (WorkflowState::ConsultationPending, WorkflowState::Categorized),
            (WorkflowState::Categorized, WorkflowState::Failed),
        ]
    );
}

#[tokio::test]
async fn test_audit_failure_is_fatal() {
    let sink = Arc::new(FailingAuditSink::new(2));
    let harness = Harness::build(
        fast_config(),
        ScriptedDocuments::new(SAMPLE_REQUIREMENTS),
        ScriptedModel::happy_path(),
        ScriptedAgents::new(),
        Some(Arc::clone(&sink) as Arc<dyn AuditSink>),
    )
    .unwrap();

    let run = harness.start().unwrap();
    let status = settled(&harness.engine, run).await;
    assert_eq!(status.state, WorkflowState::Failed);
    assert_eq!(status.transitions, 2);

    let report = failed(harness.engine.result(run).unwrap());
    assert_eq!(report.error_kind, ErrorKind::AuditWriteFailure);
    assert_eq!(report.stage, WorkflowState::Planned);
    assert!(!report.audit_complete);
    assert_eq!(sink.log().len(), 2);
    assert!(sink.log().verify_integrity().is_ok());
}

#[tokio::test]
async fn test_cancellation_keeps_settled_agent_results() {
    let config = fast_config().with_agent_timeout(Duration::from_secs(5));
    let harness = Harness::new(config).unwrap();
    harness.agents.set(AgentType::Research, AgentBehavior::Hang);

    let run = harness.start().unwrap();
    eventually(|| harness.agents.calls() == 3).await;
    // Let the two immediate agents finish before cancelling
    tokio::time::sleep(Duration::from_millis(50)).await;
    harness.engine.cancel(run).await.unwrap();

    let status = settled(&harness.engine, run).await;
    assert_eq!(status.state, WorkflowState::Failed);
    let report = failed(harness.engine.result(run).unwrap());
    assert_eq!(report.error_kind, ErrorKind::Cancelled);
    assert_eq!(report.stage, WorkflowState::Planned);

    let Some(WorkflowEvent::Failure(event)) = &report.last_event else {
        panic!("failure event expected, got {:?}", report.last_event);
    };
    let mut statuses: Vec<_> = event
        .partial_results
        .iter()
        .map(|r| (r.agent_type, r.status))
        .collect();
    statuses.sort_by_key(|(agent, _)| *agent);
    assert_eq!(
        statuses,
        vec![
            (AgentType::ContextProvider, AgentStatus::Success),
            (AgentType::SubjectMatterExpert, AgentStatus::Success),
            (AgentType::Research, AgentStatus::Failure),
        ]
    );
}

#[tokio::test]
async fn test_cancel_suspended_run() {
    let harness = low_confidence_harness();
    let run = harness.start().unwrap();
    let consultation = pending(&settled(&harness.engine, run).await);

    harness.engine.cancel(run).await.unwrap();
    let status = settled(&harness.engine, run).await;
    assert_eq!(status.state, WorkflowState::Failed);
    assert_eq!(
        failed(harness.engine.result(run).unwrap()).error_kind,
        ErrorKind::Cancelled
    );
    assert!(harness.engine.suspended().is_empty());

    let late = harness
        .engine
        .resume(run, confirm(&consultation, GampCategory::Configured, 0.9))
        .await;
    assert!(matches!(late, Err(EngineError::Consultation(ConsultationError::Duplicate(_)))));
}

#[tokio::test]
async fn test_consultation_timeout_escalates() {
    let config = fast_config().with_consultation_timeout(Duration::from_secs(1));
    let harness = Harness::new(config).unwrap();
    harness.model.replace(
        PromptPurpose::Categorization,
        Reply::Text(categorization_reply(4, 0.4)),
    );

    let run = harness.start().unwrap();
    let consultation = pending(&settled(&harness.engine, run).await);
    let status = terminal(&harness.engine, run).await;
    assert_eq!(status.state, WorkflowState::Failed);

    let report = failed(harness.engine.result(run).unwrap());
    assert_eq!(report.error_kind, ErrorKind::ConsultationTimeout);
    let recovery = report.recovery.expect("escalation recorded");
    assert!(recovery.escalated);
    assert_eq!(recovery.error_kind, ErrorKind::ConsultationTimeout);
    assert_audit_consistent(&harness.audit, run, 2);

    let late = harness
        .engine
        .resume(run, confirm(&consultation, GampCategory::Configured, 0.9))
        .await;
    assert!(matches!(late, Err(EngineError::Consultation(ConsultationError::Duplicate(_)))));
}

#[tokio::test]
async fn test_exhausted_retries_escalate_to_consultation() {
    let documents = ScriptedDocuments::new(SAMPLE_REQUIREMENTS)
        .failing_with(CollaboratorError::Unavailable("extractor restarting".into()))
        .failing_with(CollaboratorError::Timeout(500))
        .failing_with(CollaboratorError::Unavailable("extractor restarting".into()));
    let harness = Harness::build(
        fast_config(),
        documents,
        ScriptedModel::happy_path(),
        ScriptedAgents::new(),
        None,
    )
    .unwrap();

    let run = harness.start().unwrap();
    let status = settled(&harness.engine, run).await;
    let consultation = pending(&status);
    assert_eq!(consultation.reason, ConsultationReason::RetriesExhausted);
    assert!(consultation.detail.contains("extract_document still failing after 3 attempts"));
    assert_eq!(harness.documents.calls(), 3);
    assert_eq!(status.recoveries.len(), 2);

    let next = harness.engine.resume(run, retry(&consultation)).await.unwrap();
    assert_eq!(next, WorkflowState::Ingested);
    let status = settled(&harness.engine, run).await;
    assert_eq!(status.state, WorkflowState::Completed);
    assert_eq!(harness.documents.calls(), 4);
    assert_audit_consistent(&harness.audit, run, status.transitions);
}

#[tokio::test]
async fn test_rejects_invalid_configuration() {
    let config = fast_config().with_confidence_threshold(1.5);
    assert!(matches!(Harness::new(config), Err(EngineError::Config(_))));
}

#[tokio::test]
async fn test_rejects_empty_document_reference() {
    let harness = Harness::new(fast_config()).unwrap();
    let payload = gxp_workflow::IngestionPayload::new(gxp_core::DocumentRef::new("  "));
    assert!(matches!(harness.engine.start(payload), Err(EngineError::InvalidPayload(_))));
}

#[tokio::test]
async fn test_rejects_unbounded_consultation_window() {
    let mut config = fast_config();
    config.consultation_timeout_secs = 10_000_000_000_000;
    assert!(matches!(Harness::new(config), Err(EngineError::Config(_))));
}

#[tokio::test]
async fn test_panicking_collaborator_fails_run() {
    let harness = Harness::new(fast_config()).unwrap();
    harness.model.replace(
        PromptPurpose::Categorization,
        Reply::Panic("model client crashed".into()),
    );

    let run = harness.start().unwrap();
    let status = settled(&harness.engine, run).await;
    assert_eq!(status.state, WorkflowState::Failed);
    assert_eq!(trail(&harness.audit, run), vec![(WorkflowState::Ingested, WorkflowState::Failed)]);
    assert_audit_consistent(&harness.audit, run, 1);

    let report = failed(harness.engine.result(run).unwrap());
    assert_eq!(report.error_kind, ErrorKind::Internal);
    assert_eq!(report.stage, WorkflowState::Ingested);
    assert!(report.audit_complete);
    assert!(report.error_chain[0].contains("model client crashed"));

    // The engine keeps serving other runs
    harness.model.replace(
        PromptPurpose::Categorization,
        Reply::Text(categorization_reply(4, 0.9)),
    );
    let next = harness.start().unwrap();
    assert_eq!(settled(&harness.engine, next).await.state, WorkflowState::Completed);
}

#[tokio::test]
async fn test_out_of_range_confidence_goes_to_consultation() {
    let harness = Harness::new(fast_config()).unwrap();
    harness.model.replace(
        PromptPurpose::Categorization,
        Reply::Text(categorization_reply(4, 1.5)),
    );

    let run = harness.start().unwrap();
    let consultation = pending(&settled(&harness.engine, run).await);
    assert_eq!(consultation.reason, ConsultationReason::ValidationError);
    assert_eq!(consultation.raised_in, WorkflowState::Ingested);
    assert!(consultation.detail.contains("confidence 1.5 is outside [0, 1]"));
    assert_audit_consistent(&harness.audit, run, 1);
    assert!(!consultation.context_snapshot.entries.contains_key(&ContextKey::Categorization));

    harness.model.replace(
        PromptPurpose::Categorization,
        Reply::Text(categorization_reply(4, 0.9)),
    );
    let next = harness.engine.resume(run, retry(&consultation)).await.unwrap();
    assert_eq!(next, WorkflowState::Ingested);

    let status = settled(&harness.engine, run).await;
    assert_eq!(status.state, WorkflowState::Completed);
    assert_audit_consistent(&harness.audit, run, 9);
    assert_eq!(
        trail(&harness.audit, run),
        vec![
            (WorkflowState::Ingested, WorkflowState::ConsultationPending),
            (WorkflowState::ConsultationPending, WorkflowState::Ingested),
            (WorkflowState::Ingested, WorkflowState::Categorized),
            (WorkflowState::Categorized, WorkflowState::Planned),
            (WorkflowState::Planned, WorkflowState::AgentsDispatched),
            (WorkflowState::AgentsDispatched, WorkflowState::AgentsAggregated),
            (WorkflowState::AgentsAggregated, WorkflowState::SuiteGenerated),
            (WorkflowState::SuiteGenerated, WorkflowState::Validated),
            (WorkflowState::Validated, WorkflowState::Completed),
        ]
    );
}

#[tokio::test]
async fn test_missing_context_key_goes_to_consultation() {
    let original = Harness::new(fast_config()).unwrap();
    original
        .agents
        .set(AgentType::SubjectMatterExpert, AgentBehavior::Fail("offline".into()));
    original
        .agents
        .set(AgentType::Research, AgentBehavior::Fail("offline".into()));
    let run = original.start().unwrap();
    let consultation = pending(&settled(&original.engine, run).await);
    assert_eq!(consultation.reason, ConsultationReason::AggregationIncomplete);

    // A continuation whose snapshot lost the plan, re-sealed with a valid digest
    let mut saved = original.engine.suspended().remove(0);
    let mut context = RunContext::from_snapshot(&saved.consultation.context_snapshot).unwrap();
    assert!(context.remove(ContextKey::Plan).is_some());
    saved.consultation.context_snapshot = context.snapshot().unwrap();
    let suspended_at = saved.sequence;

    let restored = Harness::new(fast_config()).unwrap();
    restored.engine.restore(saved).unwrap();
    let next = restored.engine.resume(run, retry(&consultation)).await.unwrap();
    assert_eq!(next, WorkflowState::Planned);

    let status = settled(&restored.engine, run).await;
    let second = pending(&status);
    assert_eq!(second.reason, ConsultationReason::ValidationError);
    assert_eq!(second.raised_in, WorkflowState::Planned);
    assert!(second.detail.contains("missing context key `plan`"));
    assert_eq!(status.transitions, suspended_at + 2);
    assert_eq!(restored.agents.calls(), 0);
    assert_eq!(
        trail(&restored.audit, run),
        vec![
            (WorkflowState::ConsultationPending, WorkflowState::Planned),
            (WorkflowState::Planned, WorkflowState::ConsultationPending),
        ]
    );
    let records = restored.audit.records_for(run);
    assert_eq!(records[0].sequence, suspended_at + 1);
    assert!(restored.audit.verify_integrity().is_ok());

    // Proceed is not offered without an acceptance state
    assert!(matches!(
        restored.engine.resume(run, proceed(&second)).await,
        Err(EngineError::Consultation(ConsultationError::NotAdmitted { .. }))
    ));
}

#[tokio::test]
async fn test_forgotten_run_stays_closed() {
    let harness = low_confidence_harness();
    let run = harness.start().unwrap();
    let consultation = pending(&settled(&harness.engine, run).await);
    let saved = harness.engine.suspended().remove(0);
    assert!(matches!(
        harness.engine.forget(run),
        Err(EngineError::NotTerminal(_, WorkflowState::ConsultationPending))
    ));

    let decision = confirm(&consultation, GampCategory::Configured, 0.9);
    harness.engine.resume(run, decision.clone()).await.unwrap();
    assert_eq!(settled(&harness.engine, run).await.state, WorkflowState::Completed);

    let result = harness.engine.forget(run).unwrap();
    assert!(matches!(result, Some(RunResult::Completed(_))));
    assert!(matches!(harness.engine.status(run), Err(EngineError::UnknownRun(_))));
    assert!(matches!(harness.engine.result(run), Err(EngineError::UnknownRun(_))));
    assert!(matches!(harness.engine.forget(run), Err(EngineError::UnknownRun(_))));

    // Neither a replayed decision nor the persisted continuation revives it
    assert!(matches!(
        harness.engine.resume(run, decision).await,
        Err(EngineError::UnknownRun(_))
    ));
    assert!(matches!(
        harness.engine.restore(saved),
        Err(EngineError::RunRetired(id)) if id == run
    ));
    assert_eq!(harness.access.signatures().len(), 1);
    assert_audit_consistent(&harness.audit, run, 8);
}
