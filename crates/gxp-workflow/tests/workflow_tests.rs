//! End-to-end runs through the engine with scripted collaborators

use gxp_core::{
    AgentResult, AgentStatus, AgentType, AggregationEvent, ConsultationReason, ContextKey,
    DecisionKind, GampCategory, RunContext, ValidationEvent, ValidationStatus, WorkflowConfig,
    WorkflowState,
};
use gxp_test_utils::{
    assert_audit_consistent, confirm, fast_config, pending, proceed, retry, settled, trail,
};
use gxp_workflow::test_harness::{
    categorization_reply, run_consultation_scenario, suite_reply, AgentBehavior, Harness, Reply,
};
use gxp_workflow::{PromptPurpose, RunResult};
use pretty_assertions::assert_eq;
use std::time::Duration;
use WorkflowState::{
    AgentsAggregated, AgentsDispatched, Categorized, Completed, ConsultationPending, Ingested,
    Planned, SuiteGenerated, Validated,
};

fn completed(result: RunResult) -> gxp_workflow::CompletedRun {
    match result {
        RunResult::Completed(run) => run,
        RunResult::Failed(report) => panic!("run failed: {:?}", report.error_chain),
    }
}

#[tokio::test]
async fn test_confident_run_completes_without_consultation() {
    let harness = Harness::new(fast_config()).unwrap();
    let run = harness.start().unwrap();

    let status = settled(&harness.engine, run).await;
    assert_eq!(status.state, Completed);
    assert_eq!(status.transitions, 7);
    assert_audit_consistent(&harness.audit, run, 7);
    assert_eq!(
        trail(&harness.audit, run),
        vec![
            (Ingested, Categorized),
            (Categorized, Planned),
            (Planned, AgentsDispatched),
            (AgentsDispatched, AgentsAggregated),
            (AgentsAggregated, SuiteGenerated),
            (SuiteGenerated, Validated),
            (Validated, Completed),
        ]
    );

    let run_result = completed(harness.engine.result(run).unwrap());
    assert_eq!(run_result.suite.category, GampCategory::Configured);
    assert_eq!(run_result.suite.tests.len(), 15);
    assert_eq!(run_result.suite.suite_id, format!("TS-{run}"));
    assert_eq!(run_result.transitions, 7);
    assert!(harness.access.signatures().is_empty());
}

#[tokio::test]
async fn test_low_confidence_consultation_scenario() {
    let harness = Harness::new(fast_config()).unwrap();
    harness.model.replace(
        PromptPurpose::Categorization,
        Reply::Text(categorization_reply(4, 0.4)),
    );
    harness.agents.set(AgentType::Research, AgentBehavior::Hang);

    let run = harness.start().unwrap();
    let status = settled(&harness.engine, run).await;
    let consultation = pending(&status);
    assert_eq!(consultation.reason, ConsultationReason::LowConfidence);
    assert_eq!(consultation.required_role, "validation_engineer");
    assert_eq!(consultation.raised_in, Ingested);
    assert_eq!(
        consultation.schema.accepted,
        vec![DecisionKind::ConfirmCategory, DecisionKind::Abort]
    );
    assert!(consultation.context_snapshot.verify().is_ok());
    assert_audit_consistent(&harness.audit, run, 1);

    let next = harness
        .engine
        .resume(run, confirm(&consultation, GampCategory::Configured, 0.85))
        .await
        .unwrap();
    assert_eq!(next, Categorized);

    let status = settled(&harness.engine, run).await;
    assert_eq!(status.state, Completed);
    assert_eq!(status.transitions, 8);
    assert_audit_consistent(&harness.audit, run, 8);
    assert_eq!(trail(&harness.audit, run)[1], (ConsultationPending, Categorized));

    let run_result = completed(harness.engine.result(run).unwrap());
    assert_eq!(run_result.suite.tests.len(), 15);

    let archive = RunContext::from_snapshot(&run_result.archive).unwrap();
    let results: Vec<AgentResult> = archive.require(ContextKey::AgentResults).unwrap();
    assert_eq!(results.len(), 3);
    let timed_out: Vec<_> = results
        .iter()
        .filter(|r| r.status == AgentStatus::Timeout)
        .map(|r| r.agent_type)
        .collect();
    assert_eq!(timed_out, vec![AgentType::Research]);

    let aggregation: AggregationEvent = archive.require(ContextKey::Aggregation).unwrap();
    assert_eq!((aggregation.succeeded, aggregation.timed_out, aggregation.required), (2, 1, 2));

    let signatures = harness.access.signatures();
    assert_eq!(signatures.len(), 1);
    assert_eq!(signatures[0].signer, "qa_1");
    assert_eq!(signatures[0].meaning, "category confirmation");
    let decision_record = &harness.audit.records_for(run)[1];
    assert_eq!(signatures[0].record, decision_record.record_id);
}

#[tokio::test]
async fn test_reference_scenario_passes() {
    let report = run_consultation_scenario(WorkflowConfig::new()).await.unwrap();
    assert!(report.passed(), "{}", report.generate_text());
    assert_eq!(report.trail.len(), 8);
    assert!(report.generate_text().contains("Audit chain: VALID"));
}

#[tokio::test]
async fn test_category_one_plans_single_agent() {
    let harness = Harness::new(fast_config()).unwrap();
    harness.model.replace(
        PromptPurpose::Categorization,
        Reply::Text(categorization_reply(1, 0.95)),
    );
    harness
        .model
        .replace(PromptPurpose::SuiteGeneration, Reply::Text(suite_reply(3)));

    let run = harness.start().unwrap();
    let status = settled(&harness.engine, run).await;
    assert_eq!(status.state, Completed);
    assert_eq!(harness.agents.calls(), 1);
    let run_result = completed(harness.engine.result(run).unwrap());
    assert_eq!(run_result.suite.category, GampCategory::Infrastructure);
}

#[tokio::test]
async fn test_partial_aggregation_accepted_by_reviewer() {
    let harness = Harness::new(fast_config()).unwrap();
    harness
        .agents
        .set(AgentType::SubjectMatterExpert, AgentBehavior::Fail("model overloaded".into()));
    harness.agents.set(AgentType::Research, AgentBehavior::Hang);

    let run = harness.start().unwrap();
    let status = settled(&harness.engine, run).await;
    let consultation = pending(&status);
    assert_eq!(consultation.reason, ConsultationReason::AggregationIncomplete);
    assert_eq!(consultation.raised_in, AgentsDispatched);
    assert!(consultation.detail.contains("1 succeeded, 2 required"));
    assert!(consultation.schema.accepted.contains(&DecisionKind::Proceed));

    let next = harness.engine.resume(run, proceed(&consultation)).await.unwrap();
    assert_eq!(next, AgentsAggregated);

    let status = settled(&harness.engine, run).await;
    assert_eq!(status.state, Completed);
    assert_audit_consistent(&harness.audit, run, status.transitions);

    let archive = RunContext::from_snapshot(&completed(harness.engine.result(run).unwrap()).archive).unwrap();
    let aggregation: AggregationEvent = archive.require(ContextKey::Aggregation).unwrap();
    assert_eq!(aggregation.accepted_by.as_deref(), Some("qa_1"));
    assert_eq!(harness.access.signatures()[0].meaning, "acceptance");
}

#[tokio::test]
async fn test_retry_redispatches_agents() {
    let harness = Harness::new(fast_config()).unwrap();
    harness
        .agents
        .set(AgentType::SubjectMatterExpert, AgentBehavior::Fail("offline".into()));
    harness
        .agents
        .set(AgentType::Research, AgentBehavior::Fail("offline".into()));

    let run = harness.start().unwrap();
    let consultation = pending(&settled(&harness.engine, run).await);
    assert_eq!(harness.agents.calls(), 3);

    harness.agents.set(AgentType::SubjectMatterExpert, AgentBehavior::Succeed);
    harness.agents.set(AgentType::Research, AgentBehavior::Succeed);
    let next = harness.engine.resume(run, retry(&consultation)).await.unwrap();
    assert_eq!(next, Planned);

    let status = settled(&harness.engine, run).await;
    assert_eq!(status.state, Completed);
    assert_eq!(harness.agents.calls(), 6);
    assert!(trail(&harness.audit, run).contains(&(ConsultationPending, Planned)));
    assert_audit_consistent(&harness.audit, run, status.transitions);
}

#[tokio::test]
async fn test_short_suite_needs_acceptance() {
    let harness = Harness::new(fast_config()).unwrap();
    harness
        .model
        .replace(PromptPurpose::SuiteGeneration, Reply::Text(suite_reply(5)));

    let run = harness.start().unwrap();
    let consultation = pending(&settled(&harness.engine, run).await);
    assert_eq!(consultation.reason, ConsultationReason::ValidationError);
    assert_eq!(consultation.raised_in, SuiteGenerated);
    assert!(consultation.schema.accepted.contains(&DecisionKind::Proceed));

    let next = harness.engine.resume(run, proceed(&consultation)).await.unwrap();
    assert_eq!(next, Validated);

    let status = settled(&harness.engine, run).await;
    assert_eq!(status.state, Completed);
    let run_result = completed(harness.engine.result(run).unwrap());
    assert_eq!(run_result.suite.tests.len(), 5);
    let archive = RunContext::from_snapshot(&run_result.archive).unwrap();
    let validation: ValidationEvent = archive.require(ContextKey::Validation).unwrap();
    assert_eq!(validation.status, ValidationStatus::NeedsConsultation);
    assert_eq!(validation.accepted_by.as_deref(), Some("qa_1"));
}

#[tokio::test]
async fn test_unparseable_suite_retried_after_consultation() {
    let harness = Harness::new(fast_config()).unwrap();
    harness.model.replace(
        PromptPurpose::SuiteGeneration,
        Reply::Text("I could not produce a suite for this document.".into()),
    );

    let run = harness.start().unwrap();
    let consultation = pending(&settled(&harness.engine, run).await);
    assert_eq!(consultation.reason, ConsultationReason::ValidationError);
    assert_eq!(consultation.raised_in, AgentsAggregated);
    assert!(!consultation.schema.accepted.contains(&DecisionKind::Proceed));

    harness
        .model
        .replace(PromptPurpose::SuiteGeneration, Reply::Text(suite_reply(15)));
    let next = harness.engine.resume(run, retry(&consultation)).await.unwrap();
    assert_eq!(next, AgentsAggregated);

    let status = settled(&harness.engine, run).await;
    assert_eq!(status.state, Completed);
    assert_eq!(harness.model.calls(PromptPurpose::SuiteGeneration), 2);
}

#[tokio::test]
async fn test_transient_model_failure_recovers_with_retries() {
    let harness = Harness::new(fast_config()).unwrap();
    harness.model.replace(
        PromptPurpose::Categorization,
        Reply::Fail(gxp_core::CollaboratorError::RateLimited { retry_after_ms: Some(1) }),
    );
    harness.model.push(
        PromptPurpose::Categorization,
        Reply::Text(categorization_reply(4, 0.9)),
    );

    let run = harness.start().unwrap();
    let status = settled(&harness.engine, run).await;
    assert_eq!(status.state, Completed);
    assert_eq!(harness.model.calls(PromptPurpose::Categorization), 2);
    assert_eq!(status.recoveries.len(), 1);
    assert!(!status.recoveries[0].escalated);
}

#[tokio::test]
async fn test_agent_concurrency_is_bounded() {
    let config = fast_config()
        .with_max_in_flight_agents(1)
        .with_agent_timeout(Duration::from_secs(2));
    let harness = Harness::new(config).unwrap();
    harness.model.replace(
        PromptPurpose::Categorization,
        Reply::Text(categorization_reply(5, 0.9)),
    );
    harness
        .model
        .replace(PromptPurpose::SuiteGeneration, Reply::Text(suite_reply(25)));
    for agent in [AgentType::ContextProvider, AgentType::SubjectMatterExpert, AgentType::Research] {
        harness.agents.set(agent, AgentBehavior::Delay(Duration::from_millis(20)));
    }

    let first = harness.start().unwrap();
    let second = harness.start().unwrap();
    assert_eq!(settled(&harness.engine, first).await.state, Completed);
    assert_eq!(settled(&harness.engine, second).await.state, Completed);
    assert_eq!(harness.agents.calls(), 6);
    assert_eq!(harness.agents.peak_in_flight(), 1);
}

#[tokio::test]
async fn test_restore_resumes_in_new_engine() {
    let original = Harness::new(fast_config()).unwrap();
    original.model.replace(
        PromptPurpose::Categorization,
        Reply::Text(categorization_reply(4, 0.3)),
    );
    let run = original.start().unwrap();
    let consultation = pending(&settled(&original.engine, run).await);

    let saved = original.engine.suspended();
    assert_eq!(saved.len(), 1);
    let json = serde_json::to_string(&saved[0]).unwrap();
    let continuation: gxp_workflow::Continuation = serde_json::from_str(&json).unwrap();

    let restored = Harness::new(fast_config()).unwrap();
    assert_eq!(restored.engine.restore(continuation.clone()).unwrap(), run);
    assert!(matches!(
        restored.engine.restore(continuation),
        Err(gxp_workflow::EngineError::DuplicateRun(id)) if id == run
    ));
    let status = restored.engine.status(run).unwrap();
    assert_eq!(status.state, ConsultationPending);
    assert_eq!(status.transitions, 1);

    restored
        .engine
        .resume(run, confirm(&consultation, GampCategory::Configured, 0.9))
        .await
        .unwrap();
    let status = settled(&restored.engine, run).await;
    assert_eq!(status.state, Completed);
    assert_eq!(status.transitions, 8);

    let records = restored.audit.records_for(run);
    assert_eq!(records.first().map(|r| r.sequence), Some(2));
    assert_eq!(records.len(), 7);
    assert!(restored.audit.verify_integrity().is_ok());
}

#[tokio::test]
async fn test_file_audit_log_verifies_after_run() {
    use gxp_audit::{AuditSink, FileAuditSink};
    use gxp_workflow::test_harness::{ScriptedAgents, ScriptedDocuments, ScriptedModel, SAMPLE_REQUIREMENTS};
    use std::sync::Arc;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");
    let sink = Arc::new(FileAuditSink::open(&path).await.unwrap());
    let harness = Harness::build(
        fast_config(),
        ScriptedDocuments::new(SAMPLE_REQUIREMENTS),
        ScriptedModel::happy_path(),
        ScriptedAgents::new(),
        Some(sink as Arc<dyn AuditSink>),
    )
    .unwrap();

    let run = harness.start().unwrap();
    assert_eq!(settled(&harness.engine, run).await.state, Completed);
    assert!(harness.audit.is_empty());

    let report = gxp_audit::verify_file(&path).unwrap();
    assert!(report.valid);
    assert_eq!(report.records_checked, 7);
}
