// Test harness module
// Scripted collaborators and the reference consultation scenario

pub mod scripted;

pub use scripted::*;

use crate::collaborators::{Collaborators, PromptPurpose};
use crate::engine::{EngineError, IngestionPayload, WorkflowEngine};
use crate::report::RunResult;
use gxp_audit::{AuditSink, MemoryAuditLog};
use gxp_core::{
    AgentType, Confidence, ConsultationReason, CorrelationId, Decision, DocumentRef, EventKind,
    GampCategory, UserDecisionEvent, WorkflowConfig, WorkflowState,
};
use std::sync::Arc;
use std::time::Duration;

/// Requirements text used by the scripted document processor
pub const SAMPLE_REQUIREMENTS: &str = "URS-001 The LIMS shall record sample receipt with an audit trail.\n\
URS-002 Result approval workflows shall be configurable per site.\n\
URS-003 Electronic signatures shall comply with 21 CFR Part 11.";

/// An engine wired to scripted collaborators and an in-memory audit log
pub struct Harness {
    pub engine: WorkflowEngine,
    pub audit: Arc<MemoryAuditLog>,
    pub documents: Arc<ScriptedDocuments>,
    pub model: Arc<ScriptedModel>,
    pub knowledge: Arc<StaticKnowledge>,
    pub access: Arc<ScriptedAccess>,
    pub agents: Arc<ScriptedAgents>,
}

impl Harness {
    /// Scripted collaborators on the happy path: category 4 at confidence 0.9,
    /// a 15-test suite, every agent succeeding. `qa_1` holds the configured
    /// consultation role.
    ///
    /// # Errors
    /// `EngineError::Config` for an invalid configuration.
    pub fn new(config: WorkflowConfig) -> Result<Self, EngineError> {
        Self::build(
            config,
            ScriptedDocuments::new(SAMPLE_REQUIREMENTS),
            ScriptedModel::happy_path(),
            ScriptedAgents::new(),
            None,
        )
    }

    /// Like [`Harness::new`] with caller-supplied collaborators and audit sink
    ///
    /// The in-memory log stays empty when `audit` is given.
    ///
    /// # Errors
    /// `EngineError::Config` for an invalid configuration.
    pub fn build(
        config: WorkflowConfig,
        documents: ScriptedDocuments,
        model: ScriptedModel,
        agents: ScriptedAgents,
        audit: Option<Arc<dyn AuditSink>>,
    ) -> Result<Self, EngineError> {
        let documents = Arc::new(documents);
        let model = Arc::new(model);
        let agents = Arc::new(agents);
        let knowledge = Arc::new(StaticKnowledge::gamp_guidance());
        let access = Arc::new(ScriptedAccess::new().granting("qa_1", &config.consultation_role));
        let memory = Arc::new(MemoryAuditLog::new());
        let sink: Arc<dyn AuditSink> = audit.unwrap_or_else(|| memory.clone());

        let collaborators = Collaborators {
            documents: documents.clone(),
            model: model.clone(),
            knowledge: knowledge.clone(),
            access: access.clone(),
            agents: agents.clone(),
        };
        let engine = WorkflowEngine::new(config, collaborators, sink)?;
        Ok(Self {
            engine,
            audit: memory,
            documents,
            model,
            knowledge,
            access,
            agents,
        })
    }

    /// Start a run over a fixed document reference
    ///
    /// # Errors
    /// As [`WorkflowEngine::start`].
    pub fn start(&self) -> Result<CorrelationId, EngineError> {
        self.engine.start(IngestionPayload::new(
            DocumentRef::new("urs/lims-urs-001.md").with_media_type("text/markdown"),
        ))
    }
}

/// One audited transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailStep {
    pub from: WorkflowState,
    pub to: WorkflowState,
    pub event: EventKind,
}

/// Outcome of [`run_consultation_scenario`]
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub correlation_id: CorrelationId,
    /// Reason of the consultation the run suspended on
    pub consultation: Option<(ConsultationReason, String)>,
    pub trail: Vec<TrailStep>,
    pub result: Option<RunResult>,
    pub audit_valid: bool,
}

impl ScenarioReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.audit_valid
            && self.result.as_ref().is_some_and(RunResult::is_completed)
            && matches!(self.consultation, Some((ConsultationReason::LowConfidence, _)))
    }

    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut out = format!("Run {}\n", self.correlation_id);
        if let Some((reason, role)) = &self.consultation {
            out.push_str(&format!("Consultation: {reason} (role {role})\n"));
        }
        out.push_str("Transitions:\n");
        for step in &self.trail {
            out.push_str(&format!("  {} -> {} [{}]\n", step.from, step.to, step.event));
        }
        match &self.result {
            Some(RunResult::Completed(run)) => out.push_str(&format!(
                "Completed: suite {} with {} tests (sha256 {})\n",
                run.suite.suite_id,
                run.suite.tests.len(),
                run.suite_digest
            )),
            Some(RunResult::Failed(report)) => out.push_str(&format!(
                "Failed in {}: {}\n",
                report.stage,
                report.error_chain.join(": ")
            )),
            None => out.push_str("No terminal result\n"),
        }
        out.push_str(&format!(
            "Audit chain: {}\n",
            if self.audit_valid { "VALID" } else { "INVALID" }
        ));
        out
    }
}

/// Low-confidence categorization resolved by a reviewer
///
/// The model proposes category 4 at confidence 0.4, `qa_1` confirms category 4
/// at 0.85, three agents are dispatched of which the research agent times out,
/// and the remaining two satisfy aggregation.
///
/// # Errors
/// Any engine rejection along the way.
pub async fn run_consultation_scenario(config: WorkflowConfig) -> Result<ScenarioReport, EngineError> {
    let agent_timeout = config.agent_timeout().min(Duration::from_millis(250));
    let config = config.with_agent_timeout(agent_timeout);
    let model = ScriptedModel::new()
        .with(PromptPurpose::Categorization, Reply::Text(categorization_reply(4, 0.4)))
        .with(PromptPurpose::SuiteGeneration, Reply::Text(suite_reply(15)));
    let agents = ScriptedAgents::new().with(AgentType::Research, AgentBehavior::Hang);
    let harness = Harness::build(
        config,
        ScriptedDocuments::new(SAMPLE_REQUIREMENTS),
        model,
        agents,
        None,
    )?;

    let run = harness.start()?;
    let status = harness.engine.wait_settled(run).await?;
    let consultation = status
        .pending
        .as_ref()
        .map(|p| (p.reason, p.required_role.clone()));

    if let Some(pending) = status.pending {
        let decision = UserDecisionEvent::new(
            run,
            pending.consultation_id,
            Decision::ConfirmCategory {
                category: GampCategory::Configured,
                confidence: Confidence::new(0.85).map_err(|e| EngineError::InvalidPayload(e.to_string()))?,
                rationale: Some("configured LIMS with site workflows".into()),
            },
            "qa_1",
        );
        harness.engine.resume(run, decision).await?;
        harness.engine.wait_settled(run).await?;
    }

    let trail = harness
        .audit
        .records_for(run)
        .iter()
        .map(|r| TrailStep {
            from: r.prior_state,
            to: r.new_state,
            event: r.event_kind,
        })
        .collect();

    Ok(ScenarioReport {
        correlation_id: run,
        consultation,
        trail,
        result: harness.engine.result(run).ok(),
        audit_valid: harness.audit.verify_integrity().is_ok(),
    })
}
