//! Workflow engine
//!
//! The exposed surface: start a run, read its status, resume it with a
//! reviewer's decision, and collect its terminal result. Every run is driven
//! by its own task; the engine only keeps a status channel and cancellation
//! token per run.
//!
//! All methods that start background work must be called inside a Tokio
//! runtime.

use crate::collaborators::Collaborators;
use crate::consultation::{ConsultationError, ConsultationGate, Continuation};
use crate::coordinator::AgentCoordinator;
use crate::machine::{RunMachine, Runtime};
use crate::planning::TestPlanner;
use crate::recovery::{self, RecoveryManager, RetryPolicy};
use crate::report::{RunResult, RunStatus};
use dashmap::{DashMap, DashSet};
use gxp_audit::{AuditEmitter, AuditSink};
use gxp_core::{
    ConfigError, ConsultationId, CorrelationId, DocumentRef, UserDecisionEvent, WorkflowConfig,
    WorkflowError, WorkflowState,
};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Rejections from the engine surface
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unknown run {0}")]
    UnknownRun(CorrelationId),

    #[error("run {0} already exists")]
    DuplicateRun(CorrelationId),

    #[error("run {0} was forgotten and cannot be revived")]
    RunRetired(CorrelationId),

    #[error("run {0} has not finished (currently {1})")]
    NotTerminal(CorrelationId, WorkflowState),

    #[error("invalid ingestion payload: {0}")]
    InvalidPayload(String),

    #[error(transparent)]
    Consultation(#[from] ConsultationError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Input that starts a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionPayload {
    pub document: DocumentRef,
    /// Who submitted the document, for the log
    #[serde(default)]
    pub submitted_by: Option<String>,
}

impl IngestionPayload {
    pub fn new(document: DocumentRef) -> Self {
        Self {
            document,
            submitted_by: None,
        }
    }
}

struct RunSlot {
    status: watch::Sender<RunStatus>,
    cancel: CancellationToken,
}

struct EngineInner {
    runtime: Arc<Runtime>,
    runs: DashMap<CorrelationId, RunSlot>,
    results: DashMap<CorrelationId, RunResult>,
    /// Ids of forgotten runs; restoring them is refused
    retired: DashSet<CorrelationId>,
}

/// Orchestrates workflow runs
///
/// Cloning is cheap; clones share runs.
#[derive(Clone)]
pub struct WorkflowEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("runs", &self.inner.runs.len())
            .field("finished", &self.inner.results.len())
            .field("retired", &self.inner.retired.len())
            .finish_non_exhaustive()
    }
}

impl WorkflowEngine {
    /// Build an engine over the given collaborators and audit store
    ///
    /// # Errors
    /// `EngineError::Config` if the configuration does not validate.
    pub fn new(
        config: WorkflowConfig,
        collaborators: Collaborators,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let coordinator = AgentCoordinator::new(
            Arc::clone(&collaborators.agents),
            config.max_in_flight_agents,
            config.agent_timeout(),
        );
        let recovery = RecoveryManager::new(
            RetryPolicy::from_config(&config.retry),
            config.collaborator_timeout(),
        );
        let planner = TestPlanner::new(config.min_agent_success_ratio);
        let gate = ConsultationGate::new(config.consultation_role.clone(), config.consultation_timeout());

        let runtime = Runtime {
            config,
            collaborators,
            audit: AuditEmitter::new(audit),
            coordinator,
            recovery,
            planner,
            gate,
        };
        Ok(Self {
            inner: Arc::new(EngineInner {
                runtime: Arc::new(runtime),
                runs: DashMap::new(),
                results: DashMap::new(),
                retired: DashSet::new(),
            }),
        })
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &WorkflowConfig {
        &self.inner.runtime.config
    }

    /// Begin a run; it proceeds in the background
    ///
    /// # Errors
    /// `EngineError::InvalidPayload` if the document reference is empty.
    pub fn start(&self, payload: IngestionPayload) -> Result<CorrelationId, EngineError> {
        if payload.document.uri.trim().is_empty() {
            return Err(EngineError::InvalidPayload("document uri is empty".into()));
        }
        let correlation_id = CorrelationId::new();
        let cancel = CancellationToken::new();
        let uri = payload.document.uri.clone();
        let machine = RunMachine::start(
            correlation_id,
            payload.document,
            Arc::clone(&self.inner.runtime),
            cancel.clone(),
        )
        .map_err(|e| EngineError::InvalidPayload(e.to_string()))?;

        let (status, _) = watch::channel(machine.status());
        self.inner.runs.insert(correlation_id, RunSlot { status, cancel });
        tracing::info!(
            "Run {} started for {} (submitted by {})",
            correlation_id,
            uri,
            payload.submitted_by.as_deref().unwrap_or("unknown")
        );

        tokio::spawn(drive(Arc::clone(&self.inner), machine));
        Ok(correlation_id)
    }

    /// Current status of a run
    ///
    /// # Errors
    /// `EngineError::UnknownRun`.
    pub fn status(&self, correlation_id: CorrelationId) -> Result<RunStatus, EngineError> {
        self.inner
            .runs
            .get(&correlation_id)
            .map(|slot| slot.status.borrow().clone())
            .ok_or(EngineError::UnknownRun(correlation_id))
    }

    /// Deliver a reviewer's decision to a suspended run
    ///
    /// The decision is checked against the pending consultation and its
    /// schema, and the signer's role is authorized, before anything changes.
    /// Returns the state the decision moved the run to.
    ///
    /// # Errors
    /// `EngineError::UnknownRun` or `EngineError::Consultation`; in both
    /// cases the run is untouched.
    pub async fn resume(
        &self,
        correlation_id: CorrelationId,
        decision: UserDecisionEvent,
    ) -> Result<WorkflowState, EngineError> {
        if decision.correlation_id != correlation_id {
            return Err(ConsultationError::WrongRun {
                expected: correlation_id,
                got: decision.correlation_id,
            }
            .into());
        }
        let cancel = self.inner.cancel_token(correlation_id)?;

        let runtime = &self.inner.runtime;
        runtime.gate.check(&decision)?;
        runtime
            .gate
            .authorize(runtime.collaborators.access.as_ref(), &decision)
            .await?;
        let continuation = runtime.gate.claim(&decision)?;

        let (mut machine, corrupted) =
            RunMachine::from_continuation(&continuation, Arc::clone(runtime), cancel);
        match corrupted {
            Some(error) => {
                machine.fail(error, None).await;
            }
            None => machine.apply_decision(decision, &continuation).await,
        }

        let state = machine.state();
        if state.is_settled() {
            self.inner.settle(machine).await;
        } else {
            self.inner.publish(machine.status());
            tokio::spawn(drive(Arc::clone(&self.inner), machine));
        }
        Ok(state)
    }

    /// Terminal result of a run
    ///
    /// # Errors
    /// `EngineError::NotTerminal` while the run is live,
    /// `EngineError::UnknownRun` for unknown ids.
    pub fn result(&self, correlation_id: CorrelationId) -> Result<RunResult, EngineError> {
        if let Some(result) = self.inner.results.get(&correlation_id) {
            return Ok(result.clone());
        }
        let status = self.status(correlation_id)?;
        Err(EngineError::NotTerminal(correlation_id, status.state))
    }

    /// Cancel a run
    ///
    /// In-flight agent calls are abandoned and the run ends `Failed`, keeping
    /// any agent results already settled. Cancelling a finished run does nothing.
    ///
    /// # Errors
    /// `EngineError::UnknownRun`.
    pub async fn cancel(&self, correlation_id: CorrelationId) -> Result<(), EngineError> {
        let token = self.inner.cancel_token(correlation_id)?;
        token.cancel();
        tracing::info!("Run {} cancellation requested", correlation_id);

        if let Some(continuation) = self.inner.runtime.gate.withdraw(correlation_id) {
            let (mut machine, _) =
                RunMachine::from_continuation(&continuation, Arc::clone(&self.inner.runtime), token);
            machine.fail(WorkflowError::Cancelled, None).await;
            self.inner.settle(machine).await;
        }
        Ok(())
    }

    /// Wait until a run is terminal or awaiting a decision
    ///
    /// # Errors
    /// `EngineError::UnknownRun`.
    pub async fn wait_settled(&self, correlation_id: CorrelationId) -> Result<RunStatus, EngineError> {
        let mut rx = self
            .inner
            .runs
            .get(&correlation_id)
            .map(|slot| slot.status.subscribe())
            .ok_or(EngineError::UnknownRun(correlation_id))?;
        let status = rx
            .wait_for(|s| s.state.is_settled())
            .await
            .map_err(|_| EngineError::UnknownRun(correlation_id))?;
        Ok(status.clone())
    }

    /// Continuations of every run awaiting a decision
    ///
    /// Persist these to resume the runs in another engine with
    /// [`WorkflowEngine::restore`].
    #[must_use]
    pub fn suspended(&self) -> Vec<Continuation> {
        self.inner.runtime.gate.suspended()
    }

    /// Adopt a persisted continuation
    ///
    /// The consultation keeps its original deadline.
    ///
    /// # Errors
    /// `EngineError::DuplicateRun` if this engine already knows the run,
    /// `EngineError::RunRetired` if it was forgotten,
    /// `EngineError::Consultation` if the continuation does not verify.
    pub fn restore(&self, continuation: Continuation) -> Result<CorrelationId, EngineError> {
        let correlation_id = continuation.correlation_id();
        if self.inner.retired.contains(&correlation_id) {
            return Err(EngineError::RunRetired(correlation_id));
        }
        if self.inner.runs.contains_key(&correlation_id) {
            return Err(EngineError::DuplicateRun(correlation_id));
        }
        let cancel = CancellationToken::new();
        let (machine, corrupted) =
            RunMachine::from_continuation(&continuation, Arc::clone(&self.inner.runtime), cancel.clone());
        if corrupted.is_some() {
            return Err(ConsultationError::InvalidContinuation(correlation_id).into());
        }

        let consultation_id = continuation.consultation_id();
        let remaining = continuation.remaining();
        self.inner.runtime.gate.restore(continuation)?;
        let (status, _) = watch::channel(machine.status());
        self.inner.runs.insert(correlation_id, RunSlot { status, cancel });
        self.inner.schedule_expiry(correlation_id, consultation_id, remaining);
        tracing::info!("Run {} restored awaiting consultation {}", correlation_id, consultation_id);
        Ok(correlation_id)
    }

    /// Release everything the engine holds for a finished run
    ///
    /// Returns the run's result. Afterwards the run is unknown to every
    /// query and decision, and its id is retired so a persisted continuation
    /// cannot bring it back.
    ///
    /// # Errors
    /// `EngineError::NotTerminal` while the run is live or suspended,
    /// `EngineError::UnknownRun` for unknown ids.
    pub fn forget(&self, correlation_id: CorrelationId) -> Result<Option<RunResult>, EngineError> {
        let state = self.status(correlation_id)?.state;
        if !state.is_terminal() {
            return Err(EngineError::NotTerminal(correlation_id, state));
        }
        self.inner.retired.insert(correlation_id);
        self.inner.runs.remove(&correlation_id);
        let result = self.inner.results.remove(&correlation_id).map(|(_, result)| result);
        let closed = self.inner.runtime.gate.forget(correlation_id);
        tracing::info!("Run {} forgotten ({} closed consultations released)", correlation_id, closed);
        Ok(result)
    }
}

impl EngineInner {
    fn cancel_token(&self, correlation_id: CorrelationId) -> Result<CancellationToken, EngineError> {
        self.runs
            .get(&correlation_id)
            .map(|slot| slot.cancel.clone())
            .ok_or(EngineError::UnknownRun(correlation_id))
    }

    /// Publish a status, never replacing a newer or terminal one
    fn publish(&self, status: RunStatus) {
        if let Some(slot) = self.runs.get(&status.correlation_id) {
            slot.status.send_if_modified(|current| {
                if current.state.is_terminal() || status.transitions < current.transitions {
                    return false;
                }
                *current = status;
                true
            });
        }
    }

    /// Hand a settled machine over: register its continuation or store its result
    async fn settle(self: &Arc<Self>, mut machine: RunMachine) {
        let correlation_id = machine.correlation_id();
        match machine.state() {
            WorkflowState::ConsultationPending => {
                let status = machine.status();
                let Some(continuation) = machine.take_suspended() else {
                    return;
                };
                let consultation_id = continuation.consultation_id();
                let remaining = continuation.remaining();
                self.runtime.gate.suspend(continuation);

                // A cancel that raced the suspension may have missed the gate
                if machine.is_cancelled() {
                    if self.runtime.gate.withdraw(correlation_id).is_some() {
                        machine.fail(WorkflowError::Cancelled, None).await;
                        self.finish(&machine);
                    }
                    return;
                }
                self.publish(status);
                self.schedule_expiry(correlation_id, consultation_id, remaining);
            }
            WorkflowState::Completed | WorkflowState::Failed => self.finish(&machine),
            _ => self.publish(machine.status()),
        }
    }

    fn finish(&self, machine: &RunMachine) {
        if let Some(result) = machine.result() {
            self.results.insert(machine.correlation_id(), result);
        }
        self.publish(machine.status());
    }

    fn schedule_expiry(self: &Arc<Self>, correlation_id: CorrelationId, consultation_id: ConsultationId, after: Duration) {
        let engine = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(engine) = engine.upgrade() {
                engine.expire(correlation_id, consultation_id).await;
            }
        });
    }

    async fn expire(self: &Arc<Self>, correlation_id: CorrelationId, consultation_id: ConsultationId) {
        let Some(continuation) = self.runtime.gate.expire(correlation_id, consultation_id) else {
            return;
        };
        let error = WorkflowError::ConsultationTimeout {
            consultation_id,
            after_secs: self.runtime.config.consultation_timeout_secs,
        };
        tracing::warn!("Run {}: {}", correlation_id, error);
        let escalation = recovery::escalation(correlation_id, error.to_string());
        let cancel = self.cancel_token(correlation_id).unwrap_or_default();
        let (mut machine, _) = RunMachine::from_continuation(&continuation, Arc::clone(&self.runtime), cancel);
        machine.fail(error, Some(escalation)).await;
        self.settle(machine).await;
    }
}

/// Drive a run until it completes, fails, or suspends
///
/// A panic inside a stage fails the run instead of leaving it live.
async fn drive(engine: Arc<EngineInner>, mut machine: RunMachine) {
    while !machine.state().is_settled() {
        if machine.is_cancelled() {
            machine.fail(WorkflowError::Cancelled, None).await;
            break;
        }
        let step = AssertUnwindSafe(async {
            let outcome = machine.execute_stage().await;
            machine.commit(outcome).await;
        })
        .catch_unwind()
        .await;
        if let Err(panic) = step {
            let error = WorkflowError::Internal(format!("stage panicked: {}", panic_message(&*panic)));
            tracing::error!("Run {} in {}: {}", machine.correlation_id(), machine.state(), error);
            if !machine.state().is_terminal() {
                machine.fail(error, None).await;
            }
            break;
        }
        if !machine.state().is_settled() {
            engine.publish(machine.status());
        }
    }
    engine.settle(machine).await;
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
