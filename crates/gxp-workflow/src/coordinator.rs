//! Parallel agent dispatch and result aggregation
//!
//! Requests for one run are scattered onto a `JoinSet` and gathered back as
//! settled [`AgentResult`]s. A semaphore shared by every run bounds the
//! number of agent calls in flight.

use crate::collaborators::AgentWorker;
use crate::recovery::duration_ms;
use gxp_core::{AgentRequest, AgentResult, AgentStatus, AgentType, SubTaskId};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Settled results of one dispatch
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// Exactly one result per request, keyed by sub-task
    pub results: BTreeMap<SubTaskId, AgentResult>,
    /// The dispatch was cut short by run cancellation
    pub cancelled: bool,
}

impl DispatchOutcome {
    #[must_use]
    pub fn into_results(self) -> Vec<AgentResult> {
        self.results.into_values().collect()
    }
}

/// Dispatches agent requests under a shared concurrency bound
#[derive(Clone)]
pub struct AgentCoordinator {
    worker: Arc<dyn AgentWorker>,
    gate: Arc<Semaphore>,
    max_in_flight: usize,
    agent_timeout: Duration,
}

impl std::fmt::Debug for AgentCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentCoordinator")
            .field("max_in_flight", &self.max_in_flight)
            .field("available", &self.gate.available_permits())
            .field("agent_timeout", &self.agent_timeout)
            .finish_non_exhaustive()
    }
}

impl AgentCoordinator {
    /// # Arguments
    /// * `worker` - Executes individual requests
    /// * `max_in_flight` - Agent calls allowed at once across all runs
    /// * `agent_timeout` - Deadline for a single agent call
    #[must_use]
    pub fn new(worker: Arc<dyn AgentWorker>, max_in_flight: usize, agent_timeout: Duration) -> Self {
        let max_in_flight = max_in_flight.max(1);
        Self {
            worker,
            gate: Arc::new(Semaphore::new(max_in_flight)),
            max_in_flight,
            agent_timeout,
        }
    }

    /// Permits not currently held by an agent call
    #[cfg(test)]
    fn available_permits(&self) -> usize {
        self.gate.available_permits()
    }

    /// Run every request and wait for all of them to settle
    ///
    /// Never fails: each request ends as `Success`, `Failure` or `Timeout`.
    /// On cancellation, results already settled are kept and the rest are
    /// reported as failures.
    pub async fn dispatch(&self, requests: Vec<AgentRequest>, cancel: &CancellationToken) -> DispatchOutcome {
        let planned: BTreeMap<SubTaskId, AgentRequest> = requests
            .into_iter()
            .map(|r| (r.sub_task_id, r))
            .collect();
        let mut join_set = JoinSet::new();

        for request in planned.values().cloned() {
            let worker = Arc::clone(&self.worker);
            let gate = Arc::clone(&self.gate);
            let cancel = cancel.clone();
            let timeout = self.agent_timeout;
            join_set.spawn(async move { run_one(worker, gate, cancel, timeout, request).await });
        }

        let mut results = BTreeMap::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => {
                    results.insert(result.sub_task_id, result);
                }
                Err(e) => tracing::error!("Agent task aborted: {}", e),
            }
        }

        for (id, request) in &planned {
            results
                .entry(*id)
                .or_insert_with(|| settled(request, AgentStatus::Failure, None, Some("agent task aborted".into()), 0));
        }

        let cancelled = cancel.is_cancelled();
        DispatchOutcome { results, cancelled }
    }
}

async fn run_one(
    worker: Arc<dyn AgentWorker>,
    gate: Arc<Semaphore>,
    cancel: CancellationToken,
    timeout: Duration,
    request: AgentRequest,
) -> AgentResult {
    let _permit = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            return settled(&request, AgentStatus::Failure, None, Some("cancelled".into()), 0);
        }
        permit = gate.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => {
                return settled(&request, AgentStatus::Failure, None, Some("concurrency gate closed".into()), 0);
            }
        },
    };

    let started = Instant::now();
    let outcome = tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        outcome = tokio::time::timeout(timeout, worker.run(&request)) => Some(outcome),
    };
    let elapsed_ms = duration_ms(started.elapsed());

    match outcome {
        None => settled(&request, AgentStatus::Failure, None, Some("cancelled".into()), elapsed_ms),
        Some(Ok(Ok(output))) => {
            tracing::debug!("Agent {} succeeded in {}ms", request.agent_type, elapsed_ms);
            settled(&request, AgentStatus::Success, Some(output), None, elapsed_ms)
        }
        Some(Ok(Err(e))) => {
            tracing::warn!("Agent {} failed: {}", request.agent_type, e);
            settled(&request, AgentStatus::Failure, None, Some(e.to_string()), elapsed_ms)
        }
        Some(Err(_)) => {
            tracing::warn!("Agent {} timed out after {:?}", request.agent_type, timeout);
            settled(
                &request,
                AgentStatus::Timeout,
                None,
                Some(format!("timed out after {}ms", duration_ms(timeout))),
                elapsed_ms,
            )
        }
    }
}

fn settled(
    request: &AgentRequest,
    status: AgentStatus,
    output: Option<serde_json::Value>,
    error: Option<String>,
    elapsed_ms: u64,
) -> AgentResult {
    AgentResult {
        correlation_id: request.correlation_id,
        sub_task_id: request.sub_task_id,
        agent_type: request.agent_type,
        status,
        output,
        error,
        elapsed_ms,
    }
}

/// Counts of a settled dispatch against the required successes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationSummary {
    /// Agents that returned output
    pub succeeded: usize,
    /// Agents that reported an error
    pub failed: usize,
    /// Agents that missed their deadline
    pub timed_out: usize,
    /// Successes needed to continue unattended
    pub required: usize,
}

impl AggregationSummary {
    #[inline]
    #[must_use]
    pub fn satisfied(&self) -> bool {
        self.succeeded >= self.required
    }
}

/// Minimum-success rule applied after dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationPolicy {
    /// Successful agents required
    pub min_successes: usize,
}

impl AggregationPolicy {
    #[inline]
    #[must_use]
    pub fn new(min_successes: usize) -> Self {
        Self { min_successes }
    }

    #[must_use]
    pub fn evaluate<'a>(&self, results: impl IntoIterator<Item = &'a AgentResult>) -> AggregationSummary {
        let mut summary = AggregationSummary {
            succeeded: 0,
            failed: 0,
            timed_out: 0,
            required: self.min_successes,
        };
        for result in results {
            match result.status {
                AgentStatus::Success => summary.succeeded += 1,
                AgentStatus::Failure => summary.failed += 1,
                AgentStatus::Timeout => summary.timed_out += 1,
            }
        }
        summary
    }
}

/// Successful outputs keyed by the agent that produced them
#[must_use]
pub fn successful_outputs(results: &[AgentResult]) -> Vec<(AgentType, serde_json::Value)> {
    results
        .iter()
        .filter(|r| r.is_success())
        .filter_map(|r| r.output.clone().map(|o| (r.agent_type, o)))
        .collect()
}
