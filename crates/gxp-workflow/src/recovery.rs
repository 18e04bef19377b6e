//! Retry with exponential backoff for collaborator calls
//!
//! Only transient collaborator failures are retried. Each retry is recorded as
//! an [`ErrorRecoveryEvent`]; when the budget runs out the caller gets
//! `WorkflowError::RetriesExhausted`, which routes the run to consultation.

use gxp_core::{
    CollaboratorError, CorrelationId, ErrorKind, ErrorRecoveryEvent, RetryConfig, WorkflowError,
};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Backoff schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Delay before retry number `retry` (1-based)
    ///
    /// A rate-limit hint from the collaborator raises the delay but never past
    /// `max_delay`.
    #[must_use]
    pub fn delay_for(&self, retry: u32, error: &CollaboratorError) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(retry - 1);
        let backoff = self.base_delay.saturating_mul(factor).min(self.max_delay);
        match error {
            CollaboratorError::RateLimited {
                retry_after_ms: Some(hint),
            } => backoff.max(Duration::from_millis(*hint)).min(self.max_delay),
            _ => backoff,
        }
    }
}

/// Runs collaborator calls under a timeout and retry budget
#[derive(Debug, Clone)]
pub struct RecoveryManager {
    policy: RetryPolicy,
    call_timeout: Duration,
}

impl RecoveryManager {
    #[must_use]
    pub fn new(policy: RetryPolicy, call_timeout: Duration) -> Self {
        Self {
            policy,
            call_timeout,
        }
    }

    #[inline]
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Call `operation` until it succeeds, fails permanently, or retries run out
    ///
    /// # Arguments
    /// * `label` - Operation name used in errors, events and logs
    /// * `operation` - Produces a fresh future per attempt
    /// * `recoveries` - Receives one event per retry taken
    ///
    /// # Errors
    /// * `WorkflowError::Collaborator` for a non-transient failure
    /// * `WorkflowError::RetriesExhausted` when every attempt failed transiently
    /// * `WorkflowError::Cancelled` if `cancel` fires first
    pub async fn call<T, F, Fut>(
        &self,
        correlation_id: CorrelationId,
        label: &str,
        cancel: &CancellationToken,
        recoveries: &mut Vec<ErrorRecoveryEvent>,
        mut operation: F,
    ) -> Result<T, WorkflowError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CollaboratorError>>,
    {
        let mut retries = 0u32;
        loop {
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(WorkflowError::Cancelled),
                outcome = tokio::time::timeout(self.call_timeout, operation()) => outcome,
            };

            let error = match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e,
                Err(_) => CollaboratorError::Timeout(duration_ms(self.call_timeout)),
            };

            if !error.is_transient() {
                tracing::warn!("{} failed for run {}: {}", label, correlation_id, error);
                return Err(WorkflowError::collaborator(label, error));
            }

            if retries >= self.policy.max_retries {
                tracing::warn!(
                    "{} exhausted {} retries for run {}: {}",
                    label,
                    retries,
                    correlation_id,
                    error
                );
                return Err(WorkflowError::RetriesExhausted {
                    operation: label.to_string(),
                    attempts: retries + 1,
                    last: error,
                });
            }

            retries += 1;
            let delay = self.policy.delay_for(retries, &error);
            let kind = WorkflowError::collaborator(label, error.clone()).kind();
            tracing::warn!(
                "{} failed for run {} ({}), retry {} of {} in {:?}",
                label,
                correlation_id,
                error,
                retries,
                self.policy.max_retries,
                delay
            );
            recoveries.push(ErrorRecoveryEvent {
                correlation_id,
                error_kind: kind,
                retry_count: retries,
                escalated: false,
                detail: format!("{label}: {error}"),
            });

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(WorkflowError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}

/// Escalation record for a consultation that expired
#[must_use]
pub fn escalation(correlation_id: CorrelationId, detail: impl Into<String>) -> ErrorRecoveryEvent {
    ErrorRecoveryEvent {
        correlation_id,
        error_kind: ErrorKind::ConsultationTimeout,
        retry_count: 0,
        escalated: true,
        detail: detail.into(),
    }
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
