//! Error types for the workflow
//!
//! Every failure a stage can raise is a [`WorkflowError`], and every
//! `WorkflowError` maps to exactly one [`ErrorClass`]:
//! - `Transient`: retried with bounded backoff, then escalated to consultation
//! - `Validation`: routed to consultation, never corrected automatically
//! - `Fatal`: the run fails immediately with full diagnostics

use crate::context::ContextKey;
use crate::ids::ConsultationId;
use crate::types::{AgentType, WorkflowState};
use serde::{Deserialize, Serialize};
use std::error::Error as _;

/// Failures reported by an external collaborator call
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CollaboratorError {
    /// Call exceeded its deadline
    #[error("call timed out after {0}ms")]
    Timeout(u64),

    /// Collaborator asked us to slow down
    #[error("rate limited (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    /// Response could not be understood
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Collaborator could not be reached
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl CollaboratorError {
    /// Whether retrying the same call may succeed
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::InvalidResponse(_))
    }
}

/// Main workflow error type
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// A stage needed a context key that is absent
    #[error("missing context key `{0}`")]
    MissingContextKey(ContextKey),

    /// A context key is present but does not decode to the expected type
    #[error("context key `{key}` holds an invalid value: {reason}")]
    InvalidContextValue { key: ContextKey, reason: String },

    /// Category outside {1, 3, 4, 5}
    #[error("invalid GAMP category {0}: only 1, 3, 4 and 5 are permitted")]
    InvalidCategory(i64),

    /// Confidence outside [0, 1]
    #[error("confidence {0} is outside [0, 1]")]
    InvalidConfidence(f64),

    /// Categorization confidence under the configured threshold
    #[error("categorization confidence {confidence} is below threshold {threshold}")]
    LowConfidence { confidence: f64, threshold: f64 },

    /// A single agent exceeded its timeout
    #[error("agent {agent} timed out after {after_ms}ms")]
    AgentTimeout { agent: AgentType, after_ms: u64 },

    /// A single agent reported failure
    #[error("agent {agent} failed: {reason}")]
    AgentFailure { agent: AgentType, reason: String },

    /// Too few agents succeeded for aggregation
    #[error("aggregation incomplete: {succeeded} succeeded, {required} required")]
    AggregationIncomplete { succeeded: usize, required: usize },

    /// The audit store rejected a record
    #[error("audit write failed: {0}")]
    AuditWriteFailure(String),

    /// Signature could not be bound to a decision record
    #[error("signature validation failed for `{signer}`: {reason}")]
    SignatureValidationFailure { signer: String, reason: String },

    /// No decision arrived within the consultation window
    #[error("consultation {consultation_id} received no decision within {after_secs}s")]
    ConsultationTimeout {
        consultation_id: ConsultationId,
        after_secs: u64,
    },

    /// A collaborator call failed once
    #[error("{operation} failed")]
    Collaborator {
        operation: String,
        #[source]
        source: CollaboratorError,
    },

    /// A transient failure persisted through every retry
    #[error("{operation} still failing after {attempts} attempts")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        last: CollaboratorError,
    },

    /// A produced artifact failed validation
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// Context or snapshot integrity lost
    #[error("corrupted context: {0}")]
    CorruptedContext(String),

    /// Transition not in the transition table
    #[error("illegal transition {from} -> {to}")]
    IllegalTransition {
        from: WorkflowState,
        to: WorkflowState,
    },

    /// Run-level cancellation
    #[error("run cancelled")]
    Cancelled,

    /// An authorized reviewer chose to abort
    #[error("run aborted by `{signer}`: {reason}")]
    Aborted { signer: String, reason: String },

    /// An engine invariant broke, such as a stage panicking
    #[error("internal error: {0}")]
    Internal(String),
}

/// Error classes that govern retry, escalation and termination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Transient,
    Validation,
    Fatal,
}

/// Stable, serializable name of a [`WorkflowError`] variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingContextKey,
    InvalidContextValue,
    InvalidCategory,
    InvalidConfidence,
    LowConfidence,
    AgentTimeout,
    AgentFailure,
    AggregationIncomplete,
    AuditWriteFailure,
    SignatureValidationFailure,
    ConsultationTimeout,
    CollaboratorTimeout,
    RateLimited,
    InvalidResponse,
    CollaboratorUnavailable,
    RetriesExhausted,
    ValidationFailed,
    CorruptedContext,
    IllegalTransition,
    Cancelled,
    Aborted,
    Internal,
}

impl WorkflowError {
    /// Classify this error
    ///
    /// `InvalidCategory` is a domain-rule violation: it terminates the run
    /// instead of asking a reviewer to pick a different category.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Collaborator { source, .. } if source.is_transient() => ErrorClass::Transient,
            Self::AgentTimeout { .. } | Self::AgentFailure { .. } => ErrorClass::Transient,

            Self::Collaborator { .. }
            | Self::MissingContextKey(_)
            | Self::InvalidContextValue { .. }
            | Self::InvalidConfidence(_)
            | Self::LowConfidence { .. }
            | Self::AggregationIncomplete { .. }
            | Self::RetriesExhausted { .. }
            | Self::ValidationFailed(_) => ErrorClass::Validation,

            Self::InvalidCategory(_)
            | Self::AuditWriteFailure(_)
            | Self::SignatureValidationFailure { .. }
            | Self::ConsultationTimeout { .. }
            | Self::CorruptedContext(_)
            | Self::IllegalTransition { .. }
            | Self::Cancelled
            | Self::Aborted { .. }
            | Self::Internal(_) => ErrorClass::Fatal,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    #[inline]
    #[must_use]
    pub fn requires_consultation(&self) -> bool {
        self.class() == ErrorClass::Validation
    }

    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::Fatal
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingContextKey(_) => ErrorKind::MissingContextKey,
            Self::InvalidContextValue { .. } => ErrorKind::InvalidContextValue,
            Self::InvalidCategory(_) => ErrorKind::InvalidCategory,
            Self::InvalidConfidence(_) => ErrorKind::InvalidConfidence,
            Self::LowConfidence { .. } => ErrorKind::LowConfidence,
            Self::AgentTimeout { .. } => ErrorKind::AgentTimeout,
            Self::AgentFailure { .. } => ErrorKind::AgentFailure,
            Self::AggregationIncomplete { .. } => ErrorKind::AggregationIncomplete,
            Self::AuditWriteFailure(_) => ErrorKind::AuditWriteFailure,
            Self::SignatureValidationFailure { .. } => ErrorKind::SignatureValidationFailure,
            Self::ConsultationTimeout { .. } => ErrorKind::ConsultationTimeout,
            Self::Collaborator { source, .. } => match source {
                CollaboratorError::Timeout(_) => ErrorKind::CollaboratorTimeout,
                CollaboratorError::RateLimited { .. } => ErrorKind::RateLimited,
                CollaboratorError::InvalidResponse(_) => ErrorKind::InvalidResponse,
                CollaboratorError::Unavailable(_) => ErrorKind::CollaboratorUnavailable,
            },
            Self::RetriesExhausted { .. } => ErrorKind::RetriesExhausted,
            Self::ValidationFailed(_) => ErrorKind::ValidationFailed,
            Self::CorruptedContext(_) => ErrorKind::CorruptedContext,
            Self::IllegalTransition { .. } => ErrorKind::IllegalTransition,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Aborted { .. } => ErrorKind::Aborted,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// This error's message followed by every source in its chain
    #[must_use]
    pub fn chain(&self) -> Vec<String> {
        let mut out = vec![self.to_string()];
        let mut source = self.source();
        while let Some(err) = source {
            out.push(err.to_string());
            source = err.source();
        }
        out
    }

    /// Wrap a collaborator failure with the operation that raised it
    pub fn collaborator(operation: impl Into<String>, source: CollaboratorError) -> Self {
        Self::Collaborator {
            operation: operation.into(),
            source,
        }
    }
}
