use crate::record::AuditRecord;
use crate::sink::AuditSink;
use gxp_core::digest::json_digest;
use gxp_core::{CorrelationId, RecordId, WorkflowError, WorkflowEvent, WorkflowState};
use std::sync::Arc;

/// Turns transitions into audit records
///
/// Any failure to produce or persist a record is reported as
/// `WorkflowError::AuditWriteFailure`, which is always fatal to the run.
#[derive(Clone)]
pub struct AuditEmitter {
    sink: Arc<dyn AuditSink>,
}

impl std::fmt::Debug for AuditEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditEmitter").finish_non_exhaustive()
    }
}

impl AuditEmitter {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Write the record for one transition
    pub async fn record_transition(
        &self,
        correlation_id: CorrelationId,
        sequence: u64,
        prior_state: WorkflowState,
        new_state: WorkflowState,
        event: &WorkflowEvent,
    ) -> Result<RecordId, WorkflowError> {
        let payload_hash = json_digest(event)
            .map_err(|e| WorkflowError::AuditWriteFailure(format!("cannot hash payload: {e}")))?;
        let record = AuditRecord::new(
            correlation_id,
            sequence,
            prior_state,
            new_state,
            event.kind(),
            payload_hash,
        );

        match self.sink.append(record).await {
            Ok(id) => {
                tracing::debug!(
                    "Audit record {} for run {}: {} -> {}",
                    id,
                    correlation_id,
                    prior_state,
                    new_state
                );
                Ok(id)
            }
            Err(e) => {
                tracing::error!("Audit write failed for run {}: {}", correlation_id, e);
                Err(WorkflowError::AuditWriteFailure(e.to_string()))
            }
        }
    }
}
