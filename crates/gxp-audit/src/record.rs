use crate::sink::AuditError;
use chrono::{DateTime, Utc};
use gxp_core::{CorrelationId, EventKind, RecordId, TransitionId, WorkflowState};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// `prev_hash` of the first record in a chain
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Immutable proof that one state transition occurred
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub record_id: RecordId,
    pub transition_id: TransitionId,
    pub correlation_id: CorrelationId,
    /// 1-based transition number within the run
    pub sequence: u64,
    pub prior_state: WorkflowState,
    pub new_state: WorkflowState,
    pub event_kind: EventKind,
    /// Hex SHA-256 of the transition's event payload
    pub payload_hash: String,
    pub timestamp: DateTime<Utc>,
    /// Set by the store on append
    pub prev_hash: String,
    /// Set by the store on append
    pub hash: String,
}

impl AuditRecord {
    pub fn new(
        correlation_id: CorrelationId,
        sequence: u64,
        prior_state: WorkflowState,
        new_state: WorkflowState,
        event_kind: EventKind,
        payload_hash: String,
    ) -> Self {
        Self {
            record_id: RecordId::new(),
            transition_id: TransitionId::new(),
            correlation_id,
            sequence,
            prior_state,
            new_state,
            event_kind,
            payload_hash,
            timestamp: Utc::now(),
            prev_hash: String::new(),
            hash: String::new(),
        }
    }

    /// Link this record after `prev_hash` and seal it
    pub(crate) fn seal(&mut self, prev_hash: &str) {
        self.prev_hash = prev_hash.to_string();
        self.hash = compute_hash(self);
    }
}

/// Result of walking a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub valid: bool,
    pub records_checked: usize,
    #[serde(default)]
    pub head_hash: Option<String>,
}

/// Walk records in append order and verify every link and seal
pub(crate) fn verify_chain<'a>(
    records: impl IntoIterator<Item = &'a AuditRecord>,
) -> Result<IntegrityReport, AuditError> {
    let mut prev = GENESIS_HASH.to_string();
    let mut checked = 0usize;
    for record in records {
        if record.prev_hash != prev {
            return Err(AuditError::IntegrityViolation { position: checked });
        }
        if record.hash != compute_hash(record) {
            return Err(AuditError::IntegrityViolation { position: checked });
        }
        prev.clone_from(&record.hash);
        checked += 1;
    }
    Ok(IntegrityReport {
        valid: true,
        records_checked: checked,
        head_hash: (checked > 0).then_some(prev),
    })
}

fn compute_hash(record: &AuditRecord) -> String {
    let mut hasher = Sha256::new();
    hasher.update(record.record_id.0.as_bytes());
    hasher.update(record.transition_id.0.as_bytes());
    hasher.update(record.correlation_id.0.to_bytes());
    hasher.update(record.sequence.to_le_bytes());
    hasher.update(record.prior_state.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(record.new_state.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(record.event_kind.to_string().as_bytes());
    hasher.update([0]);
    hasher.update(record.payload_hash.as_bytes());
    hasher.update([0]);
    hasher.update(record.timestamp.to_rfc3339().as_bytes());
    hasher.update([0]);
    hasher.update(record.prev_hash.as_bytes());
    hex::encode(hasher.finalize())
}
