use crate::record::{verify_chain, AuditRecord, IntegrityReport, GENESIS_HASH};
use crate::sink::{AuditError, AuditSink};
use gxp_core::{CorrelationId, RecordId};
use parking_lot::Mutex;

/// In-process hash-chained audit log
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    inner: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seal and append a record
    pub fn append_record(&self, mut record: AuditRecord) -> RecordId {
        let mut guard = self.inner.lock();
        let prev_hash = guard
            .last()
            .map_or_else(|| GENESIS_HASH.to_string(), |r| r.hash.clone());
        record.seal(&prev_hash);
        let id = record.record_id;
        guard.push(record);
        id
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.inner.lock().clone()
    }

    /// Records of one run in append order
    pub fn records_for(&self, correlation_id: CorrelationId) -> Vec<AuditRecord> {
        self.inner
            .lock()
            .iter()
            .filter(|r| r.correlation_id == correlation_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn verify_integrity(&self) -> Result<IntegrityReport, AuditError> {
        let guard = self.inner.lock();
        verify_chain(guard.iter())
    }
}

#[async_trait::async_trait]
impl AuditSink for MemoryAuditLog {
    async fn append(&self, record: AuditRecord) -> Result<RecordId, AuditError> {
        Ok(self.append_record(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gxp_core::{EventKind, WorkflowState};

    fn record(id: CorrelationId, seq: u64) -> AuditRecord {
        AuditRecord::new(
            id,
            seq,
            WorkflowState::Ingested,
            WorkflowState::Categorized,
            EventKind::Categorization,
            "00".into(),
        )
    }

    #[test]
    fn append_links_records() {
        let log = MemoryAuditLog::new();
        let run = CorrelationId::new();
        log.append_record(record(run, 1));
        log.append_record(record(run, 2));

        let records = log.records();
        assert_eq!(records[0].prev_hash, GENESIS_HASH);
        assert_eq!(records[1].prev_hash, records[0].hash);
        assert!(log.verify_integrity().unwrap().valid);
    }

    #[test]
    fn tampering_is_detected() {
        let log = MemoryAuditLog::new();
        let run = CorrelationId::new();
        log.append_record(record(run, 1));
        log.append_record(record(run, 2));

        log.inner.lock()[0].new_state = WorkflowState::Completed;

        let err = log.verify_integrity().unwrap_err();
        assert!(matches!(err, AuditError::IntegrityViolation { position: 0 }));
    }

    #[test]
    fn records_are_filtered_by_run() {
        let log = MemoryAuditLog::new();
        let a = CorrelationId::new();
        let b = CorrelationId::new();
        log.append_record(record(a, 1));
        log.append_record(record(b, 1));
        log.append_record(record(a, 2));
        assert_eq!(log.records_for(a).len(), 2);
        assert_eq!(log.records_for(b).len(), 1);
    }
}
