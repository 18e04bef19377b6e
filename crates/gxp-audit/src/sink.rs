use crate::record::AuditRecord;
use gxp_core::RecordId;

/// Audit store errors
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// A link or seal in the chain does not verify
    #[error("audit chain integrity violation at position {position}")]
    IntegrityViolation { position: usize },

    /// The store could not persist the record; nothing was written
    #[error("audit store I/O failure: {0}")]
    Io(String),

    /// The store refused the record
    #[error("audit store rejected record: {0}")]
    Rejected(String),

    #[error("audit record encoding failed: {0}")]
    Encoding(String),
}

/// Write-once audit store boundary
///
/// Implementations must fail closed: on error, no part of the record may be
/// visible to later reads.
#[async_trait::async_trait]
pub trait AuditSink: Send + Sync {
    /// Append a record, returning its identifier
    async fn append(&self, record: AuditRecord) -> Result<RecordId, AuditError>;
}
