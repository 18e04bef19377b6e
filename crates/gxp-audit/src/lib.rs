//! GxP Audit
//!
//! Append-only audit trail for workflow transitions:
//! - [`AuditRecord`]: one record per state transition, SHA-256 chained to its predecessor
//! - [`AuditSink`]: the write-once store boundary (`append(record) -> record_id`)
//! - [`MemoryAuditLog`] and [`FileAuditSink`]: in-process and JSON-lines stores
//! - [`AuditEmitter`]: builds records from transitions and classifies write failures as fatal

pub mod emitter;
pub mod file;
pub mod memory;
pub mod record;
pub mod sink;

pub use emitter::AuditEmitter;
pub use file::{verify_file, FileAuditSink};
pub use memory::MemoryAuditLog;
pub use record::{AuditRecord, IntegrityReport, GENESIS_HASH};
pub use sink::{AuditError, AuditSink};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
