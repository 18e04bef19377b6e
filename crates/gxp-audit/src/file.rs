//! JSON-lines audit store
//!
//! Each record is one line. The file is only ever opened for append, and the
//! in-memory chain head advances only after the line has been flushed and
//! synced. A write that fails part way is truncated away before the error is
//! returned; if even that fails, the sink refuses every later append.

use crate::record::{verify_chain, AuditRecord, IntegrityReport, GENESIS_HASH};
use crate::sink::{AuditError, AuditSink};
use gxp_core::RecordId;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Byte-level operations the sink needs from its backing file
#[async_trait::async_trait]
trait LogFile: Send {
    async fn len(&mut self) -> std::io::Result<u64>;
    async fn append(&mut self, bytes: &[u8]) -> std::io::Result<()>;
    async fn sync(&mut self) -> std::io::Result<()>;
    async fn truncate(&mut self, len: u64) -> std::io::Result<()>;
}

#[async_trait::async_trait]
impl LogFile for File {
    async fn len(&mut self) -> std::io::Result<u64> {
        Ok(self.metadata().await?.len())
    }

    async fn append(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.write_all(bytes).await?;
        self.flush().await
    }

    async fn sync(&mut self) -> std::io::Result<()> {
        self.sync_data().await
    }

    async fn truncate(&mut self, len: u64) -> std::io::Result<()> {
        self.set_len(len).await?;
        self.sync_data().await
    }
}

struct Writer {
    file: Box<dyn LogFile>,
    head: String,
    /// Set when a failed write could not be rolled back
    poisoned: Option<String>,
}

/// Append-only JSON-lines audit sink
pub struct FileAuditSink {
    path: PathBuf,
    writer: Mutex<Writer>,
}

impl std::fmt::Debug for FileAuditSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileAuditSink").field("path", &self.path).finish()
    }
}

impl FileAuditSink {
    /// Open or create the log at `path`
    ///
    /// An existing file is verified first and appending continues from its head.
    ///
    /// # Errors
    /// `AuditError::IntegrityViolation` if the existing chain is broken,
    /// `AuditError::Io` if the file cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        let head = if tokio::fs::try_exists(&path)
            .await
            .map_err(|e| AuditError::Io(e.to_string()))?
        {
            let verify_path = path.clone();
            let report = tokio::task::spawn_blocking(move || verify_file(verify_path))
                .await
                .map_err(|e| AuditError::Io(e.to_string()))??;
            report.head_hash.unwrap_or_else(|| GENESIS_HASH.to_string())
        } else {
            GENESIS_HASH.to_string()
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| AuditError::Io(e.to_string()))?;

        tracing::debug!("Opened audit log {}", path.display());
        Ok(Self::from_parts(path, Box::new(file), head))
    }

    fn from_parts(path: PathBuf, file: Box<dyn LogFile>, head: String) -> Self {
        Self {
            path,
            writer: Mutex::new(Writer {
                file,
                head,
                poisoned: None,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl AuditSink for FileAuditSink {
    async fn append(&self, mut record: AuditRecord) -> Result<RecordId, AuditError> {
        let mut writer = self.writer.lock().await;
        if let Some(reason) = &writer.poisoned {
            return Err(AuditError::Rejected(format!(
                "{} is unusable after a failed rollback: {reason}",
                self.path.display()
            )));
        }
        record.seal(&writer.head);

        let mut line =
            serde_json::to_vec(&record).map_err(|e| AuditError::Encoding(e.to_string()))?;
        line.push(b'\n');

        let start = writer
            .file
            .len()
            .await
            .map_err(|e| AuditError::Io(e.to_string()))?;
        let written = match writer.file.append(&line).await {
            Ok(()) => writer.file.sync().await,
            Err(e) => Err(e),
        };
        if let Err(error) = written {
            match writer.file.truncate(start).await {
                Ok(()) => tracing::warn!(
                    "Rolled back audit record {} at offset {}: {}",
                    record.sequence,
                    start,
                    error
                ),
                Err(rollback) => {
                    tracing::error!(
                        "Audit log {} left with a partial record: {}",
                        self.path.display(),
                        rollback
                    );
                    writer.poisoned = Some(rollback.to_string());
                }
            }
            return Err(AuditError::Io(error.to_string()));
        }

        writer.head.clone_from(&record.hash);
        Ok(record.record_id)
    }
}

/// Verify the hash chain of a JSON-lines audit file
///
/// # Errors
/// `AuditError::Io` for unreadable files, `AuditError::Encoding` for lines that
/// are not records, `AuditError::IntegrityViolation` for broken links.
pub fn verify_file(path: impl AsRef<Path>) -> Result<IntegrityReport, AuditError> {
    let file = std::fs::File::open(path.as_ref()).map_err(|e| AuditError::Io(e.to_string()))?;
    let mut records = Vec::new();
    for (index, line) in std::io::BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| AuditError::Io(e.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: AuditRecord = serde_json::from_str(&line)
            .map_err(|e| AuditError::Encoding(format!("line {}: {e}", index + 1)))?;
        records.push(record);
    }
    verify_chain(records.iter())
}
