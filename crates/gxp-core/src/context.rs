//! Per-run context
//!
//! A [`RunContext`] is owned by exactly one run. Values are stored as JSON so
//! that the whole context can be snapshotted into a persisted continuation;
//! reads go through [`RunContext::require`], which fails on absent or
//! ill-typed entries instead of substituting defaults.

use crate::digest::json_digest;
use crate::error::WorkflowError;
use crate::ids::CorrelationId;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Closed set of keys a stage may read or write
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKey {
    Document,
    DocumentText,
    DocumentMetadata,
    Categorization,
    Plan,
    AgentResults,
    Aggregation,
    TestSuite,
    Validation,
}

impl ContextKey {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ContextKey::Document => "document",
            ContextKey::DocumentText => "document_text",
            ContextKey::DocumentMetadata => "document_metadata",
            ContextKey::Categorization => "categorization",
            ContextKey::Plan => "plan",
            ContextKey::AgentResults => "agent_results",
            ContextKey::Aggregation => "aggregation",
            ContextKey::TestSuite => "test_suite",
            ContextKey::Validation => "validation",
        }
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable key/value state of a single run
#[derive(Debug, Clone)]
pub struct RunContext {
    correlation_id: CorrelationId,
    entries: BTreeMap<ContextKey, serde_json::Value>,
}

impl RunContext {
    pub fn new(correlation_id: CorrelationId) -> Self {
        Self {
            correlation_id,
            entries: BTreeMap::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// Store a value, replacing any previous value under `key`
    ///
    /// # Errors
    /// `WorkflowError::CorruptedContext` if the value cannot be serialized.
    pub fn insert<T: Serialize>(&mut self, key: ContextKey, value: &T) -> Result<(), WorkflowError> {
        let json = serde_json::to_value(value)
            .map_err(|e| WorkflowError::CorruptedContext(format!("cannot encode `{key}`: {e}")))?;
        self.entries.insert(key, json);
        Ok(())
    }

    /// Read a value, requiring it to be present and well-typed
    ///
    /// # Errors
    /// - `WorkflowError::MissingContextKey` if `key` is absent
    /// - `WorkflowError::InvalidContextValue` if it does not decode as `T`
    pub fn require<T: DeserializeOwned>(&self, key: ContextKey) -> Result<T, WorkflowError> {
        let value = self
            .entries
            .get(&key)
            .ok_or(WorkflowError::MissingContextKey(key))?;
        serde_json::from_value(value.clone()).map_err(|e| WorkflowError::InvalidContextValue {
            key,
            reason: e.to_string(),
        })
    }

    #[must_use]
    pub fn contains(&self, key: ContextKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn remove(&mut self, key: ContextKey) -> Option<serde_json::Value> {
        self.entries.remove(&key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Capture an integrity-protected copy of the current entries
    ///
    /// # Errors
    /// `WorkflowError::CorruptedContext` if the entries cannot be digested.
    pub fn snapshot(&self) -> Result<ContextSnapshot, WorkflowError> {
        let digest = json_digest(&self.entries)
            .map_err(|e| WorkflowError::CorruptedContext(e.to_string()))?;
        Ok(ContextSnapshot {
            correlation_id: self.correlation_id,
            taken_at: Utc::now(),
            entries: self.entries.clone(),
            digest,
        })
    }

    /// Rebuild a context from a snapshot, verifying its digest
    ///
    /// # Errors
    /// `WorkflowError::CorruptedContext` if the entries do not match the digest.
    pub fn from_snapshot(snapshot: &ContextSnapshot) -> Result<Self, WorkflowError> {
        snapshot.verify()?;
        Ok(Self {
            correlation_id: snapshot.correlation_id,
            entries: snapshot.entries.clone(),
        })
    }
}

/// Serializable, digest-protected copy of a run's context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub correlation_id: CorrelationId,
    pub taken_at: DateTime<Utc>,
    pub entries: BTreeMap<ContextKey, serde_json::Value>,
    /// Hex SHA-256 over the JSON encoding of `entries`
    pub digest: String,
}

impl ContextSnapshot {
    /// Recompute the digest and compare
    pub fn verify(&self) -> Result<(), WorkflowError> {
        let actual = json_digest(&self.entries)
            .map_err(|e| WorkflowError::CorruptedContext(e.to_string()))?;
        if actual != self.digest {
            return Err(WorkflowError::CorruptedContext(format!(
                "snapshot digest mismatch for run {}",
                self.correlation_id
            )));
        }
        Ok(())
    }
}
