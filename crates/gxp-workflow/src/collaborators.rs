//! External collaborator boundaries
//!
//! The engine never talks to a document store, model endpoint, vector index,
//! identity provider or agent runtime directly. Each is reached through one of
//! the traits below, bundled into [`Collaborators`] when an engine is built.

use async_trait::async_trait;
use gxp_core::{AgentRequest, CollaboratorError, DocumentRef, RecordId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Text and metadata pulled out of a document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub text: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Turns a document reference into text
#[async_trait]
pub trait DocumentProcessor: Send + Sync {
    async fn extract(&self, document: &DocumentRef) -> Result<ExtractedDocument, CollaboratorError>;
}

/// What a prompt is asking the model to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptPurpose {
    Categorization,
    SuiteGeneration,
}

/// A single model request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub purpose: PromptPurpose,
    /// Standing instructions
    pub system: String,
    /// Request body
    pub user: String,
}

/// Sampling options passed with every completion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionOptions {
    /// Deterministic sampling with the given output budget
    #[inline]
    #[must_use]
    pub fn deterministic(max_tokens: u32) -> Self {
        Self {
            max_tokens,
            temperature: 0.0,
        }
    }
}

/// Text completion endpoint
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(
        &self,
        prompt: &Prompt,
        options: &CompletionOptions,
    ) -> Result<String, CollaboratorError>;
}

/// One regulatory reference returned by the knowledge store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeMatch {
    /// Stable identifier of the matched passage
    pub reference: String,
    pub score: f32,
    #[serde(default)]
    pub excerpt: String,
}

/// Similarity search over regulatory guidance
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    async fn query(&self, text: &str, limit: usize) -> Result<Vec<KnowledgeMatch>, CollaboratorError>;
}

/// Identifier of an electronic signature bound to an audit record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignatureId(pub String);

impl fmt::Display for SignatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role checks and electronic signatures
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccessControl: Send + Sync {
    /// Whether `user` holds `role` for `action`
    async fn authorize(&self, user: &str, role: &str, action: &str) -> Result<bool, CollaboratorError>;

    /// Bind a signature with the given meaning to an audit record
    async fn bind_signature(
        &self,
        record: RecordId,
        signer: &str,
        meaning: &str,
    ) -> Result<SignatureId, CollaboratorError>;
}

/// Executes one specialist sub-analysis
#[async_trait]
pub trait AgentWorker: Send + Sync {
    async fn run(&self, request: &AgentRequest) -> Result<serde_json::Value, CollaboratorError>;
}

/// Every collaborator an engine needs
#[derive(Clone)]
pub struct Collaborators {
    pub documents: Arc<dyn DocumentProcessor>,
    pub model: Arc<dyn LanguageModel>,
    pub knowledge: Arc<dyn KnowledgeStore>,
    pub access: Arc<dyn AccessControl>,
    pub agents: Arc<dyn AgentWorker>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
