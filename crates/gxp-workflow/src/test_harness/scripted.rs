//! Programmable collaborators

use crate::collaborators::{
    AccessControl, AgentWorker, CompletionOptions, DocumentProcessor, ExtractedDocument,
    KnowledgeMatch, KnowledgeStore, LanguageModel, Prompt, PromptPurpose, SignatureId,
};
use async_trait::async_trait;
use gxp_audit::{AuditError, AuditRecord, AuditSink, MemoryAuditLog};
use gxp_core::{AgentRequest, AgentType, CollaboratorError, DocumentRef, RecordId};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Returns fixed text, optionally failing first
#[derive(Debug)]
pub struct ScriptedDocuments {
    text: String,
    failures: Mutex<VecDeque<CollaboratorError>>,
    calls: AtomicUsize,
}

impl ScriptedDocuments {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            failures: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Fail the next call with `error`; failures queue up in order
    #[must_use]
    pub fn failing_with(self, error: CollaboratorError) -> Self {
        self.failures.lock().push_back(error);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentProcessor for ScriptedDocuments {
    async fn extract(&self, document: &DocumentRef) -> Result<ExtractedDocument, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failures.lock().pop_front() {
            return Err(error);
        }
        let mut metadata = BTreeMap::new();
        metadata.insert("uri".to_string(), document.uri.clone());
        if let Some(media_type) = &document.media_type {
            metadata.insert("media_type".to_string(), media_type.clone());
        }
        Ok(ExtractedDocument {
            text: self.text.clone(),
            metadata,
        })
    }
}

/// One scripted model reply
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Fail(CollaboratorError),
    Delayed(Duration, String),
    /// Panic inside the call, as a broken client would
    Panic(String),
}

/// Replies per prompt purpose, in order; the last reply repeats
#[derive(Debug, Default)]
pub struct ScriptedModel {
    scripts: Mutex<HashMap<PromptPurpose, VecDeque<Reply>>>,
    calls: Mutex<HashMap<PromptPurpose, usize>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Confident category 4 and a suite that passes review
    pub fn happy_path() -> Self {
        Self::new()
            .with(PromptPurpose::Categorization, Reply::Text(categorization_reply(4, 0.9)))
            .with(PromptPurpose::SuiteGeneration, Reply::Text(suite_reply(15)))
    }

    #[must_use]
    pub fn with(self, purpose: PromptPurpose, reply: Reply) -> Self {
        self.push(purpose, reply);
        self
    }

    pub fn push(&self, purpose: PromptPurpose, reply: Reply) {
        self.scripts.lock().entry(purpose).or_default().push_back(reply);
    }

    /// Drop queued replies for `purpose` and script `reply` instead
    pub fn replace(&self, purpose: PromptPurpose, reply: Reply) {
        let mut scripts = self.scripts.lock();
        let queue = scripts.entry(purpose).or_default();
        queue.clear();
        queue.push_back(reply);
    }

    pub fn calls(&self, purpose: PromptPurpose) -> usize {
        self.calls.lock().get(&purpose).copied().unwrap_or(0)
    }

    fn next(&self, purpose: PromptPurpose) -> Option<Reply> {
        let mut scripts = self.scripts.lock();
        let queue = scripts.get_mut(&purpose)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &Prompt, _options: &CompletionOptions) -> Result<String, CollaboratorError> {
        *self.calls.lock().entry(prompt.purpose).or_default() += 1;
        match self.next(prompt.purpose) {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Fail(error)) => Err(error),
            Some(Reply::Delayed(delay, text)) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
            Some(Reply::Panic(message)) => panic!("{message}"),
            None => Err(CollaboratorError::Unavailable(format!(
                "no reply scripted for {:?}",
                prompt.purpose
            ))),
        }
    }
}

/// Model reply proposing a category, wrapped the way chat models answer
pub fn categorization_reply(category: i64, confidence: f64) -> String {
    format!(
        "Based on the requirements, here is my assessment:\n```json\n{}\n```",
        serde_json::json!({
            "category": category,
            "confidence": confidence,
            "rationale": "configurable commercial product with site-specific workflows",
        })
    )
}

/// Model reply with `count` well-formed test cases
pub fn suite_reply(count: usize) -> String {
    let tests: Vec<serde_json::Value> = (1..=count)
        .map(|i| {
            serde_json::json!({
                "id": format!("OQ-{i:03}"),
                "title": format!("Verify requirement URS-{i:03}"),
                "objective": "Confirm the configured behaviour matches the requirement",
                "steps": ["Log in as a qualified user", "Execute the configured workflow"],
                "acceptance_criteria": ["Observed result matches the expected result"],
                "requirement_refs": [format!("URS-{i:03}")],
            })
        })
        .collect();
    serde_json::json!({ "tests": tests }).to_string()
}

/// Fixed knowledge-store matches
#[derive(Debug, Clone)]
pub struct StaticKnowledge {
    matches: Vec<KnowledgeMatch>,
}

impl StaticKnowledge {
    pub fn new(matches: Vec<KnowledgeMatch>) -> Self {
        Self { matches }
    }

    /// A few GAMP 5 and 21 CFR Part 11 references
    pub fn gamp_guidance() -> Self {
        Self::new(vec![
            KnowledgeMatch {
                reference: "GAMP5:Appendix-M4".to_string(),
                score: 0.92,
                excerpt: "Categories of software and hardware".to_string(),
            },
            KnowledgeMatch {
                reference: "21CFR11.10(a)".to_string(),
                score: 0.81,
                excerpt: "Validation of systems to ensure accuracy and reliability".to_string(),
            },
            KnowledgeMatch {
                reference: "GAMP5:Appendix-D5".to_string(),
                score: 0.74,
                excerpt: "Testing of computerized systems".to_string(),
            },
        ])
    }
}

#[async_trait]
impl KnowledgeStore for StaticKnowledge {
    async fn query(&self, _text: &str, limit: usize) -> Result<Vec<KnowledgeMatch>, CollaboratorError> {
        Ok(self.matches.iter().take(limit).cloned().collect())
    }
}

/// Signature bound by [`ScriptedAccess`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundSignature {
    pub record: RecordId,
    pub signer: String,
    pub meaning: String,
}

/// Role table and signature ledger
#[derive(Debug, Default)]
pub struct ScriptedAccess {
    roles: Mutex<HashMap<String, HashSet<String>>>,
    signatures: Mutex<Vec<BoundSignature>>,
    reject_signatures: AtomicBool,
}

impl ScriptedAccess {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn granting(self, user: &str, role: &str) -> Self {
        self.grant(user, role);
        self
    }

    pub fn grant(&self, user: &str, role: &str) {
        self.roles
            .lock()
            .entry(user.to_string())
            .or_default()
            .insert(role.to_string());
    }

    /// Make every later `bind_signature` call fail
    pub fn reject_signatures(&self) {
        self.reject_signatures.store(true, Ordering::SeqCst);
    }

    pub fn signatures(&self) -> Vec<BoundSignature> {
        self.signatures.lock().clone()
    }
}

#[async_trait]
impl AccessControl for ScriptedAccess {
    async fn authorize(&self, user: &str, role: &str, _action: &str) -> Result<bool, CollaboratorError> {
        Ok(self
            .roles
            .lock()
            .get(user)
            .is_some_and(|roles| roles.contains(role)))
    }

    async fn bind_signature(
        &self,
        record: RecordId,
        signer: &str,
        meaning: &str,
    ) -> Result<SignatureId, CollaboratorError> {
        if self.reject_signatures.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Unavailable("signature service offline".into()));
        }
        let mut signatures = self.signatures.lock();
        signatures.push(BoundSignature {
            record,
            signer: signer.to_string(),
            meaning: meaning.to_string(),
        });
        Ok(SignatureId(format!("SIG-{:04}", signatures.len())))
    }
}

/// How a scripted agent behaves
#[derive(Debug, Clone)]
pub enum AgentBehavior {
    Succeed,
    Fail(String),
    /// Succeed after a delay
    Delay(Duration),
    /// Never answer within any sensible timeout
    Hang,
}

/// Agent worker with per-type behaviour and an in-flight high-water mark
#[derive(Debug, Default)]
pub struct ScriptedAgents {
    behaviors: Mutex<HashMap<AgentType, AgentBehavior>>,
    in_flight: Arc<AtomicUsize>,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedAgents {
    /// Every agent succeeds immediately
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(self, agent: AgentType, behavior: AgentBehavior) -> Self {
        self.set(agent, behavior);
        self
    }

    pub fn set(&self, agent: AgentType, behavior: AgentBehavior) {
        self.behaviors.lock().insert(agent, behavior);
    }

    /// Most calls observed in flight at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentWorker for ScriptedAgents {
    async fn run(&self, request: &AgentRequest) -> Result<serde_json::Value, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(Arc::clone(&self.in_flight));
        self.peak.fetch_max(now, Ordering::SeqCst);

        let behavior = self
            .behaviors
            .lock()
            .get(&request.agent_type)
            .cloned()
            .unwrap_or(AgentBehavior::Succeed);
        match behavior {
            AgentBehavior::Succeed => {}
            AgentBehavior::Fail(reason) => return Err(CollaboratorError::Unavailable(reason)),
            AgentBehavior::Delay(delay) => tokio::time::sleep(delay).await,
            AgentBehavior::Hang => tokio::time::sleep(Duration::from_secs(3_600)).await,
        }
        Ok(serde_json::json!({
            "agent": request.agent_type,
            "findings": [format!("{} review complete", request.agent_type)],
        }))
    }
}

/// Audit sink that accepts `capacity` records, then fails closed
#[derive(Debug)]
pub struct FailingAuditSink {
    log: MemoryAuditLog,
    capacity: usize,
}

impl FailingAuditSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            log: MemoryAuditLog::new(),
            capacity,
        }
    }

    /// Records accepted before the sink started failing
    pub fn log(&self) -> &MemoryAuditLog {
        &self.log
    }
}

#[async_trait]
impl AuditSink for FailingAuditSink {
    async fn append(&self, record: AuditRecord) -> Result<RecordId, AuditError> {
        if self.log.len() >= self.capacity {
            return Err(AuditError::Io("write-once volume full".into()));
        }
        self.log.append(record).await
    }
}
