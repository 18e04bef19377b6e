//! Model prompts and the response shapes they ask for

use crate::collaborators::{Prompt, PromptPurpose};
use gxp_core::{AgentType, CategorizationEvent, TestCase, TestStrategy};
use serde::Deserialize;
use std::fmt::Write as _;

const CATEGORIZATION_SYSTEM: &str = "You classify computerized systems under GAMP 5. \
Valid software categories are 1 (infrastructure), 3 (non-configured product), \
4 (configured product) and 5 (custom application). Category 2 is retired and must not be used. \
Answer with a single JSON object: {\"category\": <1|3|4|5>, \"confidence\": <0..1>, \"rationale\": \"...\"}.";

const SUITE_SYSTEM: &str = "You write operational qualification test suites for regulated systems. \
Answer with a single JSON object: {\"tests\": [{\"id\": \"...\", \"title\": \"...\", \
\"objective\": \"...\", \"steps\": [\"...\"], \"acceptance_criteria\": [\"...\"], \"requirement_refs\": [\"...\"]}]}. \
Every test needs at least one step and one acceptance criterion.";

/// Upper bound on document text placed in a prompt or agent payload
pub const EXCERPT_CHARS: usize = 12_000;

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CategorizationResponse {
    pub(crate) category: i64,
    pub(crate) confidence: f64,
    pub(crate) rationale: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SuiteResponse {
    pub(crate) tests: Vec<TestCase>,
}

pub(crate) fn categorization(text: &str) -> Prompt {
    Prompt {
        purpose: PromptPurpose::Categorization,
        system: CATEGORIZATION_SYSTEM.to_string(),
        user: format!("Categorize the system described below.\n\n{}", excerpt(text)),
    }
}

pub(crate) fn suite_generation(
    categorization: &CategorizationEvent,
    strategy: &TestStrategy,
    text: &str,
    findings: &[(AgentType, serde_json::Value)],
) -> Prompt {
    let mut user = format!(
        "GAMP category: {}\nApproach: {}\nTarget test count: {}\n\nRequirements:\n{}\n",
        categorization.category,
        strategy.approach,
        strategy.estimated_test_count,
        excerpt(text)
    );
    if !findings.is_empty() {
        user.push_str("\nSpecialist findings:\n");
        for (agent, output) in findings {
            let _ = writeln!(user, "- {agent}: {output}");
        }
    }
    Prompt {
        purpose: PromptPurpose::SuiteGeneration,
        system: SUITE_SYSTEM.to_string(),
        user,
    }
}

/// At most [`EXCERPT_CHARS`] characters of `text`, cut on a char boundary
#[must_use]
pub fn excerpt(text: &str) -> &str {
    match text.char_indices().nth(EXCERPT_CHARS) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}
