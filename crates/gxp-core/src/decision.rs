//! Consultation decisions and their schemas
//!
//! Each consultation reason admits a closed set of decision kinds. The schema
//! published with a `ConsultationRequiredEvent` lists exactly those kinds and
//! the fields they carry; decisions outside it are rejected.

use crate::events::ConsultationReason;
use crate::types::{Confidence, GampCategory};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Payload of a human decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Decision {
    /// Supply the categorization the model could not settle
    ConfirmCategory {
        category: GampCategory,
        confidence: Confidence,
        #[serde(default)]
        rationale: Option<String>,
    },
    /// Accept the current outcome and continue
    Proceed {
        #[serde(default)]
        justification: Option<String>,
    },
    /// Re-run the stage that raised the consultation
    Retry,
    /// Terminate the run
    Abort { reason: String },
}

impl Decision {
    #[must_use]
    pub fn kind(&self) -> DecisionKind {
        match self {
            Decision::ConfirmCategory { .. } => DecisionKind::ConfirmCategory,
            Decision::Proceed { .. } => DecisionKind::Proceed,
            Decision::Retry => DecisionKind::Retry,
            Decision::Abort { .. } => DecisionKind::Abort,
        }
    }
}

/// Discriminant of [`Decision`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    ConfirmCategory,
    Proceed,
    Retry,
    Abort,
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DecisionKind::ConfirmCategory => "confirm_category",
            DecisionKind::Proceed => "proceed",
            DecisionKind::Retry => "retry",
            DecisionKind::Abort => "abort",
        };
        f.write_str(s)
    }
}

/// One field a reviewer must or may supply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionField {
    pub name: String,
    /// JSON type of the field
    pub field_type: String,
    pub required: bool,
    pub description: String,
    /// Permitted values, when the field is an enumeration
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<String>,
}

impl DecisionField {
    fn new(name: &str, field_type: &str, required: bool, description: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: field_type.to_string(),
            required,
            description: description.to_string(),
            allowed_values: Vec::new(),
        }
    }

    fn with_allowed(mut self, values: &[&str]) -> Self {
        self.allowed_values = values.iter().map(|v| (*v).to_string()).collect();
        self
    }
}

/// Everything a reviewer needs to submit a valid resuming decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionSchema {
    pub reason: ConsultationReason,
    pub required_role: String,
    pub accepted: Vec<DecisionKind>,
    pub fields: Vec<DecisionField>,
}

impl DecisionSchema {
    /// Build the schema for a consultation reason
    ///
    /// `can_proceed` is true when the raising stage has an acceptance target a
    /// reviewer may move the run to.
    #[must_use]
    pub fn for_reason(reason: ConsultationReason, required_role: impl Into<String>, can_proceed: bool) -> Self {
        let accepted = match reason {
            ConsultationReason::LowConfidence => {
                vec![DecisionKind::ConfirmCategory, DecisionKind::Abort]
            }
            ConsultationReason::AggregationIncomplete | ConsultationReason::ValidationError => {
                if can_proceed {
                    vec![DecisionKind::Proceed, DecisionKind::Retry, DecisionKind::Abort]
                } else {
                    vec![DecisionKind::Retry, DecisionKind::Abort]
                }
            }
            ConsultationReason::RetriesExhausted => vec![DecisionKind::Retry, DecisionKind::Abort],
        };

        let kinds: Vec<String> = accepted.iter().map(ToString::to_string).collect();
        let kind_refs: Vec<&str> = kinds.iter().map(String::as_str).collect();
        let mut fields = vec![
            DecisionField::new("kind", "string", true, "Decision kind").with_allowed(&kind_refs),
            DecisionField::new("signer", "string", true, "Identity of the authorizing reviewer"),
        ];
        for kind in &accepted {
            match kind {
                DecisionKind::ConfirmCategory => {
                    fields.push(
                        DecisionField::new("category", "integer", true, "GAMP software category")
                            .with_allowed(&["1", "3", "4", "5"]),
                    );
                    fields.push(DecisionField::new(
                        "confidence",
                        "number",
                        true,
                        "Reviewer confidence in [0, 1]",
                    ));
                    fields.push(DecisionField::new(
                        "rationale",
                        "string",
                        false,
                        "Reason for the categorization",
                    ));
                }
                DecisionKind::Proceed => fields.push(DecisionField::new(
                    "justification",
                    "string",
                    false,
                    "Why the current outcome is acceptable",
                )),
                DecisionKind::Abort => fields.push(DecisionField::new(
                    "reason",
                    "string",
                    true,
                    "Why the run is terminated",
                )),
                DecisionKind::Retry => {}
            }
        }

        Self {
            reason,
            required_role: required_role.into(),
            accepted,
            fields,
        }
    }

    /// Whether this schema accepts the decision's kind
    #[must_use]
    pub fn admits(&self, decision: &Decision) -> bool {
        self.accepted.contains(&decision.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_confidence_requires_category() {
        let schema = DecisionSchema::for_reason(ConsultationReason::LowConfidence, "validation_engineer", false);
        assert_eq!(schema.accepted, vec![DecisionKind::ConfirmCategory, DecisionKind::Abort]);
        assert!(schema.fields.iter().any(|f| f.name == "category" && f.required));
        assert!(!schema.admits(&Decision::Retry));
    }

    #[test]
    fn proceed_only_when_offered() {
        let with = DecisionSchema::for_reason(ConsultationReason::ValidationError, "qa", true);
        let without = DecisionSchema::for_reason(ConsultationReason::ValidationError, "qa", false);
        let proceed = Decision::Proceed { justification: None };
        assert!(with.admits(&proceed));
        assert!(!without.admits(&proceed));
    }

    #[test]
    fn decision_json_shape() {
        let decision: Decision = serde_json::from_str(
            r#"{"kind":"confirm_category","category":4,"confidence":0.85}"#,
        )
        .unwrap();
        assert_eq!(decision.kind(), DecisionKind::ConfirmCategory);

        let bad = serde_json::from_str::<Decision>(
            r#"{"kind":"confirm_category","category":2,"confidence":0.85}"#,
        );
        assert!(bad.is_err());
    }
}
