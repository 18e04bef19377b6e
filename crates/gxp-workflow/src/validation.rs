//! Structural review of a generated test suite

use gxp_core::{TestStrategy, TestSuite, ValidationStatus};
use std::collections::HashSet;

/// Outcome of [`review_suite`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteReview {
    pub status: ValidationStatus,
    pub findings: Vec<String>,
}

/// Check a suite against the strategy it was generated for
///
/// Structural defects fail the suite outright. A suite that is sound but
/// covers less than half the planned test count needs a reviewer.
#[must_use]
pub fn review_suite(suite: &TestSuite, strategy: &TestStrategy) -> SuiteReview {
    let mut findings = Vec::new();

    if suite.tests.is_empty() {
        findings.push("suite contains no test cases".to_string());
    }
    if suite.category != strategy.category {
        findings.push(format!(
            "suite category {} does not match planned category {}",
            suite.category, strategy.category
        ));
    }

    let mut seen = HashSet::new();
    for test in &suite.tests {
        if test.id.trim().is_empty() {
            findings.push(format!("test `{}` has no identifier", test.title));
        } else if !seen.insert(test.id.as_str()) {
            findings.push(format!("duplicate test id `{}`", test.id));
        }
        if test.steps.is_empty() {
            findings.push(format!("test `{}` has no steps", test.id));
        }
        if test.acceptance_criteria.is_empty() {
            findings.push(format!("test `{}` has no acceptance criteria", test.id));
        }
    }

    if !findings.is_empty() {
        return SuiteReview {
            status: ValidationStatus::Fail,
            findings,
        };
    }

    let minimum = strategy.estimated_test_count.div_ceil(2) as usize;
    if suite.tests.len() < minimum {
        findings.push(format!(
            "suite has {} tests, planned {} (minimum {minimum})",
            suite.tests.len(),
            strategy.estimated_test_count
        ));
        return SuiteReview {
            status: ValidationStatus::NeedsConsultation,
            findings,
        };
    }

    SuiteReview {
        status: ValidationStatus::Pass,
        findings,
    }
}
