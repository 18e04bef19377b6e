//! Test strategy planning
//!
//! Strategy is a pure function of the GAMP category and the agent success
//! ratio, so the same categorization always yields the same plan.

use gxp_core::{AgentType, GampCategory, TestStrategy};

/// Derives a [`TestStrategy`] from a confirmed category
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestPlanner {
    min_success_ratio: f64,
}

impl TestPlanner {
    /// # Arguments
    /// * `min_success_ratio` - Fraction of dispatched agents that must succeed
    #[inline]
    #[must_use]
    pub fn new(min_success_ratio: f64) -> Self {
        Self { min_success_ratio }
    }

    #[must_use]
    pub fn plan(&self, category: GampCategory) -> TestStrategy {
        let (approach, estimated_test_count, required_agents) = match category {
            GampCategory::Infrastructure => (
                "infrastructure qualification: installation and operational checks",
                3,
                vec![AgentType::ContextProvider],
            ),
            GampCategory::NonConfigured => (
                "standard functional testing of the supplied product",
                5,
                vec![AgentType::ContextProvider, AgentType::SubjectMatterExpert],
            ),
            GampCategory::Configured => (
                "configuration verification with risk-based functional testing",
                15,
                vec![
                    AgentType::ContextProvider,
                    AgentType::SubjectMatterExpert,
                    AgentType::Research,
                ],
            ),
            GampCategory::Custom => (
                "full lifecycle testing of custom code including integration and security",
                25,
                vec![
                    AgentType::ContextProvider,
                    AgentType::SubjectMatterExpert,
                    AgentType::Research,
                ],
            ),
        };

        let min_successful_agents = required_successes(required_agents.len(), self.min_success_ratio);
        TestStrategy {
            category,
            approach: approach.to_string(),
            estimated_test_count,
            required_agents,
            min_successful_agents,
        }
    }
}

/// `ceil(planned * ratio)`, clamped to `1..=planned`
#[must_use]
pub fn required_successes(planned: usize, ratio: f64) -> usize {
    if planned == 0 {
        return 0;
    }
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let required = (planned as f64 * ratio.clamp(0.0, 1.0)).ceil() as usize;
    required.clamp(1, planned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn category_four_dispatches_three_and_needs_two() {
        let strategy = TestPlanner::new(0.6).plan(GampCategory::Configured);
        assert_eq!(strategy.required_agents.len(), 3);
        assert_eq!(strategy.min_successful_agents, 2);
        assert_eq!(strategy.estimated_test_count, 15);
    }

    #[test]
    fn rigor_grows_with_category() {
        let planner = TestPlanner::new(0.6);
        let counts: Vec<u32> = [
            GampCategory::Infrastructure,
            GampCategory::NonConfigured,
            GampCategory::Configured,
            GampCategory::Custom,
        ]
        .into_iter()
        .map(|c| planner.plan(c).estimated_test_count)
        .collect();
        assert_eq!(counts, vec![3, 5, 15, 25]);
    }

    #[test]
    fn every_plan_dispatches_at_least_one_agent() {
        let planner = TestPlanner::new(0.0);
        let strategy = planner.plan(GampCategory::Infrastructure);
        assert_eq!(strategy.required_agents, vec![AgentType::ContextProvider]);
        assert_eq!(strategy.min_successful_agents, 1);
    }

    #[test]
    fn required_successes_rounds_up() {
        assert_eq!(required_successes(3, 0.6), 2);
        assert_eq!(required_successes(2, 0.6), 2);
        assert_eq!(required_successes(3, 1.0), 3);
        assert_eq!(required_successes(3, 0.1), 1);
        assert_eq!(required_successes(0, 0.6), 0);
    }
}
