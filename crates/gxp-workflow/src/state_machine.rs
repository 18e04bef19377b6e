use gxp_core::{WorkflowError, WorkflowState};

/// Validates a state transition against the transition table.
///
/// Illegal transitions are returned as errors so callers can fail the run.
/// The `strict-debug` feature turns them into panics instead.
pub fn validate_transition(from: WorkflowState, to: WorkflowState) -> Result<(), WorkflowError> {
    if allowed(from, to) {
        Ok(())
    } else {
        #[cfg(feature = "strict-debug")]
        panic!("Illegal workflow transition attempted: {from:?} -> {to:?}");

        #[cfg(not(feature = "strict-debug"))]
        Err(WorkflowError::IllegalTransition { from, to })
    }
}

/// States reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: WorkflowState) -> Vec<WorkflowState> {
    use WorkflowState::{
        AgentsAggregated, AgentsDispatched, Categorized, Completed, ConsultationPending, Failed,
        Ingested, Planned, SuiteGenerated, Validated,
    };
    match from {
        Ingested => vec![Categorized, ConsultationPending, Failed],
        Categorized => vec![Planned, ConsultationPending, Failed],
        Planned => vec![AgentsDispatched, ConsultationPending, Failed],
        AgentsDispatched => vec![AgentsAggregated, ConsultationPending, Failed],
        AgentsAggregated => vec![SuiteGenerated, ConsultationPending, Failed],
        SuiteGenerated => vec![Validated, ConsultationPending, Failed],
        Validated => vec![Completed, ConsultationPending, Failed],
        ConsultationPending => vec![
            Ingested,
            Categorized,
            Planned,
            AgentsDispatched,
            AgentsAggregated,
            SuiteGenerated,
            Validated,
            Failed,
        ],
        Completed | Failed => vec![],
    }
}

/// The state a successful stage moves to, if the state runs a stage at all
#[cfg(test)]
fn pipeline_successor(from: WorkflowState) -> Option<WorkflowState> {
    use WorkflowState::{
        AgentsAggregated, AgentsDispatched, Categorized, Completed, ConsultationPending, Failed,
        Ingested, Planned, SuiteGenerated, Validated,
    };
    match from {
        Ingested => Some(Categorized),
        Categorized => Some(Planned),
        Planned => Some(AgentsDispatched),
        AgentsDispatched => Some(AgentsAggregated),
        AgentsAggregated => Some(SuiteGenerated),
        SuiteGenerated => Some(Validated),
        Validated => Some(Completed),
        ConsultationPending | Completed | Failed => None,
    }
}

fn allowed(from: WorkflowState, to: WorkflowState) -> bool {
    allowed_transitions(from).into_iter().any(|s| s == to)
}
