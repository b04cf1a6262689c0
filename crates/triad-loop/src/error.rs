use thiserror::Error;

use crate::state::WorkflowPhase;

#[derive(Error, Debug)]
pub enum LoopError {
    #[error("Agent error: {0}")]
    Agent(#[from] triad_agents::AgentError),

    #[error("Data error: {0}")]
    Data(#[from] triad_data::DataError),

    #[error("Invalid workflow transition from {from} to {to}")]
    InvalidTransition {
        from: WorkflowPhase,
        to: WorkflowPhase,
    },

    #[error("Run cancelled")]
    Cancelled,
}
