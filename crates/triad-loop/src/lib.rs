//! The convergence-loop core: detector, workflow state machine, layer
//! executor, and the loop controller that drives them.

pub mod controller;
pub mod convergence;
pub mod error;
pub mod executor;
pub mod state;

pub use controller::LoopController;
pub use convergence::ConvergenceDetector;
pub use error::LoopError;
pub use executor::LayerExecutor;
pub use state::{PhaseTransition, WorkflowPhase, WorkflowStateMachine};
