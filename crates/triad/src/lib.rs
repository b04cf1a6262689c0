//! TRIAD - iterative multi-agent equity research
//!
//! Layered analyst agents propose picks, a fund manager narrows them to a
//! Top-3, a CEO issues KEEP/SWAP verdicts against the previous iteration,
//! and a convergence detector stops the loop.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use triad::models::TriadConfig;
//!
//! let config = TriadConfig::default();
//! let controller = triad::build_controller(&config);
//! ```

pub use triad_agents as agents;
pub use triad_data as data;
pub use triad_loop as orchestration;
pub use triad_models as models;

use std::sync::Arc;

use triad_agents::AgentRegistry;
use triad_data::{DataError, DataSourceRegistry, RunStore};
use triad_loop::LoopController;
use triad_models::TriadConfig;

/// Build a loop controller from configuration: config-driven agent roster
/// plus a data-source registry over the configured snapshot database.
pub fn build_controller(config: &TriadConfig) -> LoopController {
    let roster = Arc::new(AgentRegistry::new(
        config.roster.clone(),
        config.llm.clone(),
    ));
    let data = Arc::new(DataSourceRegistry::new(config.data.clone()));
    LoopController::new(config.convergence.clone(), roster, data)
}

/// Open the run-history store at the configured path.
pub fn open_run_store(config: &TriadConfig) -> Result<RunStore, DataError> {
    RunStore::open(&config.data.run_store_path)
}
