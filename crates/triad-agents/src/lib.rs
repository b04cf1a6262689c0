pub mod analyst;
pub mod claude_cli;
pub mod error;
pub mod oversight;
pub mod parser;
pub mod prompts;
pub mod registry;
pub mod synthesis;

pub mod test_support;

pub use analyst::{ClaudeAnalyst, ResearchAgent};
pub use claude_cli::{check_cli_available, invoke_claude, ClaudeCliConfig, Completion};
pub use error::AgentError;
pub use oversight::{ClaudeCeo, OversightAgent};
pub use registry::{AgentRegistry, AgentRoster};
pub use synthesis::ClaudeFundManager;
