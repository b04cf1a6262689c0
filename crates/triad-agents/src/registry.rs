use std::sync::Arc;
use std::time::Duration;

use triad_models::{AgentLayer, AnalystConfig, LlmConfig, RosterConfig};

use crate::analyst::{ClaudeAnalyst, ResearchAgent};
use crate::claude_cli::ClaudeCliConfig;
use crate::oversight::{ClaudeCeo, OversightAgent};
use crate::prompts;
use crate::synthesis::ClaudeFundManager;

/// The agent registry contract the loop controller resolves its agents from.
/// Implemented by the config-driven `AgentRegistry` and by test rosters.
pub trait AgentRoster: Send + Sync {
    fn layer1_agents(&self) -> Vec<Arc<dyn ResearchAgent>>;
    fn layer2_agents(&self) -> Vec<Arc<dyn ResearchAgent>>;
    fn fund_manager(&self) -> Arc<dyn ResearchAgent>;
    fn ceo(&self) -> Arc<dyn OversightAgent>;
}

/// Builds ready-to-use Claude-backed agents from the roster configuration.
///
/// Agents come out prompt-configured; per-agent model overrides fall back to
/// the shared defaults in `LlmConfig`.
pub struct AgentRegistry {
    roster: RosterConfig,
    llm: LlmConfig,
}

impl AgentRegistry {
    pub fn new(roster: RosterConfig, llm: LlmConfig) -> Self {
        Self { roster, llm }
    }

    fn analyst_cli_config(&self, config: &AnalystConfig) -> ClaudeCliConfig {
        ClaudeCliConfig {
            model: config
                .model
                .clone()
                .unwrap_or_else(|| self.llm.analyst_model.clone()),
            timeout: Duration::from_secs(self.llm.analyst_timeout_seconds),
        }
    }

    fn build_analyst(&self, config: &AnalystConfig, layer: AgentLayer) -> Arc<dyn ResearchAgent> {
        let system_prompt = config.system_prompt.clone().unwrap_or_else(|| match layer {
            AgentLayer::Layer1Primary => prompts::layer1_system_prompt(&config.name, &config.focus),
            _ => prompts::layer2_system_prompt(&config.name, &config.focus, config.specialty),
        });

        Arc::new(ClaudeAnalyst::new(
            config.id.clone(),
            config.name.clone(),
            layer,
            system_prompt,
            config.coverage.clone(),
            config.specialty,
            self.analyst_cli_config(config),
        ))
    }
}

impl AgentRoster for AgentRegistry {
    fn layer1_agents(&self) -> Vec<Arc<dyn ResearchAgent>> {
        self.roster
            .layer1
            .iter()
            .filter(|a| a.enabled)
            .map(|a| self.build_analyst(a, AgentLayer::Layer1Primary))
            .collect()
    }

    fn layer2_agents(&self) -> Vec<Arc<dyn ResearchAgent>> {
        self.roster
            .layer2
            .iter()
            .filter(|a| a.enabled)
            .map(|a| self.build_analyst(a, AgentLayer::Layer2Secondary))
            .collect()
    }

    fn fund_manager(&self) -> Arc<dyn ResearchAgent> {
        let config = &self.roster.fund_manager;
        let system_prompt = config
            .system_prompt
            .clone()
            .unwrap_or_else(|| prompts::fund_manager_system_prompt(&config.name));

        Arc::new(ClaudeFundManager::new(
            config.name.clone(),
            system_prompt,
            ClaudeCliConfig {
                model: config
                    .model
                    .clone()
                    .unwrap_or_else(|| self.llm.synthesis_model.clone()),
                timeout: Duration::from_secs(self.llm.synthesis_timeout_seconds),
            },
        ))
    }

    fn ceo(&self) -> Arc<dyn OversightAgent> {
        let config = &self.roster.ceo;
        let system_prompt = config
            .system_prompt
            .clone()
            .unwrap_or_else(|| prompts::ceo_system_prompt(&config.name));

        Arc::new(ClaudeCeo::new(
            config.name.clone(),
            system_prompt,
            ClaudeCliConfig {
                model: config
                    .model
                    .clone()
                    .unwrap_or_else(|| self.llm.oversight_model.clone()),
                timeout: Duration::from_secs(self.llm.synthesis_timeout_seconds),
            },
        ))
    }
}
