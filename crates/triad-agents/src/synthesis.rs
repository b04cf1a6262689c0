use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;
use triad_models::{AgentLayer, AgentOutput, ResearchPayload, StockPick, SynthesisResponse};

use crate::analyst::ResearchAgent;
use crate::claude_cli::{invoke_claude, ClaudeCliConfig};
use crate::error::AgentError;
use crate::parser::parse_structured;
use crate::prompts;

/// The fund manager (layer 3): synthesizes the secondary analysts' output
/// into the proposed Top 3.
pub struct ClaudeFundManager {
    pub name: String,
    pub system_prompt: String,
    pub cli_config: ClaudeCliConfig,
}

impl ClaudeFundManager {
    pub fn new(name: String, system_prompt: String, cli_config: ClaudeCliConfig) -> Self {
        Self {
            name,
            system_prompt,
            cli_config,
        }
    }
}

/// Clamp a synthesis result to at most 3 picks. Extra picks are dropped with
/// a warning; a short list is passed through untouched (degraded runs are
/// surfaced upstream, never padded with synthetic picks).
pub fn clamp_top3(agent_id: &str, mut picks: Vec<StockPick>) -> Vec<StockPick> {
    if picks.len() > 3 {
        warn!(
            agent_id = %agent_id,
            returned = picks.len(),
            "Synthesis returned more than 3 picks; truncating"
        );
        picks.truncate(3);
    } else if picks.len() < 3 {
        warn!(
            agent_id = %agent_id,
            returned = picks.len(),
            "Synthesis returned fewer than 3 picks"
        );
    }
    picks
}

#[async_trait]
impl ResearchAgent for ClaudeFundManager {
    fn id(&self) -> &str {
        "fund_manager"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn layer(&self) -> AgentLayer {
        AgentLayer::Layer3FundManager
    }

    async fn analyze(&self, payload: &ResearchPayload) -> Result<AgentOutput, AgentError> {
        let user_prompt = prompts::synthesis_request(&payload.upstream);
        let completion = invoke_claude(&self.system_prompt, &user_prompt, &self.cli_config).await?;
        let parsed: SynthesisResponse = parse_structured(&completion.text)?;

        let picks = clamp_top3(self.id(), parsed.top3);

        let mut reasoning = parsed.synthesis_reasoning;
        if !parsed.excluded_companies.is_empty() {
            reasoning.push_str(&format!(
                "\nExcluded: {}",
                parsed.excluded_companies.join(", ")
            ));
        }

        Ok(AgentOutput {
            agent_id: self.id().to_string(),
            agent_name: self.name.clone(),
            layer: AgentLayer::Layer3FundManager,
            timestamp: Utc::now(),
            picks,
            reasoning,
            usage: completion.usage,
            model: Some(completion.model),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::pick;

    #[test]
    fn clamp_truncates_extras() {
        let picks = vec![
            pick("NVDA", 90.0),
            pick("MSFT", 85.0),
            pick("GOOGL", 80.0),
            pick("AMD", 75.0),
        ];
        let clamped = clamp_top3("fund_manager", picks);
        assert_eq!(clamped.len(), 3);
        assert_eq!(clamped[2].ticker, "GOOGL");
    }

    #[test]
    fn clamp_passes_short_lists_through() {
        let picks = vec![pick("NVDA", 90.0)];
        let clamped = clamp_top3("fund_manager", picks);
        assert_eq!(clamped.len(), 1);
    }
}
