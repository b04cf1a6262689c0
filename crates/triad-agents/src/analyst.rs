use async_trait::async_trait;
use chrono::Utc;
use triad_models::{AgentLayer, AgentOutput, PicksResponse, ResearchPayload, Specialty, StockPick};

use crate::claude_cli::{invoke_claude, ClaudeCliConfig};
use crate::error::AgentError;
use crate::parser::parse_structured;
use crate::prompts;

/// Number of picks an analyst is asked for per pass.
const PICKS_PER_CALL: usize = 5;

/// Capability of every picks-producing agent (layers 1-3).
/// Mockable for testing.
#[async_trait]
pub trait ResearchAgent: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn layer(&self) -> AgentLayer;

    /// Tickers this agent wants fetched in layer 1. Empty for other layers,
    /// which receive their candidate universe from upstream output.
    fn coverage(&self) -> &[String] {
        &[]
    }

    async fn analyze(&self, payload: &ResearchPayload) -> Result<AgentOutput, AgentError>;
}

/// A layer-1 or layer-2 analyst backed by the Claude CLI.
pub struct ClaudeAnalyst {
    pub id: String,
    pub name: String,
    pub layer: AgentLayer,
    pub system_prompt: String,
    pub coverage: Vec<String>,
    pub specialty: Option<Specialty>,
    pub cli_config: ClaudeCliConfig,
}

impl ClaudeAnalyst {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        name: String,
        layer: AgentLayer,
        system_prompt: String,
        coverage: Vec<String>,
        specialty: Option<Specialty>,
        cli_config: ClaudeCliConfig,
    ) -> Self {
        Self {
            id,
            name,
            layer,
            system_prompt,
            coverage,
            specialty,
            cli_config,
        }
    }
}

/// Stamp a layer-2 analyst's conviction into its specialty score slot.
pub fn apply_specialty(picks: &mut [StockPick], specialty: Option<Specialty>) {
    let Some(specialty) = specialty else {
        return;
    };
    for pick in picks {
        match specialty {
            Specialty::Fundamental => pick.fundamental_score = Some(pick.conviction_score),
            Specialty::Technical => pick.technical_score = Some(pick.conviction_score),
            Specialty::Risk => pick.risk_score = Some(pick.conviction_score),
        }
    }
}

#[async_trait]
impl ResearchAgent for ClaudeAnalyst {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn layer(&self) -> AgentLayer {
        self.layer
    }

    fn coverage(&self) -> &[String] {
        &self.coverage
    }

    async fn analyze(&self, payload: &ResearchPayload) -> Result<AgentOutput, AgentError> {
        let user_prompt = prompts::picks_request(payload, PICKS_PER_CALL);
        let completion = invoke_claude(&self.system_prompt, &user_prompt, &self.cli_config).await?;
        let parsed: PicksResponse = parse_structured(&completion.text)?;

        let mut picks = parsed.picks;
        apply_specialty(&mut picks, self.specialty);

        let reasoning = if parsed.reasoning.is_empty() {
            format!("Analysis based on {} companies.", payload.companies.len())
        } else {
            parsed.reasoning
        };

        Ok(AgentOutput {
            agent_id: self.id.clone(),
            agent_name: self.name.clone(),
            layer: self.layer,
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
    fn specialty_stamps_matching_score() {
        let mut picks = vec![pick("NVDA", 88.0), pick("AMD", 72.0)];
        apply_specialty(&mut picks, Some(Specialty::Technical));

        assert_eq!(picks[0].technical_score, Some(88.0));
        assert_eq!(picks[1].technical_score, Some(72.0));
        assert!(picks[0].fundamental_score.is_none());
        assert!(picks[0].risk_score.is_none());
    }

    #[test]
    fn no_specialty_leaves_picks_untouched() {
        let mut picks = vec![pick("NVDA", 88.0)];
        apply_specialty(&mut picks, None);
        assert!(picks[0].fundamental_score.is_none());
        assert!(picks[0].technical_score.is_none());
        assert!(picks[0].risk_score.is_none());
    }

    #[test]
    fn coverage_defaults_to_empty() {
        struct Bare;

        #[async_trait]
        impl ResearchAgent for Bare {
            fn id(&self) -> &str {
                "bare"
            }
            fn name(&self) -> &str {
                "Bare"
            }
            fn layer(&self) -> AgentLayer {
                AgentLayer::Layer2Secondary
            }
            async fn analyze(
                &self,
                _payload: &ResearchPayload,
            ) -> Result<AgentOutput, AgentError> {
                Err(AgentError::Cli("unused".to_string()))
            }
        }

        assert!(Bare.coverage().is_empty());
    }
}
