use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which stage of the research pipeline an agent belongs to.
///
/// Layer identity is a plain field on outputs, not a type hierarchy:
/// the same agent implementation can serve layer 1 or layer 2 depending
/// on how the roster configures it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentLayer {
    Layer1Primary,
    Layer2Secondary,
    Layer3FundManager,
    Layer4Ceo,
}

/// A single stock recommendation.
///
/// Immutable once emitted by an agent; later layers copy it forward,
/// optionally stamping their specialty scores.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockPick {
    pub ticker: String,
    pub company_name: String,
    /// Conviction 0-100.
    pub conviction_score: f64,
    pub thesis: String,
    #[serde(default)]
    pub key_risks: Vec<String>,
    #[serde(default)]
    pub catalysts: Vec<String>,
    #[serde(default)]
    pub target_price_rationale: Option<String>,

    // Layer 2 scoring (absent on layer 1 picks)
    #[serde(default)]
    pub fundamental_score: Option<f64>,
    #[serde(default)]
    pub technical_score: Option<f64>,
    #[serde(default)]
    pub risk_score: Option<f64>,
    #[serde(default)]
    pub valuation_summary: Option<String>,
    /// Suggested position size as a percentage of the book (1-5).
    #[serde(default)]
    pub position_size_recommendation: Option<f64>,
    #[serde(default)]
    pub bear_case: Option<String>,
}

/// Token accounting for a single model call or an accumulated total.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }

    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }
}

/// One agent's result for one layer in one iteration. Never mutated after
/// creation; a failed agent is represented by an output with empty picks and
/// the error text in `reasoning`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentOutput {
    pub agent_id: String,
    pub agent_name: String,
    pub layer: AgentLayer,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub picks: Vec<StockPick>,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub usage: TokenUsage,
    #[serde(default)]
    pub model: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pick(ticker: &str, score: f64) -> StockPick {
        StockPick {
            ticker: ticker.to_string(),
            company_name: format!("{ticker} Inc."),
            conviction_score: score,
            thesis: "Durable AI infrastructure demand".to_string(),
            key_risks: vec!["Valuation".to_string()],
            catalysts: vec!["Next earnings".to_string()],
            target_price_rationale: None,
            fundamental_score: None,
            technical_score: None,
            risk_score: None,
            valuation_summary: None,
            position_size_recommendation: None,
            bear_case: None,
        }
    }

    #[test]
    fn roundtrip_agent_output() {
        let output = AgentOutput {
            agent_id: "alpha".to_string(),
            agent_name: "Elena Vasquez".to_string(),
            layer: AgentLayer::Layer1Primary,
            timestamp: Utc::now(),
            picks: vec![sample_pick("NVDA", 88.0), sample_pick("AVGO", 74.5)],
            reasoning: "Semis screen strongest on capex visibility".to_string(),
            usage: TokenUsage::new(1200, 640),
            model: Some("claude-3-5-haiku-latest".to_string()),
        };

        let json = serde_json::to_string(&output).unwrap();
        let deserialized: AgentOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(output, deserialized);
    }

    #[test]
    fn pick_parses_without_optional_fields() {
        let json = r#"{
            "ticker": "MSFT",
            "company_name": "Microsoft",
            "conviction_score": 82,
            "thesis": "Azure AI monetization"
        }"#;

        let pick: StockPick = serde_json::from_str(json).unwrap();
        assert_eq!(pick.ticker, "MSFT");
        assert!(pick.key_risks.is_empty());
        assert!(pick.fundamental_score.is_none());
    }

    #[test]
    fn layer_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&AgentLayer::Layer3FundManager).unwrap(),
            "\"layer3_fund_manager\""
        );
    }

    #[test]
    fn token_usage_accumulates() {
        let mut total = TokenUsage::default();
        total.add(TokenUsage::new(100, 50));
        total.add(TokenUsage::new(u64::MAX, 1));
        assert_eq!(total.output_tokens, 51);
        assert_eq!(total.input_tokens, u64::MAX);
        assert_eq!(total.total(), u64::MAX);
    }
}
