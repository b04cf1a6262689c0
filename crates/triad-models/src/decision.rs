use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pick::{AgentLayer, StockPick, TokenUsage};

/// The CEO's verdict for one Top-3 position: carry the previous pick forward
/// or accept the newly proposed one. Uppercase on the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CeoVerdict {
    #[serde(rename = "KEEP")]
    Keep,
    #[serde(rename = "SWAP")]
    Swap,
}

/// One position's KEEP/SWAP record, created fresh each iteration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CeoDecision {
    /// Position number, 1-3.
    pub position: u8,
    /// Previous iteration's pick at this position. None on iteration 1.
    pub previous_pick: Option<StockPick>,
    /// The fund manager's proposal for this position. None only when the
    /// synthesis layer returned fewer than 3 picks.
    pub proposed_pick: Option<StockPick>,
    pub verdict: CeoVerdict,
    pub rationale: String,
    pub final_pick: StockPick,
}

/// The CEO layer's full result for one iteration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CeoOutput {
    pub agent_id: String,
    pub agent_name: String,
    pub layer: AgentLayer,
    pub timestamp: DateTime<Utc>,
    pub decisions: Vec<CeoDecision>,
    pub final_top3: Vec<StockPick>,
    /// Fraction of positions kept, 0.0 on iteration 1.
    pub stability_score: f64,
    pub loop_number: u32,
    #[serde(default)]
    pub usage: TokenUsage,
    #[serde(default)]
    pub model: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pick(ticker: &str, score: f64) -> StockPick {
        StockPick {
            ticker: ticker.to_string(),
            company_name: ticker.to_string(),
            conviction_score: score,
            thesis: "test".to_string(),
            key_risks: vec![],
            catalysts: vec![],
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
    fn verdict_wire_form_is_uppercase() {
        assert_eq!(serde_json::to_string(&CeoVerdict::Keep).unwrap(), "\"KEEP\"");
        assert_eq!(serde_json::to_string(&CeoVerdict::Swap).unwrap(), "\"SWAP\"");
        let parsed: CeoVerdict = serde_json::from_str("\"SWAP\"").unwrap();
        assert_eq!(parsed, CeoVerdict::Swap);
    }

    #[test]
    fn roundtrip_ceo_output() {
        let proposed = pick("NVDA", 90.0);
        let output = CeoOutput {
            agent_id: "ceo".to_string(),
            agent_name: "Robert Hayes".to_string(),
            layer: AgentLayer::Layer4Ceo,
            timestamp: Utc::now(),
            decisions: vec![CeoDecision {
                position: 1,
                previous_pick: None,
                proposed_pick: Some(proposed.clone()),
                verdict: CeoVerdict::Swap,
                rationale: "First loop - establishing baseline positions.".to_string(),
                final_pick: proposed.clone(),
            }],
            final_top3: vec![proposed],
            stability_score: 0.0,
            loop_number: 1,
            usage: TokenUsage::default(),
            model: None,
        };

        let json = serde_json::to_string(&output).unwrap();
        let deserialized: CeoOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(output, deserialized);
    }
}
