//! Mock agents for exercising the pipeline without the Claude CLI.
//!
//! `ScriptedAnalyst` replays a per-iteration script of pick lists, which
//! lets tests steer the loop toward (or away from) each convergence
//! criterion. `AcceptAllCeo` applies the deterministic decision-resolution
//! helpers without a model call.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use triad_models::{AgentLayer, AgentOutput, CeoOutput, CeoVerdict, OversightItem, ResearchPayload,
    StockPick, TokenUsage};

use crate::analyst::ResearchAgent;
use crate::error::AgentError;
use crate::oversight::{baseline_output, resolve_decisions, stability_score, OversightAgent};
use crate::registry::AgentRoster;

/// Minimal pick builder.
pub fn pick(ticker: &str, score: f64) -> StockPick {
    StockPick {
        ticker: ticker.to_string(),
        company_name: format!("{ticker} Inc."),
        conviction_score: score,
        thesis: format!("Scripted thesis for {ticker}"),
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

/// An analyst that replays a script of pick lists, one entry per `analyze`
/// call. When the script runs out, the last entry repeats, which is the
/// easiest way to let a run settle into convergence.
pub struct ScriptedAnalyst {
    pub id: String,
    pub name: String,
    pub layer: AgentLayer,
    pub coverage: Vec<String>,
    script: Mutex<VecDeque<Vec<StockPick>>>,
    last: Mutex<Vec<StockPick>>,
    fail: bool,
}

impl ScriptedAnalyst {
    pub fn new(id: &str, layer: AgentLayer, script: Vec<Vec<StockPick>>) -> Self {
        Self {
            id: id.to_string(),
            name: format!("Scripted {id}"),
            layer,
            coverage: Vec::new(),
            script: Mutex::new(script.into()),
            last: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn with_coverage(mut self, coverage: &[&str]) -> Self {
        self.coverage = coverage.iter().map(|s| s.to_string()).collect();
        self
    }

    /// An analyst whose `analyze` always fails.
    pub fn failing(id: &str, layer: AgentLayer) -> Self {
        let mut analyst = Self::new(id, layer, vec![]);
        analyst.fail = true;
        analyst
    }
}

#[async_trait]
impl ResearchAgent for ScriptedAnalyst {
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

    async fn analyze(&self, _payload: &ResearchPayload) -> Result<AgentOutput, AgentError> {
        if self.fail {
            return Err(AgentError::Cli("scripted failure".to_string()));
        }

        let picks = {
            let mut script = self.script.lock().await;
            match script.pop_front() {
                Some(picks) => {
                    *self.last.lock().await = picks.clone();
                    picks
                }
                None => self.last.lock().await.clone(),
            }
        };

        Ok(AgentOutput {
            agent_id: self.id.clone(),
            agent_name: self.name.clone(),
            layer: self.layer,
            timestamp: Utc::now(),
            picks,
            reasoning: format!("Scripted output from {}", self.id),
            usage: TokenUsage::new(100, 40),
            model: Some("scripted".to_string()),
        })
    }
}

/// An oversight agent that always accepts the proposal. Verdicts are KEEP
/// when the proposed ticker matches the previous one at that position, SWAP
/// otherwise, resolved through the same pure helpers the real CEO uses.
pub struct AcceptAllCeo {
    history: Mutex<Vec<CeoOutput>>,
}

impl AcceptAllCeo {
    pub fn new() -> Self {
        Self {
            history: Mutex::new(Vec::new()),
        }
    }

    pub async fn decision_history(&self) -> Vec<CeoOutput> {
        self.history.lock().await.clone()
    }
}

impl Default for AcceptAllCeo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OversightAgent for AcceptAllCeo {
    fn id(&self) -> &str {
        "ceo"
    }

    fn name(&self) -> &str {
        "Scripted CEO"
    }

    async fn review(
        &self,
        previous: Option<&[StockPick]>,
        proposed: &[StockPick],
        loop_number: u32,
    ) -> Result<CeoOutput, AgentError> {
        let Some(previous) = previous.filter(|p| !p.is_empty() && loop_number > 1) else {
            let output = baseline_output(self.id(), self.name(), proposed, loop_number);
            self.history.lock().await.push(output.clone());
            return Ok(output);
        };

        let items: Vec<OversightItem> = proposed
            .iter()
            .take(3)
            .enumerate()
            .map(|(i, pick)| OversightItem {
                position: (i + 1) as u8,
                decision: if previous.get(i).map(|p| p.ticker.as_str()) == Some(pick.ticker.as_str()) {
                    CeoVerdict::Keep
                } else {
                    CeoVerdict::Swap
                },
                rationale: "accept-all".to_string(),
            })
            .collect();

        let (decisions, final_picks) = resolve_decisions(previous, proposed, &items);
        let stability = stability_score(&decisions);

        let output = CeoOutput {
            agent_id: self.id().to_string(),
            agent_name: self.name().to_string(),
            layer: AgentLayer::Layer4Ceo,
            timestamp: Utc::now(),
            decisions,
            final_top3: final_picks,
            stability_score: stability,
            loop_number,
            usage: TokenUsage::default(),
            model: None,
        };
        self.history.lock().await.push(output.clone());
        Ok(output)
    }

    async fn reset(&self) {
        self.history.lock().await.clear();
    }
}

/// A fixed roster of pre-built agents.
pub struct StaticRoster {
    pub layer1: Vec<Arc<dyn ResearchAgent>>,
    pub layer2: Vec<Arc<dyn ResearchAgent>>,
    pub fund_manager: Arc<dyn ResearchAgent>,
    pub ceo: Arc<dyn OversightAgent>,
}

impl AgentRoster for StaticRoster {
    fn layer1_agents(&self) -> Vec<Arc<dyn ResearchAgent>> {
        self.layer1.clone()
    }

    fn layer2_agents(&self) -> Vec<Arc<dyn ResearchAgent>> {
        self.layer2.clone()
    }

    fn fund_manager(&self) -> Arc<dyn ResearchAgent> {
        Arc::clone(&self.fund_manager)
    }

    fn ceo(&self) -> Arc<dyn OversightAgent> {
        Arc::clone(&self.ceo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn empty_payload() -> ResearchPayload {
        ResearchPayload {
            companies: BTreeMap::new(),
            market_context: String::new(),
            upstream: vec![],
        }
    }

    #[tokio::test]
    async fn scripted_analyst_replays_then_repeats() {
        let analyst = ScriptedAnalyst::new(
            "alpha",
            AgentLayer::Layer1Primary,
            vec![vec![pick("NVDA", 90.0)], vec![pick("AMD", 70.0)]],
        );

        let first = analyst.analyze(&empty_payload()).await.unwrap();
        let second = analyst.analyze(&empty_payload()).await.unwrap();
        let third = analyst.analyze(&empty_payload()).await.unwrap();

        assert_eq!(first.picks[0].ticker, "NVDA");
        assert_eq!(second.picks[0].ticker, "AMD");
        assert_eq!(third.picks[0].ticker, "AMD");
    }

    #[tokio::test]
    async fn failing_analyst_errors() {
        let analyst = ScriptedAnalyst::failing("broken", AgentLayer::Layer1Primary);
        assert!(analyst.analyze(&empty_payload()).await.is_err());
    }

    #[tokio::test]
    async fn accept_all_ceo_keeps_matching_positions() {
        let ceo = AcceptAllCeo::new();
        let previous = vec![pick("NVDA", 90.0), pick("MSFT", 85.0), pick("GOOGL", 80.0)];
        let proposed = vec![pick("NVDA", 91.0), pick("AMZN", 84.0), pick("GOOGL", 79.0)];

        let output = ceo.review(Some(&previous), &proposed, 2).await.unwrap();

        assert_eq!(output.decisions[0].verdict, CeoVerdict::Keep);
        assert_eq!(output.decisions[1].verdict, CeoVerdict::Swap);
        assert_eq!(output.decisions[2].verdict, CeoVerdict::Keep);
        // Kept positions carry the previous pick objects forward.
        assert!((output.final_top3[0].conviction_score - 90.0).abs() < f64::EPSILON);
        assert_eq!(output.final_top3[1].ticker, "AMZN");
        assert!((output.stability_score - 2.0 / 3.0).abs() < 1e-9);
    }
}
