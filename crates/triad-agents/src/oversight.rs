use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::warn;
use triad_models::{
    AgentLayer, CeoDecision, CeoOutput, CeoVerdict, OversightItem, OversightResponse, StockPick,
    TokenUsage,
};

use crate::claude_cli::{invoke_claude, ClaudeCliConfig};
use crate::error::AgentError;
use crate::parser::parse_structured;
use crate::prompts;

/// Capability of the oversight (CEO) layer. Mockable for testing.
#[async_trait]
pub trait OversightAgent: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;

    /// Review the proposed Top-3 against the previous iteration's and emit
    /// per-position KEEP/SWAP verdicts. `previous` is None on iteration 1.
    async fn review(
        &self,
        previous: Option<&[StockPick]>,
        proposed: &[StockPick],
        loop_number: u32,
    ) -> Result<CeoOutput, AgentError>;

    /// Clear per-run decision history. Called once at run start.
    async fn reset(&self);
}

/// Iteration-1 output: no previous state exists, so every position is forced
/// to SWAP and stability is fixed at 0. No model call is made.
pub fn baseline_output(
    agent_id: &str,
    agent_name: &str,
    proposed: &[StockPick],
    loop_number: u32,
) -> CeoOutput {
    let decisions: Vec<CeoDecision> = proposed
        .iter()
        .take(3)
        .enumerate()
        .map(|(i, pick)| CeoDecision {
            position: (i + 1) as u8,
            previous_pick: None,
            proposed_pick: Some(pick.clone()),
            verdict: CeoVerdict::Swap,
            rationale: "First loop - establishing baseline positions.".to_string(),
            final_pick: pick.clone(),
        })
        .collect();

    let final_top3: Vec<StockPick> = proposed.iter().take(3).cloned().collect();

    CeoOutput {
        agent_id: agent_id.to_string(),
        agent_name: agent_name.to_string(),
        layer: AgentLayer::Layer4Ceo,
        timestamp: Utc::now(),
        decisions,
        final_top3,
        stability_score: 0.0,
        loop_number,
        usage: TokenUsage::default(),
        model: None,
    }
}

/// Resolve the model's per-position verdicts into concrete decisions and the
/// resulting final Top-3. KEEP carries the previous pick forward, SWAP takes
/// the proposed one; either side missing falls back to the other. A position
/// with neither side is dropped with a warning (degraded upstream layers).
pub fn resolve_decisions(
    previous: &[StockPick],
    proposed: &[StockPick],
    items: &[OversightItem],
) -> (Vec<CeoDecision>, Vec<StockPick>) {
    let mut decisions = Vec::new();
    let mut final_picks = Vec::new();

    for (i, item) in items.iter().take(3).enumerate() {
        let position = if (1..=3).contains(&item.position) {
            item.position
        } else {
            (i + 1) as u8
        };

        let prev_pick = previous.get(i).cloned();
        let prop_pick = proposed.get(i).cloned();

        let final_pick = match (item.decision, &prev_pick, &prop_pick) {
            (CeoVerdict::Keep, Some(prev), _) => prev.clone(),
            (_, _, Some(prop)) => prop.clone(),
            (_, Some(prev), None) => prev.clone(),
            (_, None, None) => {
                warn!(position, "No pick available on either side; dropping position");
                continue;
            }
        };

        decisions.push(CeoDecision {
            position,
            previous_pick: prev_pick,
            proposed_pick: prop_pick,
            verdict: item.decision,
            rationale: item.rationale.clone(),
            final_pick: final_pick.clone(),
        });
        final_picks.push(final_pick);
    }

    (decisions, final_picks)
}

/// Fraction of positions kept. 0.0 for an empty decision list.
pub fn stability_score(decisions: &[CeoDecision]) -> f64 {
    if decisions.is_empty() {
        return 0.0;
    }
    let kept = decisions
        .iter()
        .filter(|d| d.verdict == CeoVerdict::Keep)
        .count();
    kept as f64 / decisions.len() as f64
}

/// The CEO (layer 4) backed by the Claude CLI. Owns its per-run decision
/// history.
pub struct ClaudeCeo {
    pub name: String,
    pub system_prompt: String,
    pub cli_config: ClaudeCliConfig,
    history: Mutex<Vec<CeoOutput>>,
}

impl ClaudeCeo {
    pub fn new(name: String, system_prompt: String, cli_config: ClaudeCliConfig) -> Self {
        Self {
            name,
            system_prompt,
            cli_config,
            history: Mutex::new(Vec::new()),
        }
    }

    pub async fn decision_history(&self) -> Vec<CeoOutput> {
        self.history.lock().await.clone()
    }

    /// Stability scores by loop, for trend display.
    pub async fn stability_trend(&self) -> Vec<f64> {
        self.history
            .lock()
            .await
            .iter()
            .map(|o| o.stability_score)
            .collect()
    }

    /// Secondary convergence read over the CEO's own decision history.
    ///
    /// Inspection only: the loop is terminated exclusively by the
    /// `ConvergenceDetector` owned by the loop controller. This duplicate
    /// exists so the CEO's view can be compared against the authoritative
    /// one when debugging drift.
    pub async fn convergence_diagnostic(&self) -> serde_json::Value {
        let history = self.history.lock().await;
        diagnostic_over(&history)
    }
}

fn diagnostic_over(history: &[CeoOutput]) -> serde_json::Value {
    const PERFECT_MATCH_LOOPS: usize = 2;
    const SET_STABILITY_LOOPS: usize = 3;
    const SCORE_DELTA_LIMIT: f64 = 5.0;

    if history.len() < 2 {
        return serde_json::json!({ "converged": false, "reason": "not enough loops" });
    }

    if history.len() >= PERFECT_MATCH_LOOPS {
        let recent = &history[history.len() - PERFECT_MATCH_LOOPS..];
        let first: Vec<&str> = recent[0].final_top3.iter().map(|p| p.ticker.as_str()).collect();
        if recent
            .iter()
            .all(|o| o.final_top3.iter().map(|p| p.ticker.as_str()).collect::<Vec<_>>() == first)
        {
            return serde_json::json!({
                "converged": true,
                "reason": "perfect_match",
                "tickers": first,
            });
        }
    }

    if history.len() >= SET_STABILITY_LOOPS {
        let recent = &history[history.len() - SET_STABILITY_LOOPS..];
        let first_set = sorted_tickers(&recent[0]);
        if recent.iter().all(|o| sorted_tickers(o) == first_set) {
            return serde_json::json!({
                "converged": true,
                "reason": "set_stability",
                "tickers": first_set,
            });
        }
    }

    let last = &history[history.len() - 1];
    let prev = &history[history.len() - 2];
    let mut max_delta = 0.0_f64;
    for (i, pick) in last.final_top3.iter().enumerate() {
        if let Some(prev_pick) = prev.final_top3.get(i) {
            max_delta = max_delta.max((pick.conviction_score - prev_pick.conviction_score).abs());
        }
    }
    if max_delta < SCORE_DELTA_LIMIT {
        return serde_json::json!({
            "converged": true,
            "reason": "score_convergence",
            "max_delta": max_delta,
        });
    }

    serde_json::json!({ "converged": false, "reason": "not_converged" })
}

fn sorted_tickers(output: &CeoOutput) -> Vec<String> {
    let mut tickers: Vec<String> = output
        .final_top3
        .iter()
        .map(|p| p.ticker.clone())
        .collect();
    tickers.sort();
    tickers
}

#[async_trait]
impl OversightAgent for ClaudeCeo {
    fn id(&self) -> &str {
        "ceo"
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn review(
        &self,
        previous: Option<&[StockPick]>,
        proposed: &[StockPick],
        loop_number: u32,
    ) -> Result<CeoOutput, AgentError> {
        let Some(previous) = previous.filter(|p| !p.is_empty() && loop_number > 1) else {
            let output = baseline_output(self.id(), &self.name, proposed, loop_number);
            self.history.lock().await.push(output.clone());
            return Ok(output);
        };

        let user_prompt = prompts::oversight_request(previous, proposed, loop_number);
        let completion = invoke_claude(&self.system_prompt, &user_prompt, &self.cli_config).await?;
        let parsed: OversightResponse = parse_structured(&completion.text)?;

        let (decisions, final_picks) = resolve_decisions(previous, proposed, &parsed.decisions);
        let stability = stability_score(&decisions);

        let output = CeoOutput {
            agent_id: self.id().to_string(),
            agent_name: self.name.clone(),
            layer: AgentLayer::Layer4Ceo,
            timestamp: Utc::now(),
            decisions,
            final_top3: final_picks,
            stability_score: stability,
            loop_number,
            usage: completion.usage,
            model: Some(completion.model),
        };
        self.history.lock().await.push(output.clone());

        Ok(output)
    }

    async fn reset(&self) {
        self.history.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::pick;

    fn item(position: u8, decision: CeoVerdict) -> OversightItem {
        OversightItem {
            position,
            decision,
            rationale: "test".to_string(),
        }
    }

    #[test]
    fn baseline_forces_swap_with_zero_stability() {
        let proposed = vec![pick("NVDA", 90.0), pick("MSFT", 85.0), pick("GOOGL", 80.0)];
        let output = baseline_output("ceo", "Robert Hayes", &proposed, 1);

        assert_eq!(output.decisions.len(), 3);
        assert!(output
            .decisions
            .iter()
            .all(|d| d.verdict == CeoVerdict::Swap));
        assert!(output
            .decisions
            .iter()
            .all(|d| d.rationale.contains("baseline")));
        assert!((output.stability_score - 0.0).abs() < f64::EPSILON);
        assert_eq!(output.final_top3.len(), 3);
        assert_eq!(output.loop_number, 1);
    }

    #[test]
    fn baseline_truncates_overlong_proposals() {
        let proposed = vec![
            pick("NVDA", 90.0),
            pick("MSFT", 85.0),
            pick("GOOGL", 80.0),
            pick("AMD", 75.0),
        ];
        let output = baseline_output("ceo", "Robert Hayes", &proposed, 1);
        assert_eq!(output.final_top3.len(), 3);
    }

    #[test]
    fn keep_carries_previous_pick_forward() {
        let previous = vec![pick("NVDA", 90.0), pick("MSFT", 85.0), pick("GOOGL", 80.0)];
        let proposed = vec![pick("NVDA", 92.0), pick("AMZN", 88.0), pick("GOOGL", 81.0)];
        let items = vec![
            item(1, CeoVerdict::Keep),
            item(2, CeoVerdict::Swap),
            item(3, CeoVerdict::Keep),
        ];

        let (decisions, finals) = resolve_decisions(&previous, &proposed, &items);

        assert_eq!(decisions.len(), 3);
        // KEEP at position 1 retains the previous pick object (score 90).
        assert!((finals[0].conviction_score - 90.0).abs() < f64::EPSILON);
        // SWAP at position 2 takes the proposal.
        assert_eq!(finals[1].ticker, "AMZN");
        assert!((stability_score(&decisions) - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn swap_falls_back_to_previous_when_proposal_missing() {
        let previous = vec![pick("NVDA", 90.0), pick("MSFT", 85.0)];
        let proposed = vec![pick("NVDA", 92.0)];
        let items = vec![item(1, CeoVerdict::Swap), item(2, CeoVerdict::Swap)];

        let (decisions, finals) = resolve_decisions(&previous, &proposed, &items);

        assert_eq!(decisions.len(), 2);
        assert_eq!(finals[1].ticker, "MSFT");
    }

    #[test]
    fn out_of_range_position_is_reindexed() {
        let previous = vec![pick("NVDA", 90.0)];
        let proposed = vec![pick("AMD", 70.0)];
        let items = vec![item(9, CeoVerdict::Swap)];

        let (decisions, _) = resolve_decisions(&previous, &proposed, &items);
        assert_eq!(decisions[0].position, 1);
    }

    #[test]
    fn stability_of_empty_decisions_is_zero() {
        assert!((stability_score(&[]) - 0.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn ceo_history_resets() {
        let ceo = ClaudeCeo::new(
            "Robert Hayes".to_string(),
            "prompt".to_string(),
            ClaudeCliConfig::default(),
        );
        let proposed = vec![pick("NVDA", 90.0)];
        // Iteration 1 takes the deterministic baseline path (no CLI).
        ceo.review(None, &proposed, 1).await.unwrap();
        assert_eq!(ceo.decision_history().await.len(), 1);
        assert_eq!(ceo.stability_trend().await, vec![0.0]);

        ceo.reset().await;
        assert!(ceo.decision_history().await.is_empty());
    }

    #[tokio::test]
    async fn diagnostic_detects_perfect_match() {
        let ceo = ClaudeCeo::new(
            "Robert Hayes".to_string(),
            "prompt".to_string(),
            ClaudeCliConfig::default(),
        );
        let proposed = vec![pick("NVDA", 90.0), pick("MSFT", 85.0), pick("GOOGL", 80.0)];
        // Two baseline-path reviews with identical picks (previous=None keeps
        // the deterministic path so no CLI call happens).
        ceo.review(None, &proposed, 1).await.unwrap();
        ceo.review(None, &proposed, 1).await.unwrap();

        let diagnostic = ceo.convergence_diagnostic().await;
        assert_eq!(diagnostic["converged"], serde_json::json!(true));
        assert_eq!(diagnostic["reason"], serde_json::json!("perfect_match"));
    }

    #[tokio::test]
    async fn diagnostic_needs_two_loops() {
        let ceo = ClaudeCeo::new(
            "Robert Hayes".to_string(),
            "prompt".to_string(),
            ClaudeCliConfig::default(),
        );
        let diagnostic = ceo.convergence_diagnostic().await;
        assert_eq!(diagnostic["converged"], serde_json::json!(false));
    }
}
