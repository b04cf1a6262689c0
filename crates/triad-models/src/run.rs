use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decision::CeoDecision;
use crate::pick::{StockPick, TokenUsage};

/// Why the convergence check fired (or didn't).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceReason {
    NotConverged,
    PerfectMatch,
    SetStability,
    ScoreConvergence,
    MaxLoops,
}

/// Result of one convergence check. Recomputed fresh on every check; the
/// loop controller decides whether to persist it on the run record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConvergenceResult {
    pub converged: bool,
    pub reason: ConvergenceReason,
    /// Reason-specific detail: matched tickers, score deltas, or progress
    /// counters for the not-converged case.
    pub details: serde_json::Value,
    pub loop_number: u32,
}

/// Persisted record of one full layer-sequence pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoopIteration {
    pub loop_number: u32,
    pub timestamp: DateTime<Utc>,
    /// Picks per layer-1 agent, keyed by agent id.
    pub layer1_picks: BTreeMap<String, Vec<StockPick>>,
    /// Picks per layer-2 agent, keyed by agent id.
    pub layer2_picks: BTreeMap<String, Vec<StockPick>>,
    pub proposed_top3: Vec<StockPick>,
    pub final_top3: Vec<StockPick>,
    pub ceo_decisions: Vec<CeoDecision>,
    pub stability_score: f64,
    pub duration_seconds: f64,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

/// Aggregate root for one end-to-end research run. Created at run start,
/// appended to on every iteration, finalized exactly once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResearchRun {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub iterations: Vec<LoopIteration>,
    pub convergence: Option<ConvergenceResult>,
    /// Copy of the last iteration's final Top-3.
    pub final_picks: Vec<StockPick>,
    pub total_duration_seconds: f64,
    pub total_usage: TokenUsage,
    pub status: RunStatus,
}

impl ResearchRun {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            started_at: Utc::now(),
            completed_at: None,
            iterations: Vec::new(),
            convergence: None,
            final_picks: Vec::new(),
            total_duration_seconds: 0.0,
            total_usage: TokenUsage::default(),
            status: RunStatus::Running,
        }
    }
}
