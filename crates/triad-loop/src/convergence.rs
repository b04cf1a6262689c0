use std::collections::BTreeMap;

use triad_models::{ConvergenceConfig, ConvergenceReason, ConvergenceResult, StockPick};

/// Ticker + score slice of a pick; all the detector needs to remember.
#[derive(Debug, Clone, PartialEq)]
struct PickSnapshot {
    ticker: String,
    conviction_score: f64,
}

/// Decides when the research loop has converged.
///
/// Pure and total: `check` never fails, and without an intervening
/// `add_result` it returns the same answer every time. Each research run
/// owns its own detector instance.
///
/// Evaluation order is load-bearing: the max-loops ceiling dominates every
/// heuristic (termination guarantee), then perfect match, then set
/// stability, then score convergence.
pub struct ConvergenceDetector {
    config: ConvergenceConfig,
    history: Vec<Vec<PickSnapshot>>,
}

impl ConvergenceDetector {
    pub fn new(config: ConvergenceConfig) -> Self {
        Self {
            config,
            history: Vec::new(),
        }
    }

    /// Record one iteration's final Top-3. Must be called exactly once per
    /// iteration, before `check`.
    pub fn add_result(&mut self, top3: &[StockPick]) {
        self.history.push(
            top3.iter()
                .map(|p| PickSnapshot {
                    ticker: p.ticker.clone(),
                    conviction_score: p.conviction_score,
                })
                .collect(),
        );
    }

    pub fn check(&self) -> ConvergenceResult {
        let loop_number = self.history.len() as u32;

        // The hard ceiling dominates every other signal.
        if self.history.len() >= self.config.max_loops as usize {
            return ConvergenceResult {
                converged: true,
                reason: ConvergenceReason::MaxLoops,
                details: serde_json::json!({ "max_loops": self.config.max_loops }),
                loop_number,
            };
        }

        // Need at least 2 loops to compare anything.
        if self.history.len() < 2 {
            return ConvergenceResult {
                converged: false,
                reason: ConvergenceReason::NotConverged,
                details: serde_json::json!({ "message": "Not enough loops" }),
                loop_number,
            };
        }

        // Same tickers in the same order.
        if self.history.len() >= self.config.perfect_match_loops && self.perfect_match() {
            let tickers = self.last_tickers();
            return ConvergenceResult {
                converged: true,
                reason: ConvergenceReason::PerfectMatch,
                details: serde_json::json!({
                    "tickers": tickers,
                    "consecutive_matches": self.config.perfect_match_loops,
                }),
                loop_number,
            };
        }

        // Same ticker set, any order.
        if self.history.len() >= self.config.set_stability_loops && self.set_stability() {
            let mut tickers = self.last_tickers();
            tickers.sort();
            return ConvergenceResult {
                converged: true,
                reason: ConvergenceReason::SetStability,
                details: serde_json::json!({
                    "tickers": tickers,
                    "consecutive_stable": self.config.set_stability_loops,
                }),
                loop_number,
            };
        }

        // Position-indexed score deltas under threshold (deliberately by
        // index, not ticker identity).
        let max_delta = self.max_score_delta();
        if max_delta < self.config.score_threshold * 100.0 {
            return ConvergenceResult {
                converged: true,
                reason: ConvergenceReason::ScoreConvergence,
                details: serde_json::json!({
                    "max_delta": max_delta,
                    "threshold": self.config.score_threshold,
                }),
                loop_number,
            };
        }

        ConvergenceResult {
            converged: false,
            reason: ConvergenceReason::NotConverged,
            details: self.progress(),
            loop_number,
        }
    }

    /// Reset for a new research run.
    pub fn reset(&mut self) {
        self.history.clear();
    }

    pub fn loops_recorded(&self) -> usize {
        self.history.len()
    }

    /// Ticker sequences per recorded loop.
    pub fn ticker_history(&self) -> Vec<Vec<String>> {
        self.history
            .iter()
            .map(|picks| picks.iter().map(|p| p.ticker.clone()).collect())
            .collect()
    }

    /// How often each ticker appeared across all loops.
    pub fn ticker_frequency(&self) -> BTreeMap<String, usize> {
        let mut frequency = BTreeMap::new();
        for picks in &self.history {
            for pick in picks {
                *frequency.entry(pick.ticker.clone()).or_insert(0) += 1;
            }
        }
        frequency
    }

    /// Set overlap between consecutive loops, 0-1 per transition.
    pub fn stability_trend(&self) -> Vec<f64> {
        self.history
            .windows(2)
            .map(|pair| {
                let prev: Vec<&str> = pair[0].iter().map(|p| p.ticker.as_str()).collect();
                let overlap = pair[1]
                    .iter()
                    .filter(|p| prev.contains(&p.ticker.as_str()))
                    .count();
                overlap as f64 / 3.0
            })
            .collect()
    }

    fn last_tickers(&self) -> Vec<String> {
        self.history
            .last()
            .map(|picks| picks.iter().map(|p| p.ticker.clone()).collect())
            .unwrap_or_default()
    }

    fn perfect_match(&self) -> bool {
        let n = self.config.perfect_match_loops;
        if self.history.len() < n {
            return false;
        }
        let recent = &self.history[self.history.len() - n..];
        let first: Vec<&str> = recent[0].iter().map(|p| p.ticker.as_str()).collect();
        recent[1..].iter().all(|picks| {
            picks.iter().map(|p| p.ticker.as_str()).collect::<Vec<_>>() == first
        })
    }

    fn set_stability(&self) -> bool {
        let n = self.config.set_stability_loops;
        if self.history.len() < n {
            return false;
        }
        let recent = &self.history[self.history.len() - n..];
        let first = sorted_tickers(&recent[0]);
        recent[1..].iter().all(|picks| sorted_tickers(picks) == first)
    }

    /// Maximum position-wise score change between the last two loops.
    /// Returns 100 when fewer than 2 loops exist.
    fn max_score_delta(&self) -> f64 {
        if self.history.len() < 2 {
            return 100.0;
        }
        let last = &self.history[self.history.len() - 1];
        let prev = &self.history[self.history.len() - 2];

        let mut max_delta = 0.0_f64;
        for i in 0..last.len().min(prev.len()) {
            let delta = (last[i].conviction_score - prev[i].conviction_score).abs();
            max_delta = max_delta.max(delta);
        }
        max_delta
    }

    /// Progress counters for human-readable "N more stable loops needed"
    /// reporting. Never drives control flow.
    fn progress(&self) -> serde_json::Value {
        let mut progress = serde_json::json!({
            "loops_completed": self.history.len(),
            "max_loops": self.config.max_loops,
        });

        if self.history.len() >= 2 {
            let last_set = sorted_tickers(&self.history[self.history.len() - 1]);
            let mut consecutive_sets = 1;
            for picks in self.history[..self.history.len() - 1].iter().rev() {
                if sorted_tickers(picks) == last_set {
                    consecutive_sets += 1;
                } else {
                    break;
                }
            }

            let last_ordered: Vec<&str> = self.history[self.history.len() - 1]
                .iter()
                .map(|p| p.ticker.as_str())
                .collect();
            let mut consecutive_perfect = 1;
            for picks in self.history[..self.history.len() - 1].iter().rev() {
                let ordered: Vec<&str> = picks.iter().map(|p| p.ticker.as_str()).collect();
                if ordered == last_ordered {
                    consecutive_perfect += 1;
                } else {
                    break;
                }
            }

            let extra = serde_json::json!({
                "consecutive_set_matches": consecutive_sets,
                "set_stability_needed": self.config.set_stability_loops,
                "consecutive_perfect_matches": consecutive_perfect,
                "perfect_match_needed": self.config.perfect_match_loops,
                "last_score_delta": self.max_score_delta(),
                "score_threshold": self.config.score_threshold * 100.0,
            });
            if let (Some(progress_map), Some(extra_map)) =
                (progress.as_object_mut(), extra.as_object())
            {
                for (key, value) in extra_map {
                    progress_map.insert(key.clone(), value.clone());
                }
            }
        }

        progress
    }
}

fn sorted_tickers(picks: &[PickSnapshot]) -> Vec<&str> {
    let mut tickers: Vec<&str> = picks.iter().map(|p| p.ticker.as_str()).collect();
    tickers.sort_unstable();
    tickers
}

#[cfg(test)]
mod tests {
    use super::*;
    use triad_agents::test_support::pick;

    fn detector() -> ConvergenceDetector {
        ConvergenceDetector::new(ConvergenceConfig::default())
    }

    fn top3(entries: &[(&str, f64)]) -> Vec<StockPick> {
        entries.iter().map(|(t, s)| pick(t, *s)).collect()
    }

    #[test]
    fn not_converged_with_empty_history() {
        let result = detector().check();
        assert!(!result.converged);
        assert_eq!(result.reason, ConvergenceReason::NotConverged);
        assert_eq!(result.loop_number, 0);
    }

    #[test]
    fn not_converged_with_single_entry() {
        let mut d = detector();
        d.add_result(&top3(&[("NVDA", 90.0), ("MSFT", 85.0), ("GOOGL", 80.0)]));
        let result = d.check();
        assert!(!result.converged);
        assert_eq!(result.details["message"], "Not enough loops");
    }

    #[test]
    fn perfect_match_after_two_identical_loops() {
        let mut d = detector();
        let picks = top3(&[("NVDA", 90.0), ("MSFT", 85.0), ("GOOGL", 80.0)]);
        d.add_result(&picks);
        d.add_result(&picks);

        let result = d.check();
        assert!(result.converged);
        assert_eq!(result.reason, ConvergenceReason::PerfectMatch);
        assert_eq!(
            result.details["tickers"],
            serde_json::json!(["NVDA", "MSFT", "GOOGL"])
        );
        assert_eq!(result.loop_number, 2);
    }

    #[test]
    fn perfect_match_precedes_set_stability() {
        // Identical ordered sequences also satisfy set stability; the
        // ordering of checks must report perfect_match.
        let mut d = detector();
        let picks = top3(&[("NVDA", 90.0), ("MSFT", 85.0), ("GOOGL", 80.0)]);
        d.add_result(&picks);
        d.add_result(&picks);
        d.add_result(&picks);

        let result = d.check();
        assert_eq!(result.reason, ConvergenceReason::PerfectMatch);
    }

    #[test]
    fn set_stability_with_rotating_order() {
        let mut d = detector();
        d.add_result(&top3(&[("NVDA", 90.0), ("MSFT", 80.0), ("GOOGL", 70.0)]));
        d.add_result(&top3(&[("MSFT", 80.0), ("GOOGL", 70.0), ("NVDA", 90.0)]));
        d.add_result(&top3(&[("GOOGL", 70.0), ("NVDA", 90.0), ("MSFT", 80.0)]));

        let result = d.check();
        assert!(result.converged);
        assert_eq!(result.reason, ConvergenceReason::SetStability);
        assert_eq!(
            result.details["tickers"],
            serde_json::json!(["GOOGL", "MSFT", "NVDA"])
        );
    }

    #[test]
    fn score_convergence_reachable_only_after_stronger_checks_fail() {
        // Disjoint ticker sets rule out perfect match and set stability;
        // per-position deltas of 2/2/1 sit under the 5-point threshold.
        let mut d = detector();
        d.add_result(&top3(&[("AAPL", 80.0), ("AMZN", 70.0), ("META", 60.0)]));
        d.add_result(&top3(&[("NVDA", 82.0), ("MSFT", 68.0), ("GOOGL", 59.0)]));

        let result = d.check();
        assert!(result.converged);
        assert_eq!(result.reason, ConvergenceReason::ScoreConvergence);
        let max_delta = result.details["max_delta"].as_f64().unwrap();
        assert!((max_delta - 2.0).abs() < 1e-9);
    }

    #[test]
    fn score_convergence_compares_by_position_not_ticker() {
        // A swap at position 1 still compares the new score against the old
        // position-1 score.
        let mut d = detector();
        d.add_result(&top3(&[("AAPL", 80.0), ("AMZN", 70.0), ("META", 60.0)]));
        d.add_result(&top3(&[("AMZN", 50.0), ("AAPL", 70.0), ("META", 60.0)]));

        let result = d.check();
        // Position 1 delta is 30, so no score convergence even though each
        // ticker's own score barely moved.
        assert!(!result.converged);
    }

    #[test]
    fn max_loops_dominates_all_other_signals() {
        // History satisfies perfect match AND set stability at exactly
        // max_loops entries; the reported reason must still be max_loops.
        let mut d = detector();
        let picks = top3(&[("NVDA", 90.0), ("MSFT", 85.0), ("GOOGL", 80.0)]);
        for _ in 0..5 {
            d.add_result(&picks);
        }

        let result = d.check();
        assert!(result.converged);
        assert_eq!(result.reason, ConvergenceReason::MaxLoops);
        assert_eq!(result.loop_number, 5);
    }

    #[test]
    fn check_is_a_pure_read() {
        let mut d = detector();
        d.add_result(&top3(&[("NVDA", 90.0), ("MSFT", 85.0), ("GOOGL", 80.0)]));
        d.add_result(&top3(&[("AMD", 50.0), ("INTC", 40.0), ("MU", 30.0)]));

        let first = d.check();
        let second = d.check();
        assert_eq!(first, second);
    }

    #[test]
    fn progress_details_when_not_converged() {
        let mut d = detector();
        d.add_result(&top3(&[("NVDA", 90.0), ("MSFT", 85.0), ("GOOGL", 80.0)]));
        d.add_result(&top3(&[("NVDA", 70.0), ("MSFT", 60.0), ("AMD", 50.0)]));

        let result = d.check();
        assert!(!result.converged);
        assert_eq!(result.details["loops_completed"], 2);
        assert_eq!(result.details["consecutive_set_matches"], 1);
        assert_eq!(result.details["consecutive_perfect_matches"], 1);
        assert!(result.details["last_score_delta"].as_f64().unwrap() > 5.0);
    }

    #[test]
    fn degraded_short_entries_never_panic() {
        let mut d = detector();
        d.add_result(&top3(&[("NVDA", 90.0), ("MSFT", 85.0)]));
        d.add_result(&top3(&[("NVDA", 90.0)]));
        let result = d.check();
        // Min-length comparison: the single shared position matched exactly.
        assert!(result.converged);
        assert_eq!(result.reason, ConvergenceReason::ScoreConvergence);
    }

    #[test]
    fn reset_clears_history() {
        let mut d = detector();
        d.add_result(&top3(&[("NVDA", 90.0), ("MSFT", 85.0), ("GOOGL", 80.0)]));
        d.reset();
        assert_eq!(d.loops_recorded(), 0);
        assert!(!d.check().converged);
    }

    #[test]
    fn ticker_frequency_counts_appearances() {
        let mut d = detector();
        d.add_result(&top3(&[("NVDA", 90.0), ("MSFT", 85.0), ("GOOGL", 80.0)]));
        d.add_result(&top3(&[("NVDA", 88.0), ("AMD", 75.0), ("GOOGL", 79.0)]));

        let frequency = d.ticker_frequency();
        assert_eq!(frequency["NVDA"], 2);
        assert_eq!(frequency["MSFT"], 1);
        assert_eq!(frequency["AMD"], 1);
    }

    #[test]
    fn stability_trend_measures_set_overlap() {
        let mut d = detector();
        d.add_result(&top3(&[("NVDA", 90.0), ("MSFT", 85.0), ("GOOGL", 80.0)]));
        d.add_result(&top3(&[("NVDA", 90.0), ("MSFT", 85.0), ("AMD", 75.0)]));
        d.add_result(&top3(&[("NVDA", 90.0), ("MSFT", 85.0), ("AMD", 75.0)]));

        let trend = d.stability_trend();
        assert_eq!(trend.len(), 2);
        assert!((trend[0] - 2.0 / 3.0).abs() < 1e-9);
        assert!((trend[1] - 1.0).abs() < 1e-9);
    }
}
