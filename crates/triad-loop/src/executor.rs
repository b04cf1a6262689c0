use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{error, info, warn};
use triad_agents::synthesis::clamp_top3;
use triad_agents::{OversightAgent, ResearchAgent};
use triad_data::{data_summary, DataSourceRegistry};
use triad_models::{
    AgentLayer, AgentOutput, CeoOutput, CompanyBrief, ResearchPayload, StockPick,
};

use crate::error::LoopError;

/// Runs one layer at a time: shared payload construction, concurrent agent
/// fan-out, and failure substitution.
///
/// A failing agent never aborts its layer; it degrades to an empty-picks
/// output carrying the error text, so every layer's output list has exactly
/// one entry per agent. The single-agent layers (synthesis, oversight)
/// propagate errors instead - there is nothing to degrade to.
pub struct LayerExecutor {
    data: Arc<DataSourceRegistry>,
}

impl LayerExecutor {
    pub fn new(data: Arc<DataSourceRegistry>) -> Self {
        Self { data }
    }

    /// Layer-1 payload: one batch fetch over the union of the agents'
    /// coverage universes, shared by every agent in the layer.
    pub async fn build_layer1_payload(
        &self,
        agents: &[Arc<dyn ResearchAgent>],
    ) -> Result<ResearchPayload, LoopError> {
        let mut tickers: BTreeSet<String> = BTreeSet::new();
        for agent in agents {
            tickers.extend(agent.coverage().iter().cloned());
        }
        let tickers: Vec<String> = tickers.into_iter().collect();
        info!(
            agents = agents.len(),
            tickers = tickers.len(),
            "Fetching layer-1 data"
        );

        let aggregator = self.data.aggregator().await?;
        let records = aggregator.get_batch_data(&tickers).await;

        let companies: BTreeMap<String, CompanyBrief> = records
            .iter()
            .map(|(ticker, record)| {
                (
                    ticker.clone(),
                    CompanyBrief {
                        summary: data_summary(record),
                        quality: record.quality,
                        financials: None,
                        price: None,
                    },
                )
            })
            .collect();

        Ok(ResearchPayload {
            companies,
            market_context: market_context(),
            upstream: Vec::new(),
        })
    }

    /// Layer-2 payload: the candidate universe is the union of tickers in
    /// layer-1 picks - layer 1 discovers, layer 2 deepens. The payload also
    /// carries the full layer-1 outputs and structured per-company detail.
    pub async fn build_layer2_payload(
        &self,
        layer1_outputs: &[AgentOutput],
    ) -> Result<ResearchPayload, LoopError> {
        let mut candidates: BTreeSet<String> = BTreeSet::new();
        for output in layer1_outputs {
            for pick in &output.picks {
                candidates.insert(pick.ticker.clone());
            }
        }
        let candidates: Vec<String> = candidates.into_iter().collect();
        info!(candidates = candidates.len(), "Layer-2 candidate universe");

        let aggregator = self.data.aggregator().await?;
        let records = aggregator.get_batch_data(&candidates).await;

        let companies: BTreeMap<String, CompanyBrief> = records
            .iter()
            .map(|(ticker, record)| {
                (
                    ticker.clone(),
                    CompanyBrief {
                        summary: data_summary(record),
                        quality: record.quality,
                        financials: record.financials.clone(),
                        price: record.price.clone(),
                    },
                )
            })
            .collect();

        Ok(ResearchPayload {
            companies,
            market_context: market_context(),
            upstream: layer1_outputs.to_vec(),
        })
    }

    /// Run every agent of a multi-agent layer concurrently against the
    /// shared payload. All outcomes are collected; failures (errors and
    /// panics alike) are substituted with placeholder outputs.
    pub async fn run_layer(
        &self,
        agents: &[Arc<dyn ResearchAgent>],
        payload: Arc<ResearchPayload>,
    ) -> Vec<AgentOutput> {
        let mut handles = Vec::new();
        for agent in agents {
            let agent = Arc::clone(agent);
            let payload = Arc::clone(&payload);
            handles.push(tokio::spawn(async move {
                let start = Instant::now();
                let result = agent.analyze(&payload).await;
                (result, start.elapsed())
            }));
        }

        let mut outputs = Vec::new();
        for (agent, handle) in agents.iter().zip(handles) {
            match handle.await {
                Ok((Ok(output), elapsed)) => {
                    info!(
                        agent = %agent.id(),
                        picks = output.picks.len(),
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Agent succeeded"
                    );
                    outputs.push(output);
                }
                Ok((Err(e), elapsed)) => {
                    warn!(
                        agent = %agent.id(),
                        error = %e,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Agent failed"
                    );
                    outputs.push(failure_output(
                        agent.id(),
                        agent.name(),
                        agent.layer(),
                        &e.to_string(),
                    ));
                }
                Err(e) => {
                    error!(agent = %agent.id(), error = %e, "Agent task panicked");
                    outputs.push(failure_output(
                        agent.id(),
                        agent.name(),
                        agent.layer(),
                        &format!("agent task panicked: {e}"),
                    ));
                }
            }
        }

        let total_picks: usize = outputs.iter().map(|o| o.picks.len()).sum();
        info!(agents = outputs.len(), total_picks, "Layer complete");
        outputs
    }

    /// Layer 3: single synthesis agent over the layer-2 outputs. Errors
    /// propagate; the result is clamped to at most 3 picks and tolerated
    /// when shorter (never padded).
    pub async fn execute_synthesis(
        &self,
        fund_manager: &Arc<dyn ResearchAgent>,
        layer2_outputs: &[AgentOutput],
    ) -> Result<AgentOutput, LoopError> {
        info!(agent = %fund_manager.id(), "Executing synthesis layer");
        let payload = ResearchPayload {
            companies: BTreeMap::new(),
            market_context: String::new(),
            upstream: layer2_outputs.to_vec(),
        };

        let mut output = fund_manager.analyze(&payload).await?;
        output.picks = clamp_top3(&output.agent_id, output.picks);

        let tickers: Vec<&str> = output.picks.iter().map(|p| p.ticker.as_str()).collect();
        info!(top3 = ?tickers, "Synthesis complete");
        Ok(output)
    }

    /// Layer 4: single oversight agent reviewing the proposal against the
    /// previous iteration's final Top-3. Errors propagate.
    pub async fn execute_oversight(
        &self,
        ceo: &Arc<dyn OversightAgent>,
        previous: Option<&[StockPick]>,
        proposed: &[StockPick],
        loop_number: u32,
    ) -> Result<CeoOutput, LoopError> {
        info!(agent = %ceo.id(), loop_number, "Executing oversight layer");
        let output = ceo.review(previous, proposed, loop_number).await?;

        let tickers: Vec<&str> = output.final_top3.iter().map(|p| p.ticker.as_str()).collect();
        info!(
            stability = output.stability_score,
            final_top3 = ?tickers,
            "Oversight complete"
        );
        Ok(output)
    }
}

/// Placeholder output for an agent whose `analyze` failed; downstream layers
/// always see a structurally valid object per agent.
fn failure_output(agent_id: &str, agent_name: &str, layer: AgentLayer, error: &str) -> AgentOutput {
    AgentOutput {
        agent_id: agent_id.to_string(),
        agent_name: agent_name.to_string(),
        layer,
        timestamp: Utc::now(),
        picks: Vec::new(),
        reasoning: format!("Error: {error}"),
        usage: Default::default(),
        model: None,
    }
}

fn market_context() -> String {
    format!(
        "Market Context (as of {}):\n\
         - Focus: AI and technology sector analysis\n\
         - Key themes: AI infrastructure, cloud computing, enterprise AI adoption\n\
         - Consider: Recent earnings, guidance, competitive positioning",
        Utc::now().format("%Y-%m-%d")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use triad_agents::test_support::{pick, ScriptedAnalyst};
    use triad_data::SnapshotReader;
    use triad_models::{DataConfig, DataQuality, SnapshotRow};

    fn seeded_registry(tickers: &[&str]) -> Arc<DataSourceRegistry> {
        let reader = SnapshotReader::open_in_memory().unwrap();
        let now = Utc::now();
        for ticker in tickers {
            let record = triad_models::CompanyRecord {
                quality: DataQuality::Full,
                sources_failed: vec![],
                ..triad_models::CompanyRecord::placeholder(ticker, "")
            };
            reader
                .insert(&SnapshotRow {
                    ticker: ticker.to_string(),
                    record_json: serde_json::to_string(&record).unwrap(),
                    quality: "full".to_string(),
                    fetched_at: now.to_rfc3339(),
                    expires_at: (now + chrono::Duration::seconds(300)).to_rfc3339(),
                })
                .unwrap();
        }
        Arc::new(DataSourceRegistry::from_reader(
            reader,
            DataConfig::default(),
        ))
    }

    fn scripted(id: &str, picks: Vec<StockPick>) -> Arc<dyn ResearchAgent> {
        Arc::new(ScriptedAnalyst::new(
            id,
            AgentLayer::Layer1Primary,
            vec![picks],
        ))
    }

    #[tokio::test]
    async fn layer1_payload_unions_coverage() {
        let registry = seeded_registry(&["NVDA", "MSFT", "AAPL"]);
        let executor = LayerExecutor::new(registry);

        let agents: Vec<Arc<dyn ResearchAgent>> = vec![
            Arc::new(
                ScriptedAnalyst::new("alpha", AgentLayer::Layer1Primary, vec![])
                    .with_coverage(&["NVDA", "MSFT"]),
            ),
            Arc::new(
                ScriptedAnalyst::new("beta", AgentLayer::Layer1Primary, vec![])
                    .with_coverage(&["MSFT", "AAPL"]),
            ),
        ];

        let payload = executor.build_layer1_payload(&agents).await.unwrap();
        assert_eq!(payload.tickers(), vec!["AAPL", "MSFT", "NVDA"]);
        assert!(payload.upstream.is_empty());
        assert!(payload.market_context.contains("Market Context"));
    }

    #[tokio::test]
    async fn layer2_candidate_universe_is_union_of_layer1_picks() {
        let registry = seeded_registry(&["AAPL", "MSFT", "NVDA", "GOOGL"]);
        let executor = LayerExecutor::new(registry);

        let agents = vec![
            scripted("alpha", vec![pick("AAPL", 80.0), pick("MSFT", 75.0)]),
            scripted("beta", vec![pick("MSFT", 82.0), pick("NVDA", 90.0)]),
            scripted("gamma", vec![pick("GOOGL", 78.0), pick("AAPL", 81.0)]),
        ];
        let mut outputs = Vec::new();
        for agent in &agents {
            outputs.push(
                agent
                    .analyze(&ResearchPayload {
                        companies: BTreeMap::new(),
                        market_context: String::new(),
                        upstream: vec![],
                    })
                    .await
                    .unwrap(),
            );
        }

        let payload = executor.build_layer2_payload(&outputs).await.unwrap();
        assert_eq!(payload.tickers(), vec!["AAPL", "GOOGL", "MSFT", "NVDA"]);
        assert_eq!(payload.upstream.len(), 3);
    }

    #[tokio::test]
    async fn unknown_tickers_get_placeholder_briefs() {
        let registry = seeded_registry(&[]);
        let executor = LayerExecutor::new(registry);

        let agents: Vec<Arc<dyn ResearchAgent>> = vec![Arc::new(
            ScriptedAnalyst::new("alpha", AgentLayer::Layer1Primary, vec![])
                .with_coverage(&["ZZZZ"]),
        )];

        let payload = executor.build_layer1_payload(&agents).await.unwrap();
        assert_eq!(payload.companies["ZZZZ"].quality, DataQuality::Placeholder);
        assert!(payload.companies["ZZZZ"].summary.contains("low confidence"));
    }

    #[tokio::test]
    async fn failing_agent_is_substituted_not_fatal() {
        let registry = seeded_registry(&[]);
        let executor = LayerExecutor::new(registry);

        let agents: Vec<Arc<dyn ResearchAgent>> = vec![
            scripted("alpha", vec![pick("NVDA", 90.0)]),
            Arc::new(ScriptedAnalyst::failing("broken", AgentLayer::Layer1Primary)),
            scripted("gamma", vec![pick("AAPL", 70.0)]),
        ];
        let payload = Arc::new(ResearchPayload {
            companies: BTreeMap::new(),
            market_context: String::new(),
            upstream: vec![],
        });

        let outputs = executor.run_layer(&agents, payload).await;

        assert_eq!(outputs.len(), 3);
        assert_eq!(outputs[0].picks.len(), 1);
        assert!(outputs[1].picks.is_empty());
        assert!(outputs[1].reasoning.starts_with("Error:"));
        assert_eq!(outputs[1].agent_id, "broken");
        assert_eq!(outputs[2].picks.len(), 1);
    }

    #[tokio::test]
    async fn synthesis_is_clamped_to_three() {
        let registry = seeded_registry(&[]);
        let executor = LayerExecutor::new(registry);

        let fund_manager: Arc<dyn ResearchAgent> = Arc::new(ScriptedAnalyst::new(
            "fund_manager",
            AgentLayer::Layer3FundManager,
            vec![vec![
                pick("NVDA", 90.0),
                pick("MSFT", 85.0),
                pick("GOOGL", 80.0),
                pick("AMD", 75.0),
            ]],
        ));

        let output = executor.execute_synthesis(&fund_manager, &[]).await.unwrap();
        assert_eq!(output.picks.len(), 3);
        assert_eq!(output.picks[2].ticker, "GOOGL");
    }

    #[tokio::test]
    async fn synthesis_failure_propagates() {
        let registry = seeded_registry(&[]);
        let executor = LayerExecutor::new(registry);

        let fund_manager: Arc<dyn ResearchAgent> = Arc::new(ScriptedAnalyst::failing(
            "fund_manager",
            AgentLayer::Layer3FundManager,
        ));

        let result = executor.execute_synthesis(&fund_manager, &[]).await;
        assert!(matches!(result, Err(LoopError::Agent(_))));
    }
}
