use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use triad_agents::AgentRoster;
use triad_data::DataSourceRegistry;
use triad_models::{
    AgentOutput, CeoOutput, ConvergenceConfig, ConvergenceResult, LoopIteration, ResearchRun,
    RunStatus, StockPick, TokenUsage,
};
use uuid::Uuid;

use crate::convergence::ConvergenceDetector;
use crate::error::LoopError;
use crate::executor::LayerExecutor;
use crate::state::{WorkflowPhase, WorkflowStateMachine};

/// Drives the iterate-until-convergence protocol and assembles the
/// `ResearchRun` aggregate.
///
/// Layers run strictly in sequence within an iteration, iterations run
/// strictly in sequence within a run; only agents within a layer execute
/// concurrently. The controller is also the sole driver of the workflow
/// state machine, emitting a transition at every phase boundary.
pub struct LoopController {
    roster: Arc<dyn AgentRoster>,
    data: Arc<DataSourceRegistry>,
    executor: LayerExecutor,
    detector: ConvergenceDetector,
    machine: WorkflowStateMachine,
    cancel: CancellationToken,
    last_run: Option<ResearchRun>,
}

impl LoopController {
    pub fn new(
        convergence: ConvergenceConfig,
        roster: Arc<dyn AgentRoster>,
        data: Arc<DataSourceRegistry>,
    ) -> Self {
        Self {
            roster,
            executor: LayerExecutor::new(Arc::clone(&data)),
            data,
            detector: ConvergenceDetector::new(convergence),
            machine: WorkflowStateMachine::new(),
            cancel: CancellationToken::new(),
            last_run: None,
        }
    }

    /// Token that aborts the run when triggered. Checked between iterations
    /// and between layers; a cancelled run fails with `LoopError::Cancelled`.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn machine(&self) -> &WorkflowStateMachine {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut WorkflowStateMachine {
        &mut self.machine
    }

    /// The most recently finished run (completed or failed), if any.
    pub fn last_run(&self) -> Option<&ResearchRun> {
        self.last_run.as_ref()
    }

    /// Current convergence read, with progress details when not converged.
    pub fn convergence_progress(&self) -> ConvergenceResult {
        self.detector.check()
    }

    /// Execute the full research loop until convergence.
    ///
    /// Data sources are released on every exit path. On error the run is
    /// finalized as failed and the error re-raised to the caller, which owns
    /// the decision of what to do with a failed run.
    pub async fn run(&mut self) -> Result<ResearchRun, LoopError> {
        let run_id = generate_run_id();
        info!(run_id = %run_id, "Starting research run");

        self.machine.reset();
        self.detector.reset();
        let mut run = ResearchRun::new(&run_id);
        self.machine
            .set_context("run_id", serde_json::json!(run_id));

        let result = self.drive(&mut run).await;

        // Scoped release: data sources close no matter how the loop exited.
        self.data.close_all().await;

        let completed = Utc::now();
        run.completed_at = Some(completed);
        run.total_duration_seconds = (completed - run.started_at).num_milliseconds() as f64 / 1000.0;

        match result {
            Ok(()) => {
                run.status = RunStatus::Completed;
                info!(
                    run_id = %run.run_id,
                    loops = run.iterations.len(),
                    total_tokens = run.total_usage.total(),
                    duration_s = run.total_duration_seconds,
                    "Research run complete"
                );
                self.last_run = Some(run.clone());
                Ok(run)
            }
            Err(e) => {
                error!(run_id = %run.run_id, error = %e, "Research run failed");
                run.status = RunStatus::Failed;

                let target = if matches!(e, LoopError::Cancelled) {
                    WorkflowPhase::Cancelled
                } else {
                    WorkflowPhase::Failed
                };
                if self.machine.can_transition(target) {
                    let _ = self
                        .machine
                        .transition(target, serde_json::json!({ "error": e.to_string() }));
                }

                self.last_run = Some(run);
                Err(e)
            }
        }
    }

    async fn drive(&mut self, run: &mut ResearchRun) -> Result<(), LoopError> {
        self.machine.transition(
            WorkflowPhase::Initializing,
            serde_json::json!({ "run_id": run.run_id }),
        )?;

        // Resolve the agent set once per run.
        let layer1_agents = self.roster.layer1_agents();
        let layer2_agents = self.roster.layer2_agents();
        let fund_manager = self.roster.fund_manager();
        let ceo = self.roster.ceo();
        ceo.reset().await;

        self.data.initialize_all().await?;

        let mut previous_top3: Option<Vec<StockPick>> = None;
        let mut loop_number: u32 = 0;

        loop {
            loop_number += 1;
            self.ensure_active()?;
            info!(loop_number, "=== Starting loop ===");
            let loop_start = Instant::now();

            self.machine.transition(
                WorkflowPhase::FetchingData,
                serde_json::json!({ "loop_number": loop_number }),
            )?;
            let layer1_payload = self.executor.build_layer1_payload(&layer1_agents).await?;

            self.ensure_active()?;
            self.machine.transition(
                WorkflowPhase::Layer1Executing,
                serde_json::json!({ "agents": layer1_agents.len() }),
            )?;
            let layer1_outputs = self
                .executor
                .run_layer(&layer1_agents, Arc::new(layer1_payload))
                .await;

            self.ensure_active()?;
            self.machine.transition(
                WorkflowPhase::Layer2Executing,
                serde_json::json!({ "agents": layer2_agents.len() }),
            )?;
            let layer2_payload = self.executor.build_layer2_payload(&layer1_outputs).await?;
            let layer2_outputs = self
                .executor
                .run_layer(&layer2_agents, Arc::new(layer2_payload))
                .await;

            self.ensure_active()?;
            self.machine
                .transition(WorkflowPhase::Layer3Executing, serde_json::json!({}))?;
            let layer3_output = self
                .executor
                .execute_synthesis(&fund_manager, &layer2_outputs)
                .await?;

            self.ensure_active()?;
            self.machine
                .transition(WorkflowPhase::Layer4Executing, serde_json::json!({}))?;
            let ceo_output = self
                .executor
                .execute_oversight(
                    &ceo,
                    previous_top3.as_deref(),
                    &layer3_output.picks,
                    loop_number,
                )
                .await?;

            if ceo_output.final_top3.len() < 3 {
                warn!(
                    loop_number,
                    picks = ceo_output.final_top3.len(),
                    "Final Top-3 is degraded (fewer than 3 picks)"
                );
            }

            let iteration = record_iteration(
                loop_number,
                &layer1_outputs,
                &layer2_outputs,
                &layer3_output,
                &ceo_output,
                loop_start.elapsed().as_secs_f64(),
            );
            run.total_usage.add(iteration.usage);
            run.iterations.push(iteration);

            self.machine.transition(
                WorkflowPhase::CheckingConvergence,
                serde_json::json!({ "stability": ceo_output.stability_score }),
            )?;
            self.detector.add_result(&ceo_output.final_top3);
            let convergence = self.detector.check();
            info!(
                reason = ?convergence.reason,
                converged = convergence.converged,
                "Convergence check"
            );

            if convergence.converged {
                self.machine.transition(
                    WorkflowPhase::Converged,
                    serde_json::json!({ "reason": convergence.reason }),
                )?;
                run.final_picks = ceo_output.final_top3.clone();
                run.convergence = Some(convergence);
                return Ok(());
            }

            // Carry this iteration's final Top-3 into the next one.
            previous_top3 = Some(ceo_output.final_top3);
        }
    }

    fn ensure_active(&self) -> Result<(), LoopError> {
        if self.cancel.is_cancelled() {
            Err(LoopError::Cancelled)
        } else {
            Ok(())
        }
    }
}

fn generate_run_id() -> String {
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("run_{stamp}_{}", &suffix[..6])
}

/// Snapshot one full layer-sequence pass, accumulating token usage from all
/// four layers.
fn record_iteration(
    loop_number: u32,
    layer1_outputs: &[AgentOutput],
    layer2_outputs: &[AgentOutput],
    layer3_output: &AgentOutput,
    ceo_output: &CeoOutput,
    duration_seconds: f64,
) -> LoopIteration {
    let layer1_picks: BTreeMap<String, Vec<StockPick>> = layer1_outputs
        .iter()
        .map(|o| (o.agent_id.clone(), o.picks.clone()))
        .collect();
    let layer2_picks: BTreeMap<String, Vec<StockPick>> = layer2_outputs
        .iter()
        .map(|o| (o.agent_id.clone(), o.picks.clone()))
        .collect();

    let mut usage = TokenUsage::default();
    for output in layer1_outputs.iter().chain(layer2_outputs) {
        usage.add(output.usage);
    }
    usage.add(layer3_output.usage);
    usage.add(ceo_output.usage);

    LoopIteration {
        loop_number,
        timestamp: Utc::now(),
        layer1_picks,
        layer2_picks,
        proposed_top3: layer3_output.picks.clone(),
        final_top3: ceo_output.final_top3.clone(),
        ceo_decisions: ceo_output.decisions.clone(),
        stability_score: ceo_output.stability_score,
        duration_seconds,
        usage,
    }
}
