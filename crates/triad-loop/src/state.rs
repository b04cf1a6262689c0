use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LoopError;

/// Phases of one research run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    Idle,
    Initializing,
    FetchingData,
    Layer1Executing,
    Layer2Executing,
    Layer3Executing,
    Layer4Executing,
    CheckingConvergence,
    Converged,
    GeneratingReport,
    SendingNotifications,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowPhase {
    /// Legal next phases.
    pub fn valid_targets(self) -> &'static [WorkflowPhase] {
        use WorkflowPhase::*;
        match self {
            Idle => &[Initializing, Cancelled],
            Initializing => &[FetchingData, Failed, Cancelled],
            FetchingData => &[Layer1Executing, Failed, Cancelled],
            Layer1Executing => &[Layer2Executing, Failed, Cancelled],
            Layer2Executing => &[Layer3Executing, Failed, Cancelled],
            Layer3Executing => &[Layer4Executing, Failed, Cancelled],
            Layer4Executing => &[CheckingConvergence, Failed, Cancelled],
            // Loops back to FetchingData for the next iteration.
            CheckingConvergence => &[Converged, FetchingData, Failed, Cancelled],
            Converged => &[GeneratingReport, Failed, Cancelled],
            // Straight to Completed when no notifications are configured.
            GeneratingReport => &[SendingNotifications, Completed, Failed, Cancelled],
            SendingNotifications => &[Completed, Failed, Cancelled],
            Completed => &[],
            // Failed and cancelled runs can be restarted.
            Failed => &[Idle],
            Cancelled => &[Idle],
        }
    }
}

impl fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| format!("{self:?}"));
        f.write_str(&label)
    }
}

/// Record of one phase transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhaseTransition {
    pub from: WorkflowPhase,
    pub to: WorkflowPhase,
    pub at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

/// Tracks the phase of one research run.
///
/// The loop controller is the sole driver: it emits a transition at every
/// phase boundary, so the transition history is a faithful trace of the run.
/// The machine records execution; it never gates it.
pub struct WorkflowStateMachine {
    current: WorkflowPhase,
    transitions: Vec<PhaseTransition>,
    context: BTreeMap<String, serde_json::Value>,
    loop_number: u32,
}

impl WorkflowStateMachine {
    pub fn new() -> Self {
        Self {
            current: WorkflowPhase::Idle,
            transitions: Vec::new(),
            context: BTreeMap::new(),
            loop_number: 0,
        }
    }

    pub fn current(&self) -> WorkflowPhase {
        self.current
    }

    /// Number of times the machine entered Layer1Executing.
    pub fn loop_number(&self) -> u32 {
        self.loop_number
    }

    pub fn can_transition(&self, to: WorkflowPhase) -> bool {
        self.current.valid_targets().contains(&to)
    }

    pub fn transition(
        &mut self,
        to: WorkflowPhase,
        metadata: serde_json::Value,
    ) -> Result<(), LoopError> {
        if !self.can_transition(to) {
            return Err(LoopError::InvalidTransition {
                from: self.current,
                to,
            });
        }

        self.transitions.push(PhaseTransition {
            from: self.current,
            to,
            at: Utc::now(),
            metadata,
        });

        if to == WorkflowPhase::Layer1Executing {
            self.loop_number += 1;
        }

        self.current = to;
        Ok(())
    }

    /// Reset to idle for reuse.
    pub fn reset(&mut self) {
        self.current = WorkflowPhase::Idle;
        self.transitions.clear();
        self.context.clear();
        self.loop_number = 0;
    }

    pub fn set_context(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.context.insert(key.into(), value);
    }

    pub fn get_context(&self, key: &str) -> Option<&serde_json::Value> {
        self.context.get(key)
    }

    pub fn transitions(&self) -> &[PhaseTransition] {
        &self.transitions
    }

    /// Total seconds spent in a phase across the run so far.
    pub fn time_in(&self, phase: WorkflowPhase) -> f64 {
        let mut total = 0.0;
        let mut entered: Option<DateTime<Utc>> = None;

        for transition in &self.transitions {
            if transition.to == phase {
                entered = Some(transition.at);
            } else if transition.from == phase {
                if let Some(at) = entered.take() {
                    total += (transition.at - at).num_milliseconds() as f64 / 1000.0;
                }
            }
        }

        // Still in the phase.
        if let Some(at) = entered {
            total += (Utc::now() - at).num_milliseconds() as f64 / 1000.0;
        }

        total
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.current,
            WorkflowPhase::Completed | WorkflowPhase::Failed | WorkflowPhase::Cancelled
        )
    }

    pub fn is_running(&self) -> bool {
        !matches!(
            self.current,
            WorkflowPhase::Idle
                | WorkflowPhase::Completed
                | WorkflowPhase::Failed
                | WorkflowPhase::Cancelled
        )
    }

    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "current_phase": self.current.to_string(),
            "loop_number": self.loop_number,
            "is_running": self.is_running(),
            "is_terminal": self.is_terminal(),
            "transition_count": self.transitions.len(),
            "context_keys": self.context.keys().collect::<Vec<_>>(),
        })
    }
}

impl Default for WorkflowStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
