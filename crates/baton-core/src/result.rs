use serde::{Deserialize, Serialize};

use crate::errors::BackendErrorInfo;
use crate::guardrail::{GuardrailResult, GuardrailTrip};
use crate::ids::{AgentId, RunId};
use crate::items::{FinalOutput, Item};
use crate::usage::Usage;

/// How a run terminated. Every variant other than `Success` is fatal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Success { output: FinalOutput },
    GuardrailTripped { trip: GuardrailTrip },
    MaxTurnsExceeded { max_turns: u32 },
    UnauthorizedHandoff { source: AgentId, target: AgentId },
    BackendFailure { error: BackendErrorInfo },
    InvalidOutput { reason: String },
    Cancelled,
}

impl RunOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::GuardrailTripped { .. } => "guardrail_tripped",
            Self::MaxTurnsExceeded { .. } => "max_turns_exceeded",
            Self::UnauthorizedHandoff { .. } => "unauthorized_handoff",
            Self::BackendFailure { .. } => "backend_failure",
            Self::InvalidOutput { .. } => "invalid_output",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Terminal result of a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: RunId,
    pub outcome: RunOutcome,
    /// Session history followed by everything this run appended.
    pub items: Vec<Item>,
    /// Number of leading `items` that were loaded from the session.
    pub session_items: usize,
    pub last_agent: AgentId,
    pub turns: u32,
    pub usage: Usage,
    pub guardrail_results: Vec<GuardrailResult>,
}

impl RunResult {
    pub fn final_output(&self) -> Option<&FinalOutput> {
        match &self.outcome {
            RunOutcome::Success { output } => Some(output),
            _ => None,
        }
    }

    /// Items produced by this run, including its input.
    pub fn new_items(&self) -> &[Item] {
        &self.items[self.session_items.min(self.items.len())..]
    }

    pub fn tripped_guardrail(&self) -> Option<&GuardrailTrip> {
        match &self.outcome {
            RunOutcome::GuardrailTripped { trip } => Some(trip),
            _ => None,
        }
    }
}
