use serde::{Deserialize, Serialize};

use crate::guardrail::GuardrailResult;
use crate::ids::{AgentId, RunId, ToolCallId};
use crate::items::Item;
use crate::result::RunResult;
use crate::usage::Usage;

/// Events published while a run executes, in the order they happen.
/// `RunFinished` is always the last event of a run.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted {
        run_id: RunId,
        agent: AgentId,
        max_turns: u32,
    },

    GuardrailEvaluated {
        result: GuardrailResult,
    },

    TurnStarted {
        turn: u32,
        agent: AgentId,
    },

    ModelCallCompleted {
        turn: u32,
        agent: AgentId,
        usage: Usage,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        response_id: Option<String>,
        output_items: usize,
    },

    /// Partial assistant text from a streaming backend.
    TextDelta {
        turn: u32,
        delta: String,
    },

    /// The model started emitting a tool call; arguments are not final yet.
    ToolCallStarted {
        turn: u32,
        call_id: ToolCallId,
        name: String,
    },

    ItemAppended {
        item: Item,
    },

    ToolStarted {
        call_id: ToolCallId,
        tool: String,
        agent: AgentId,
    },

    ToolFinished {
        call_id: ToolCallId,
        tool: String,
        failed: bool,
        duration_ms: u64,
    },

    HandoffOccurred {
        source: AgentId,
        destination: AgentId,
        carried_items: usize,
    },

    TurnCompleted {
        turn: u32,
        agent: AgentId,
    },

    RunFinished {
        result: Box<RunResult>,
    },
}

impl RunEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::GuardrailEvaluated { .. } => "guardrail_evaluated",
            Self::TurnStarted { .. } => "turn_started",
            Self::ModelCallCompleted { .. } => "model_call_completed",
            Self::TextDelta { .. } => "text_delta",
            Self::ToolCallStarted { .. } => "tool_call_started",
            Self::ItemAppended { .. } => "item_appended",
            Self::ToolStarted { .. } => "tool_started",
            Self::ToolFinished { .. } => "tool_finished",
            Self::HandoffOccurred { .. } => "handoff_occurred",
            Self::TurnCompleted { .. } => "turn_completed",
            Self::RunFinished { .. } => "run_finished",
        }
    }

    /// Deltas are delivered to stream consumers but not to trace sinks.
    pub fn is_delta(&self) -> bool {
        matches!(self, Self::TextDelta { .. } | Self::ToolCallStarted { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RunFinished { .. })
    }
}
