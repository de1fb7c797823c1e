use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, ToolCallId};

/// One entry of a conversation. Identity is position; entries are never edited
/// once appended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Item {
    User { text: String },
    Assistant { agent: AgentId, text: String },
    ToolCall(ToolCall),
    ToolResult(ToolResult),
    Handoff(HandoffMarker),
}

/// A tool invocation requested by the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: ToolCallId,
    pub name: String,
    pub arguments: serde_json::Value,
    pub agent: AgentId,
}

/// The single result paired with a [`ToolCall`] by `call_id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: ToolCallId,
    pub tool_name: String,
    pub output: ToolOutput,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutput {
    Success { value: serde_json::Value },
    Failure { kind: ToolFailureKind, message: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolFailureKind {
    UnknownTool,
    InvalidArguments,
    ExecutionFailed,
    Panicked,
    TimedOut,
}

/// Records that control moved from `source` to `destination`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HandoffMarker {
    pub call_id: ToolCallId,
    pub source: AgentId,
    pub destination: AgentId,
}

/// Normalized unit of model output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    Message {
        text: String,
    },
    ToolCall {
        id: ToolCallId,
        name: String,
        arguments: serde_json::Value,
    },
    Handoff(HandoffRequest),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HandoffRequest {
    pub call_id: ToolCallId,
    pub target: AgentId,
}

/// What a successful run produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FinalOutput {
    Text(String),
    Structured(serde_json::Value),
}

impl FinalOutput {
    /// Text form of the output; structured outputs are rendered as compact JSON.
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Structured(value) => value.to_string(),
        }
    }
}

// --- Convenience constructors ---

impl Item {
    pub fn user(text: impl Into<String>) -> Self {
        Item::User { text: text.into() }
    }

    pub fn assistant(agent: AgentId, text: impl Into<String>) -> Self {
        Item::Assistant {
            agent,
            text: text.into(),
        }
    }

    pub fn is_tool_item(&self) -> bool {
        matches!(self, Item::ToolCall(_) | Item::ToolResult(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Item::User { .. } => "user",
            Item::Assistant { .. } => "assistant",
            Item::ToolCall(_) => "tool_call",
            Item::ToolResult(_) => "tool_result",
            Item::Handoff(_) => "handoff",
        }
    }
}

impl ToolResult {
    pub fn success(call: &ToolCall, value: serde_json::Value) -> Self {
        Self {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            output: ToolOutput::Success { value },
        }
    }

    pub fn failure(call: &ToolCall, kind: ToolFailureKind, message: impl Into<String>) -> Self {
        Self {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            output: ToolOutput::Failure {
                kind,
                message: message.into(),
            },
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.output, ToolOutput::Failure { .. })
    }
}

impl OutputItem {
    pub fn message(text: impl Into<String>) -> Self {
        OutputItem::Message { text: text.into() }
    }

    pub fn tool_call(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        OutputItem::ToolCall {
            id: ToolCallId::new(),
            name: name.into(),
            arguments,
        }
    }

    pub fn handoff(target: impl Into<AgentId>) -> Self {
        OutputItem::Handoff(HandoffRequest {
            call_id: ToolCallId::new(),
            target: target.into(),
        })
    }
}
