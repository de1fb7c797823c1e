use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ids::AgentId;
use crate::items::Item;

pub const HANDOFF_TOOL_PREFIX: &str = "transfer_to_";

/// Default tool name the model uses to request a transfer to `target`.
pub fn default_tool_name(target: &AgentId) -> String {
    format!("{HANDOFF_TOOL_PREFIX}{target}")
}

type FilterFn = dyn Fn(&[Item]) -> Vec<Item> + Send + Sync;

/// Shapes the history an agent starts with after a handoff.
#[derive(Clone, Default)]
pub enum HistoryFilter {
    #[default]
    Identity,
    /// Drops tool calls and tool results.
    RemoveToolItems,
    /// Keeps only the last `n` items.
    LastN(usize),
    Custom(Arc<FilterFn>),
}

impl HistoryFilter {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&[Item]) -> Vec<Item> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    pub fn apply(&self, history: &[Item]) -> Vec<Item> {
        match self {
            Self::Identity => history.to_vec(),
            Self::RemoveToolItems => history
                .iter()
                .filter(|item| !item.is_tool_item())
                .cloned()
                .collect(),
            Self::LastN(n) => history[history.len().saturating_sub(*n)..].to_vec(),
            Self::Custom(f) => f(history),
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Identity)
    }
}

impl std::fmt::Debug for HistoryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Identity => f.write_str("Identity"),
            Self::RemoveToolItems => f.write_str("RemoveToolItems"),
            Self::LastN(n) => f.debug_tuple("LastN").field(n).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// A declared handoff target of an agent.
#[derive(Clone, Debug)]
pub struct Handoff {
    pub target: AgentId,
    pub tool_name: String,
    pub description: String,
    pub filter: HistoryFilter,
}

impl Handoff {
    pub fn to(target: impl Into<AgentId>) -> Self {
        let target = target.into();
        Self {
            tool_name: default_tool_name(&target),
            description: format!("Transfer the conversation to the {target} agent."),
            target,
            filter: HistoryFilter::Identity,
        }
    }

    pub fn with_tool_name(mut self, name: impl Into<String>) -> Self {
        self.tool_name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_filter(mut self, filter: HistoryFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn to_definition(&self) -> HandoffDefinition {
        HandoffDefinition {
            target: self.target.clone(),
            tool_name: self.tool_name.clone(),
            description: self.description.clone(),
        }
    }
}

/// What a backend is told about a handoff option.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HandoffDefinition {
    pub target: AgentId,
    pub tool_name: String,
    pub description: String,
}
