use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::guardrail::Guardrail;
use crate::handoff::{Handoff, HandoffDefinition};
use crate::ids::AgentId;
use crate::tools::{check_schema, Tool, ToolDefinition};

type InstructionsFn = dyn Fn(&serde_json::Value, &AgentId) -> String + Send + Sync;

/// System instructions, fixed or derived from the run context.
#[derive(Clone)]
pub enum Instructions {
    Static(String),
    Dynamic(Arc<InstructionsFn>),
}

impl Instructions {
    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&serde_json::Value, &AgentId) -> String + Send + Sync + 'static,
    {
        Self::Dynamic(Arc::new(f))
    }

    pub fn resolve(&self, context: &serde_json::Value, agent: &AgentId) -> String {
        match self {
            Self::Static(text) => text.clone(),
            Self::Dynamic(f) => f(context, agent),
        }
    }
}

impl std::fmt::Debug for Instructions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(text) => f.debug_tuple("Static").field(text).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    #[default]
    Auto,
    Required,
    None,
    Named(String),
}

/// Model selection and sampling settings forwarded to the backend.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub tool_choice: ToolChoice,
}

/// Immutable agent descriptor. Build one with [`Agent::builder`].
#[derive(Clone)]
pub struct Agent {
    pub id: AgentId,
    pub instructions: Option<Instructions>,
    pub tools: Vec<Arc<dyn Tool>>,
    pub input_guardrails: Vec<Arc<dyn Guardrail>>,
    pub output_guardrails: Vec<Arc<dyn Guardrail>>,
    pub handoffs: Vec<Handoff>,
    pub output_schema: Option<serde_json::Value>,
    pub settings: ModelSettings,
}

impl Agent {
    pub fn builder(name: impl Into<AgentId>) -> AgentBuilder {
        AgentBuilder {
            agent: Agent {
                id: name.into(),
                instructions: None,
                tools: Vec::new(),
                input_guardrails: Vec::new(),
                output_guardrails: Vec::new(),
                handoffs: Vec::new(),
                output_schema: None,
                settings: ModelSettings::default(),
            },
        }
    }

    pub fn resolve_instructions(&self, context: &serde_json::Value) -> Option<String> {
        self.instructions
            .as_ref()
            .map(|i| i.resolve(context, &self.id))
    }

    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.to_definition()).collect()
    }

    pub fn handoff_definitions(&self) -> Vec<HandoffDefinition> {
        self.handoffs.iter().map(Handoff::to_definition).collect()
    }

    /// The declared handoff to `target`, if any.
    pub fn handoff_to(&self, target: &AgentId) -> Option<&Handoff> {
        self.handoffs.iter().find(|h| &h.target == target)
    }

    /// The declared handoff whose tool name is `name`, if any.
    pub fn handoff_for_tool(&self, name: &str) -> Option<&Handoff> {
        self.handoffs.iter().find(|h| h.tool_name == name)
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tools: Vec<&str> = self.tools.iter().map(|t| t.name()).collect();
        let input: Vec<&str> = self.input_guardrails.iter().map(|g| g.name()).collect();
        let output: Vec<&str> = self.output_guardrails.iter().map(|g| g.name()).collect();
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("instructions", &self.instructions)
            .field("tools", &tools)
            .field("input_guardrails", &input)
            .field("output_guardrails", &output)
            .field("handoffs", &self.handoffs)
            .field("output_schema", &self.output_schema)
            .field("settings", &self.settings)
            .finish()
    }
}

pub struct AgentBuilder {
    agent: Agent,
}

impl AgentBuilder {
    pub fn instructions(mut self, text: impl Into<String>) -> Self {
        self.agent.instructions = Some(Instructions::Static(text.into()));
        self
    }

    pub fn dynamic_instructions<F>(mut self, f: F) -> Self
    where
        F: Fn(&serde_json::Value, &AgentId) -> String + Send + Sync + 'static,
    {
        self.agent.instructions = Some(Instructions::dynamic(f));
        self
    }

    pub fn tool(mut self, tool: impl Tool + 'static) -> Self {
        self.agent.tools.push(Arc::new(tool));
        self
    }

    pub fn shared_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.agent.tools.push(tool);
        self
    }

    pub fn input_guardrail(mut self, guardrail: impl Guardrail + 'static) -> Self {
        self.agent.input_guardrails.push(Arc::new(guardrail));
        self
    }

    pub fn output_guardrail(mut self, guardrail: impl Guardrail + 'static) -> Self {
        self.agent.output_guardrails.push(Arc::new(guardrail));
        self
    }

    pub fn handoff(mut self, handoff: Handoff) -> Self {
        self.agent.handoffs.push(handoff);
        self
    }

    pub fn output_schema(mut self, schema: serde_json::Value) -> Self {
        self.agent.output_schema = Some(schema);
        self
    }

    pub fn settings(mut self, settings: ModelSettings) -> Self {
        self.agent.settings = settings;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.agent.settings.model = Some(model.into());
        self
    }

    pub fn build(self) -> Agent {
        self.agent
    }
}

/// Contract violations detected when an agent graph is assembled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("duplicate agent: {0}")]
    DuplicateAgent(AgentId),

    #[error("agent {agent} hands off to unknown agent {target}")]
    UnknownHandoffTarget { agent: AgentId, target: AgentId },

    #[error("agent {agent} declares handoff to {target} more than once")]
    DuplicateHandoff { agent: AgentId, target: AgentId },

    #[error("agent {agent} declares tool {tool} more than once")]
    DuplicateTool { agent: AgentId, tool: String },

    #[error("agent {agent}: name {name} is used by both a tool and a handoff")]
    ToolNameCollision { agent: AgentId, name: String },

    #[error("agent {agent} has an invalid output schema: {reason}")]
    InvalidOutputSchema { agent: AgentId, reason: String },

    #[error("agent {agent}, tool {tool}: invalid parameter schema: {reason}")]
    InvalidToolSchema {
        agent: AgentId,
        tool: String,
        reason: String,
    },
}

/// Validated set of agents, referenced by id. Handoff cycles are allowed.
#[derive(Clone, Debug, Default)]
pub struct AgentGraph {
    agents: HashMap<AgentId, Arc<Agent>>,
}

impl AgentGraph {
    pub fn new(agents: impl IntoIterator<Item = Agent>) -> Result<Self, GraphError> {
        let mut map = HashMap::new();
        for agent in agents {
            if map.contains_key(&agent.id) {
                return Err(GraphError::DuplicateAgent(agent.id));
            }
            map.insert(agent.id.clone(), Arc::new(agent));
        }

        // Validate in a stable order so the reported error is deterministic.
        let ordered: BTreeMap<&AgentId, &Arc<Agent>> = map.iter().collect();
        for agent in ordered.values() {
            validate_agent(agent, &map)?;
        }
        Ok(Self { agents: map })
    }

    pub fn get(&self, id: &AgentId) -> Option<Arc<Agent>> {
        self.agents.get(id).cloned()
    }

    pub fn contains(&self, id: &AgentId) -> bool {
        self.agents.contains_key(id)
    }

    pub fn agent_ids(&self) -> Vec<AgentId> {
        let mut ids: Vec<AgentId> = self.agents.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

fn validate_agent(agent: &Agent, all: &HashMap<AgentId, Arc<Agent>>) -> Result<(), GraphError> {
    let mut tool_names = HashSet::new();
    for tool in &agent.tools {
        let name = tool.name().to_string();
        if let Err(reason) = check_schema(&tool.parameters_schema()) {
            return Err(GraphError::InvalidToolSchema {
                agent: agent.id.clone(),
                tool: name,
                reason,
            });
        }
        if !tool_names.insert(name.clone()) {
            return Err(GraphError::DuplicateTool {
                agent: agent.id.clone(),
                tool: name,
            });
        }
    }

    let mut targets = HashSet::new();
    for handoff in &agent.handoffs {
        if !all.contains_key(&handoff.target) {
            return Err(GraphError::UnknownHandoffTarget {
                agent: agent.id.clone(),
                target: handoff.target.clone(),
            });
        }
        if !targets.insert(handoff.target.clone()) {
            return Err(GraphError::DuplicateHandoff {
                agent: agent.id.clone(),
                target: handoff.target.clone(),
            });
        }
        if !tool_names.insert(handoff.tool_name.clone()) {
            return Err(GraphError::ToolNameCollision {
                agent: agent.id.clone(),
                name: handoff.tool_name.clone(),
            });
        }
    }

    if let Some(schema) = &agent.output_schema {
        check_schema(schema).map_err(|reason| GraphError::InvalidOutputSchema {
            agent: agent.id.clone(),
            reason,
        })?;
    }
    Ok(())
}
