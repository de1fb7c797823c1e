use std::collections::HashSet;
use std::sync::Arc;

use baton_core::agent::Agent;
use baton_core::guardrail::GuardrailResult;
use baton_core::ids::{RunId, ToolCallId};
use baton_core::items::Item;
use baton_core::result::{RunOutcome, RunResult};
use baton_core::usage::Usage;

/// Mutable state of one in-flight run. Owned by the run loop alone.
pub struct RunState {
    pub run_id: RunId,
    pub agent: Arc<Agent>,
    /// Append-only record: session history, the input, then every generated item.
    pub transcript: Vec<Item>,
    /// What the active agent sees. Diverges from the transcript after a filtered handoff.
    pub context: Vec<Item>,
    pub session_items: usize,
    /// Unmodified run input, checked by input guardrails.
    pub input: Vec<Item>,
    pub turn: u32,
    pub usage: Usage,
    pub guardrail_results: Vec<GuardrailResult>,
}

impl RunState {
    pub fn new(run_id: RunId, agent: Arc<Agent>, history: Vec<Item>, input: Vec<Item>) -> Self {
        let session_items = history.len();
        Self {
            run_id,
            agent,
            transcript: history.clone(),
            context: history,
            session_items,
            input,
            turn: 0,
            usage: Usage::default(),
            guardrail_results: Vec::new(),
        }
    }

    /// Append to both the transcript and the active context.
    pub fn append(&mut self, item: Item) {
        self.context.push(item.clone());
        self.transcript.push(item);
    }

    /// Items this run added after the session history.
    pub fn new_items(&self) -> &[Item] {
        &self.transcript[self.session_items..]
    }

    /// What the session keeps of this run: the new items minus tool calls that
    /// never got a result, so a later run never sends an unpaired call.
    pub fn session_items_to_append(&self) -> Vec<Item> {
        let answered: HashSet<&ToolCallId> = self
            .new_items()
            .iter()
            .filter_map(|item| match item {
                Item::ToolResult(result) => Some(&result.call_id),
                _ => None,
            })
            .collect();
        self.new_items()
            .iter()
            .filter(|item| match item {
                Item::ToolCall(call) => answered.contains(&call.id),
                _ => true,
            })
            .cloned()
            .collect()
    }

    pub fn into_result(self, outcome: RunOutcome) -> RunResult {
        RunResult {
            run_id: self.run_id,
            outcome,
            items: self.transcript,
            session_items: self.session_items,
            last_agent: self.agent.id.clone(),
            turns: self.turn,
            usage: self.usage,
            guardrail_results: self.guardrail_results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_updates_both_views() {
        let agent = Arc::new(Agent::builder("a").build());
        let mut state = RunState::new(
            RunId::new(),
            agent,
            vec![Item::user("old")],
            vec![Item::user("new")],
        );
        state.append(Item::user("new"));
        assert_eq!(state.transcript.len(), 2);
        assert_eq!(state.context.len(), 2);
        assert_eq!(state.new_items(), &[Item::user("new")]);

        state.context.clear();
        state.append(Item::user("after"));
        assert_eq!(state.context, vec![Item::user("after")]);
        assert_eq!(state.transcript.len(), 3);

        let result = state.into_result(RunOutcome::Cancelled);
        assert_eq!(result.session_items, 1);
        assert_eq!(result.last_agent.as_str(), "a");
    }

    #[test]
    fn session_items_drop_unanswered_tool_calls() {
        use baton_core::ids::AgentId;
        use baton_core::items::{ToolCall, ToolResult};

        let call = |id: &str| ToolCall {
            id: ToolCallId::from_raw(id),
            name: "sleep".into(),
            arguments: serde_json::json!({}),
            agent: AgentId::from("a"),
        };
        let answered = call("call_done");
        let pending = call("call_pending");

        let agent = Arc::new(Agent::builder("a").build());
        let mut state = RunState::new(
            RunId::new(),
            agent,
            vec![Item::user("old")],
            vec![Item::user("go")],
        );
        state.append(Item::user("go"));
        state.append(Item::ToolCall(answered.clone()));
        state.append(Item::ToolCall(pending));
        state.append(Item::ToolResult(ToolResult::success(&answered, serde_json::json!(1))));

        let kept = state.session_items_to_append();
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[1], Item::ToolCall(answered));
        assert!(matches!(kept[2], Item::ToolResult(_)));
        // The transcript itself is untouched.
        assert_eq!(state.new_items().len(), 4);
    }
}
