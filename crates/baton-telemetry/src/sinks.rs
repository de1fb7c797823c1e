use parking_lot::Mutex;
use tracing::{debug, info, warn};

use baton_core::events::RunEvent;
use baton_core::trace::TraceSink;

/// Writes run events to the `tracing` pipeline.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl TracingSink {
    pub fn new() -> Self {
        Self
    }
}

impl TraceSink for TracingSink {
    fn record(&self, event: &RunEvent) {
        match event {
            RunEvent::RunStarted {
                run_id,
                agent,
                max_turns,
            } => info!(%run_id, %agent, max_turns, "run started"),
            RunEvent::GuardrailEvaluated { result } => {
                if result.verdict.is_trip() {
                    warn!(guardrail = %result.guardrail, kind = %result.kind, "guardrail tripped");
                } else {
                    debug!(guardrail = %result.guardrail, kind = %result.kind, "guardrail passed");
                }
            }
            RunEvent::TurnStarted { turn, agent } => debug!(turn, %agent, "turn started"),
            RunEvent::ModelCallCompleted {
                turn,
                agent,
                usage,
                output_items,
                ..
            } => debug!(
                turn,
                %agent,
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                output_items,
                "model call completed"
            ),
            RunEvent::ItemAppended { item } => debug!(kind = item.kind(), "item appended"),
            RunEvent::ToolStarted {
                call_id,
                tool,
                agent,
            } => debug!(%call_id, tool = %tool, %agent, "tool started"),
            RunEvent::ToolFinished {
                call_id,
                tool,
                failed,
                duration_ms,
            } => {
                if *failed {
                    warn!(%call_id, tool = %tool, duration_ms, "tool failed");
                } else {
                    debug!(%call_id, tool = %tool, duration_ms, "tool finished");
                }
            }
            RunEvent::HandoffOccurred {
                source,
                destination,
                carried_items,
            } => info!(%source, %destination, carried_items, "handoff"),
            RunEvent::TurnCompleted { turn, agent } => debug!(turn, %agent, "turn completed"),
            RunEvent::RunFinished { result } => {
                if result.outcome.is_success() {
                    info!(
                        run_id = %result.run_id,
                        turns = result.turns,
                        total_tokens = result.usage.total_tokens,
                        "run finished"
                    );
                } else {
                    warn!(
                        run_id = %result.run_id,
                        outcome = result.outcome.kind(),
                        turns = result.turns,
                        "run finished without output"
                    );
                }
            }
            RunEvent::TextDelta { .. } | RunEvent::ToolCallStarted { .. } => {}
        }
    }
}

/// Records every event it receives. Mostly useful in tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<RunEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RunEvent> {
        self.events.lock().clone()
    }

    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(RunEvent::event_type).collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl TraceSink for MemorySink {
    fn record(&self, event: &RunEvent) {
        self.events.lock().push(event.clone());
    }
}
