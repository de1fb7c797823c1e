use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, instrument, warn};

use baton_core::agent::Agent;
use baton_core::errors::BackendError;
use baton_core::events::RunEvent;
use baton_core::handoff::HANDOFF_TOOL_PREFIX;
use baton_core::ids::AgentId;
use baton_core::items::{HandoffRequest, Item, OutputItem, ToolCall};
use baton_core::provider::{ModelBackend, ModelRequest, ModelResponse};
use baton_core::stream::StreamEvent;

use crate::config::RetryPolicy;
use crate::emitter::EventEmitter;
use crate::registry::ToolRegistry;

/// How model output reaches the run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// `ModelBackend::generate`.
    Blocking,
    /// `ModelBackend::stream`, forwarding deltas as they arrive.
    Streaming,
}

/// A model response sorted into what the orchestrator acts on.
#[derive(Debug, Default, PartialEq)]
pub struct TurnOutput {
    pub messages: Vec<String>,
    pub tool_calls: Vec<ToolCall>,
    /// First handoff request of the turn. Later ones are dropped.
    pub handoff: Option<HandoffRequest>,
}

impl TurnOutput {
    /// Text of the final answer: the last message of the turn.
    pub fn final_text(&self) -> Option<&str> {
        self.messages.last().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.tool_calls.is_empty() && self.handoff.is_none()
    }
}

/// Performs one model call for an agent, with bounded retry on transient failures.
pub struct TurnExecutor {
    backend: Arc<dyn ModelBackend>,
    retry: RetryPolicy,
}

impl TurnExecutor {
    pub fn new(backend: Arc<dyn ModelBackend>, retry: RetryPolicy) -> Self {
        Self { backend, retry }
    }

    pub fn build_request(
        agent: &Agent,
        registry: &ToolRegistry,
        history: &[Item],
        context: &serde_json::Value,
    ) -> ModelRequest {
        ModelRequest {
            agent: agent.id.clone(),
            instructions: agent.resolve_instructions(context),
            tools: registry.definitions(),
            handoffs: agent.handoff_definitions(),
            history: history.to_vec(),
            settings: agent.settings.clone(),
            output_schema: agent.output_schema.clone(),
        }
    }

    #[instrument(skip_all, fields(agent = %request.agent, turn = turn, backend = self.backend.name()))]
    pub async fn run_turn(
        &self,
        request: &ModelRequest,
        turn: u32,
        delivery: Delivery,
        emitter: &EventEmitter,
    ) -> Result<ModelResponse, BackendError> {
        let mut attempt = 0;
        loop {
            let (result, forwarded) = match delivery {
                Delivery::Blocking => (self.backend.generate(request).await, false),
                Delivery::Streaming => self.stream_once(request, turn, emitter).await,
            };

            let err = match result {
                Ok(response) => {
                    debug!(
                        items = response.items.len(),
                        input_tokens = response.usage.input_tokens,
                        output_tokens = response.usage.output_tokens,
                        "model call completed"
                    );
                    return Ok(response);
                }
                Err(e) => e,
            };

            // Partial output already reached the consumer; a retry would duplicate it.
            if !err.is_transient() || forwarded || attempt >= self.retry.max_retries {
                warn!(error = %err, kind = err.error_kind(), attempt, "model call failed");
                return Err(err);
            }

            let delay = self.retry.delay_for(attempt, &err);
            warn!(
                error = %err,
                attempt = attempt + 1,
                max_retries = self.retry.max_retries,
                delay_ms = delay.as_millis() as u64,
                "transient model failure, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// One streaming attempt. Also reports whether any delta was forwarded.
    async fn stream_once(
        &self,
        request: &ModelRequest,
        turn: u32,
        emitter: &EventEmitter,
    ) -> (Result<ModelResponse, BackendError>, bool) {
        let mut stream = match self.backend.stream(request).await {
            Ok(stream) => stream,
            Err(e) => return (Err(e), false),
        };

        let mut forwarded = false;
        while let Some(event) = stream.next().await {
            match event {
                StreamEvent::TextDelta { delta } => {
                    forwarded |= emitter.forwards_deltas();
                    emitter.emit(RunEvent::TextDelta { turn, delta }).await;
                }
                StreamEvent::ToolCallStarted { call_id, name } => {
                    forwarded |= emitter.forwards_deltas();
                    emitter
                        .emit(RunEvent::ToolCallStarted {
                            turn,
                            call_id,
                            name,
                        })
                        .await;
                }
                StreamEvent::Completed(response) => return (Ok(response), forwarded),
                StreamEvent::Error(e) => return (Err(e), forwarded),
            }
        }
        (
            Err(BackendError::StreamInterrupted(
                "stream ended without completion".into(),
            )),
            forwarded,
        )
    }
}

/// Sort a response into messages, tool calls and at most one handoff.
///
/// Tool calls naming a declared handoff tool, or any `transfer_to_*` name that
/// is not a registered tool, become handoff requests.
pub fn classify(agent: &Agent, registry: &ToolRegistry, response: ModelResponse) -> TurnOutput {
    let mut output = TurnOutput::default();
    let push_handoff = |request: HandoffRequest, output: &mut TurnOutput| {
        if output.handoff.is_none() {
            output.handoff = Some(request);
        } else {
            warn!(agent = %agent.id, target = %request.target, "extra handoff request dropped");
        }
    };

    for item in response.items {
        match item {
            OutputItem::Message { text } => output.messages.push(text),
            OutputItem::Handoff(request) => push_handoff(request, &mut output),
            OutputItem::ToolCall {
                id,
                name,
                arguments,
            } => {
                if !registry.contains(&name) {
                    let target = agent
                        .handoff_for_tool(&name)
                        .map(|h| h.target.clone())
                        .or_else(|| name.strip_prefix(HANDOFF_TOOL_PREFIX).map(AgentId::from));
                    if let Some(target) = target {
                        push_handoff(HandoffRequest { call_id: id, target }, &mut output);
                        continue;
                    }
                }
                output.tool_calls.push(ToolCall {
                    id,
                    name,
                    arguments,
                    agent: agent.id.clone(),
                });
            }
        }
    }
    output
}
