use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, instrument, warn};

use baton_core::agent::{Agent, AgentGraph};
use baton_core::events::RunEvent;
use baton_core::guardrail::{GuardrailContext, GuardrailInput, GuardrailTrip};
use baton_core::ids::{AgentId, RunId};
use baton_core::items::{FinalOutput, Item};
use baton_core::provider::ModelBackend;
use baton_core::result::{RunOutcome, RunResult};
use baton_core::session::SessionHandle;
use baton_core::tools::validate_value;

use crate::config::{RunOptions, RunnerConfig};
use crate::emitter::EventEmitter;
use crate::error::RunError;
use crate::guardrails::{self, GuardrailEvaluation};
use crate::handoff;
use crate::invoker::{InvokeOutcome, InvokeScope, ToolInvoker};
use crate::registry::ToolRegistry;
use crate::state::RunState;
use crate::turn::{self, Delivery, TurnExecutor};

/// The input a run starts from.
#[derive(Clone, Debug, PartialEq)]
pub enum RunInput {
    Text(String),
    Items(Vec<Item>),
}

impl RunInput {
    pub fn into_items(self) -> Vec<Item> {
        match self {
            Self::Text(text) => vec![Item::user(text)],
            Self::Items(items) => items,
        }
    }
}

impl From<&str> for RunInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for RunInput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<Item>> for RunInput {
    fn from(items: Vec<Item>) -> Self {
        Self::Items(items)
    }
}

/// Runs agents of one graph against one backend.
///
/// Cheap to clone. Independent runs share nothing mutable.
#[derive(Clone)]
pub struct Runner {
    graph: Arc<AgentGraph>,
    backend: Arc<dyn ModelBackend>,
    config: RunnerConfig,
}

impl Runner {
    pub fn new(graph: AgentGraph, backend: Arc<dyn ModelBackend>, config: RunnerConfig) -> Self {
        Self {
            graph: Arc::new(graph),
            backend,
            config,
        }
    }

    pub fn graph(&self) -> &AgentGraph {
        &self.graph
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run to completion. Intermediate events still reach the trace sink.
    pub async fn run(
        &self,
        agent: impl Into<AgentId>,
        input: impl Into<RunInput>,
        options: RunOptions,
    ) -> Result<RunResult, RunError> {
        self.start(agent.into(), input.into(), options, Delivery::Blocking)?
            .finish()
            .await
    }

    /// Start a run whose events are delivered as they happen.
    pub fn run_streamed(
        &self,
        agent: impl Into<AgentId>,
        input: impl Into<RunInput>,
        options: RunOptions,
    ) -> Result<RunStream, RunError> {
        self.start(agent.into(), input.into(), options, Delivery::Streaming)
    }

    fn start(
        &self,
        agent_id: AgentId,
        input: RunInput,
        options: RunOptions,
        delivery: Delivery,
    ) -> Result<RunStream, RunError> {
        let agent = self
            .graph
            .get(&agent_id)
            .ok_or(RunError::UnknownAgent(agent_id))?;

        // The run gets its own token so dropping the stream never cancels the caller's.
        let cancel = options
            .cancel
            .map(|parent| parent.child_token())
            .unwrap_or_default();
        let (tx, rx) = mpsc::channel(self.config.event_buffer.max(1));
        let emitter = EventEmitter::new(tx, options.trace_sink, delivery == Delivery::Streaming);
        let run_id = RunId::new();

        let run = RunLoop {
            graph: Arc::clone(&self.graph),
            executor: TurnExecutor::new(Arc::clone(&self.backend), self.config.retry.clone()),
            invoker: ToolInvoker::new(self.config.tool_timeout()),
            emitter,
            cancel: cancel.clone(),
            delivery,
            max_turns: options.max_turns.unwrap_or(self.config.default_max_turns),
            session: options.session,
            context: options.context,
        };
        let handle = tokio::spawn(run.execute(run_id.clone(), agent, input.into_items()));

        Ok(RunStream {
            run_id,
            events: ReceiverStream::new(rx),
            handle,
            guard: Some(cancel.clone().drop_guard()),
            cancel,
        })
    }
}

/// Events of one run, ending with [`RunEvent::RunFinished`].
///
/// Dropping the stream, or a pending [`finish`](RunStream::finish), cancels the run.
/// Use [`detach`](RunStream::detach) to let it continue unobserved.
pub struct RunStream {
    run_id: RunId,
    events: ReceiverStream<RunEvent>,
    handle: JoinHandle<Result<RunResult, RunError>>,
    cancel: CancellationToken,
    guard: Option<DropGuard>,
}

impl RunStream {
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Request cancellation. The run ends with `Cancelled` at its next await point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drain the remaining events and return the final result.
    pub async fn finish(mut self) -> Result<RunResult, RunError> {
        while self.events.next().await.is_some() {}
        let joined = (&mut self.handle).await;
        self.disarm();
        joined.map_err(|e| RunError::TaskFailed(e.to_string()))?
    }

    /// Let the run continue without this stream. Its events are discarded.
    pub fn detach(mut self) -> JoinHandle<Result<RunResult, RunError>> {
        self.disarm();
        self.handle
    }

    fn disarm(&mut self) {
        if let Some(guard) = self.guard.take() {
            guard.disarm();
        }
    }
}

impl Stream for RunStream {
    type Item = RunEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<RunEvent>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}

/// Terminal outcome plus whether the run's items go to the session.
type Termination = (RunOutcome, bool);

/// The state machine shared by both delivery modes.
struct RunLoop {
    graph: Arc<AgentGraph>,
    executor: TurnExecutor,
    invoker: ToolInvoker,
    emitter: EventEmitter,
    cancel: CancellationToken,
    delivery: Delivery,
    max_turns: u32,
    session: Option<SessionHandle>,
    context: serde_json::Value,
}

impl RunLoop {
    #[instrument(name = "run", skip_all, fields(run_id = %run_id, agent = %agent.id))]
    async fn execute(
        self,
        run_id: RunId,
        agent: Arc<Agent>,
        input: Vec<Item>,
    ) -> Result<RunResult, RunError> {
        self.emitter
            .emit(RunEvent::RunStarted {
                run_id: run_id.clone(),
                agent: agent.id.clone(),
                max_turns: self.max_turns,
            })
            .await;

        let history = match &self.session {
            Some(session) => session.store.load(&session.id).await?,
            None => Vec::new(),
        };
        info!(
            max_turns = self.max_turns,
            session_items = history.len(),
            "run started"
        );

        let mut state = RunState::new(run_id, agent, history, input.clone());
        for item in input {
            self.append(&mut state, item).await;
        }

        let (outcome, persist) = self.drive(&mut state).await;

        if persist {
            if let Some(session) = &self.session {
                let items = state.session_items_to_append();
                session.store.append(&session.id, &items).await?;
                debug!(session = %session.id, items = items.len(), "session updated");
            }
        }

        let result = state.into_result(outcome);
        info!(
            outcome = result.outcome.kind(),
            turns = result.turns,
            last_agent = %result.last_agent,
            "run finished"
        );
        self.emitter
            .emit(RunEvent::RunFinished {
                result: Box::new(result.clone()),
            })
            .await;
        Ok(result)
    }

    async fn drive(&self, state: &mut RunState) -> Termination {
        if self.max_turns == 0 {
            return (RunOutcome::MaxTurnsExceeded { max_turns: 0 }, true);
        }

        let starting = Arc::clone(&state.agent);
        if !starting.input_guardrails.is_empty() {
            let ctx = self.guardrail_context(state);
            let evaluation = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return (RunOutcome::Cancelled, true),
                eval = guardrails::evaluate(
                    &starting.input_guardrails,
                    GuardrailInput::Input(&state.input),
                    &ctx,
                ) => eval,
            };
            if let Some(trip) = self.record_guardrails(state, evaluation).await {
                warn!(guardrail = %trip.guardrail, reason = %trip.reason, "input guardrail tripped");
                return (RunOutcome::GuardrailTripped { trip }, false);
            }
        }

        loop {
            if self.cancel.is_cancelled() {
                return (RunOutcome::Cancelled, true);
            }
            if state.turn >= self.max_turns {
                warn!(max_turns = self.max_turns, "max turns exceeded");
                return (
                    RunOutcome::MaxTurnsExceeded {
                        max_turns: self.max_turns,
                    },
                    true,
                );
            }
            state.turn += 1;
            let turn = state.turn;
            let agent = Arc::clone(&state.agent);
            let registry = ToolRegistry::for_agent(&agent);

            self.emitter
                .emit(RunEvent::TurnStarted {
                    turn,
                    agent: agent.id.clone(),
                })
                .await;

            let request = TurnExecutor::build_request(&agent, &registry, &state.context, &self.context);
            let response = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return (RunOutcome::Cancelled, true),
                response = self.executor.run_turn(&request, turn, self.delivery, &self.emitter) => response,
            };
            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    return (
                        RunOutcome::BackendFailure {
                            error: (&e).into(),
                        },
                        true,
                    )
                }
            };

            state.usage += response.usage;
            self.emitter
                .emit(RunEvent::ModelCallCompleted {
                    turn,
                    agent: agent.id.clone(),
                    usage: response.usage,
                    response_id: response.response_id.clone(),
                    output_items: response.items.len(),
                })
                .await;

            let output = turn::classify(&agent, &registry, response);

            for text in &output.messages {
                self.append(state, Item::assistant(agent.id.clone(), text.as_str()))
                    .await;
            }

            // Tool calls resolve before anything else the turn asked for.
            if !output.tool_calls.is_empty() {
                for call in &output.tool_calls {
                    self.append(state, Item::ToolCall(call.clone())).await;
                }
                let scope = InvokeScope {
                    run_id: &state.run_id,
                    agent: &agent.id,
                    context: &self.context,
                    cancel: &self.cancel,
                    emitter: &self.emitter,
                };
                let outcome = self.invoker.invoke(&registry, &output.tool_calls, scope).await;
                let (results, cancelled) = match outcome {
                    InvokeOutcome::Completed(results) => (results, false),
                    InvokeOutcome::Cancelled(results) => (results, true),
                };
                for result in results {
                    self.append(state, Item::ToolResult(result)).await;
                }
                if cancelled {
                    return (RunOutcome::Cancelled, true);
                }
            }

            if let Some(request) = &output.handoff {
                let transition = match handoff::resolve(&self.graph, &agent, request, &state.context) {
                    Ok(transition) => transition,
                    Err(e) => {
                        return (
                            RunOutcome::UnauthorizedHandoff {
                                source: e.source,
                                target: e.target,
                            },
                            true,
                        )
                    }
                };
                let marker = Item::Handoff(transition.marker);
                state.transcript.push(marker.clone());
                self.emitter.emit(RunEvent::ItemAppended { item: marker }).await;

                state.context = transition.context;
                state.agent = transition.destination;
                self.emitter
                    .emit(RunEvent::HandoffOccurred {
                        source: agent.id.clone(),
                        destination: state.agent.id.clone(),
                        carried_items: state.context.len(),
                    })
                    .await;
                self.turn_completed(turn, &agent.id).await;
                continue;
            }

            if !output.tool_calls.is_empty() {
                self.turn_completed(turn, &agent.id).await;
                continue;
            }

            let Some(text) = output.final_text() else {
                debug!(turn, "model returned no output items");
                self.turn_completed(turn, &agent.id).await;
                continue;
            };

            let final_output = match shape_final_output(&agent, text) {
                Ok(output) => output,
                Err(reason) => {
                    warn!(%reason, "final output rejected");
                    return (RunOutcome::InvalidOutput { reason }, true);
                }
            };
            self.turn_completed(turn, &agent.id).await;

            if !agent.output_guardrails.is_empty() {
                let ctx = self.guardrail_context(state);
                let evaluation = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return (RunOutcome::Cancelled, true),
                    eval = guardrails::evaluate(
                        &agent.output_guardrails,
                        GuardrailInput::Output(&final_output),
                        &ctx,
                    ) => eval,
                };
                if let Some(trip) = self.record_guardrails(state, evaluation).await {
                    warn!(guardrail = %trip.guardrail, reason = %trip.reason, "output guardrail tripped");
                    return (RunOutcome::GuardrailTripped { trip }, true);
                }
            }

            return (
                RunOutcome::Success {
                    output: final_output,
                },
                true,
            );
        }
    }

    async fn append(&self, state: &mut RunState, item: Item) {
        state.append(item.clone());
        self.emitter.emit(RunEvent::ItemAppended { item }).await;
    }

    async fn turn_completed(&self, turn: u32, agent: &AgentId) {
        self.emitter
            .emit(RunEvent::TurnCompleted {
                turn,
                agent: agent.clone(),
            })
            .await;
    }

    fn guardrail_context(&self, state: &RunState) -> GuardrailContext {
        GuardrailContext {
            run_id: state.run_id.clone(),
            agent: state.agent.id.clone(),
            context: self.context.clone(),
        }
    }

    /// Keep every result in the run and return the reported trip, if any.
    async fn record_guardrails(
        &self,
        state: &mut RunState,
        evaluation: GuardrailEvaluation,
    ) -> Option<GuardrailTrip> {
        for result in evaluation.results {
            state.guardrail_results.push(result.clone());
            self.emitter
                .emit(RunEvent::GuardrailEvaluated { result })
                .await;
        }
        evaluation.trip
    }
}

/// Shape the final message according to the agent's output schema.
fn shape_final_output(agent: &Agent, text: &str) -> Result<FinalOutput, String> {
    let Some(schema) = &agent.output_schema else {
        return Ok(FinalOutput::Text(text.to_string()));
    };
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| format!("final output is not valid JSON: {e}"))?;
    validate_value(schema, &value)
        .map_err(|e| format!("final output does not match the output schema: {e}"))?;
    Ok(FinalOutput::Structured(value))
}
