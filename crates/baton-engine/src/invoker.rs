use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use baton_core::events::RunEvent;
use baton_core::ids::{AgentId, RunId};
use baton_core::items::{ToolCall, ToolFailureKind, ToolResult};
use baton_core::tools::{Tool, ToolContext, ToolError};

use crate::emitter::EventEmitter;
use crate::registry::ToolRegistry;

/// Run-level inputs shared by every call in one batch.
pub struct InvokeScope<'a> {
    pub run_id: &'a RunId,
    pub agent: &'a AgentId,
    pub context: &'a serde_json::Value,
    pub cancel: &'a CancellationToken,
    pub emitter: &'a EventEmitter,
}

#[derive(Debug)]
pub enum InvokeOutcome {
    /// One result per call, in call order.
    Completed(Vec<ToolResult>),
    /// The run was cancelled. Holds the results that finished first, in call order.
    Cancelled(Vec<ToolResult>),
}

/// Resolves, validates and executes tool calls.
#[derive(Clone, Debug, Default)]
pub struct ToolInvoker {
    timeout: Option<Duration>,
}

impl ToolInvoker {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// Execute `calls` concurrently. A failing call never affects its siblings.
    pub async fn invoke(
        &self,
        registry: &ToolRegistry,
        calls: &[ToolCall],
        scope: InvokeScope<'_>,
    ) -> InvokeOutcome {
        let mut slots: Vec<Option<ToolResult>> = vec![None; calls.len()];
        let mut pending = FuturesUnordered::new();
        let mut aborts: Vec<AbortHandle> = Vec::new();

        for (idx, call) in calls.iter().enumerate() {
            scope
                .emitter
                .emit(RunEvent::ToolStarted {
                    call_id: call.id.clone(),
                    tool: call.name.clone(),
                    agent: scope.agent.clone(),
                })
                .await;

            let tool = match prepare(registry, call) {
                Ok(tool) => tool,
                Err(result) => {
                    finish_event(scope.emitter, &result, Duration::ZERO).await;
                    slots[idx] = Some(result);
                    continue;
                }
            };

            let ctx = ToolContext {
                run_id: scope.run_id.clone(),
                agent: scope.agent.clone(),
                call_id: call.id.clone(),
                context: scope.context.clone(),
                abort_signal: scope.cancel.child_token(),
            };
            let handle = tokio::spawn(execute(
                tool,
                call.clone(),
                ctx,
                self.timeout,
                scope.emitter.clone(),
            ));
            aborts.push(handle.abort_handle());
            pending.push(async move { (idx, handle.await) });
        }

        loop {
            tokio::select! {
                biased;
                _ = scope.cancel.cancelled() => {
                    for handle in &aborts {
                        handle.abort();
                    }
                    let unfinished = slots.iter().filter(|s| s.is_none()).count();
                    warn!(unfinished, "run cancelled while tools were in flight");
                    return InvokeOutcome::Cancelled(slots.into_iter().flatten().collect());
                }
                next = pending.next() => match next {
                    Some((idx, Ok(result))) => slots[idx] = Some(result),
                    Some((idx, Err(join_err))) => {
                        let call = &calls[idx];
                        error!(tool = %call.name, error = %join_err, "tool task failed");
                        let kind = if join_err.is_panic() {
                            ToolFailureKind::Panicked
                        } else {
                            ToolFailureKind::ExecutionFailed
                        };
                        slots[idx] = Some(ToolResult::failure(call, kind, "tool execution failed"));
                    }
                    None => break,
                },
            }
        }

        InvokeOutcome::Completed(slots.into_iter().flatten().collect())
    }
}

/// Resolve and validate one call, or produce its failure result.
fn prepare(registry: &ToolRegistry, call: &ToolCall) -> Result<Arc<dyn Tool>, ToolResult> {
    let Some(tool) = registry.get(&call.name) else {
        debug!(tool = %call.name, "unknown tool requested");
        return Err(ToolResult::failure(
            call,
            ToolFailureKind::UnknownTool,
            format!("unknown tool: {}", call.name),
        ));
    };
    if let Err(e) = tool.validate_arguments(&call.arguments) {
        debug!(tool = %call.name, error = %e, "tool arguments rejected");
        return Err(ToolResult::failure(
            call,
            ToolFailureKind::InvalidArguments,
            e.to_string(),
        ));
    }
    Ok(tool)
}

async fn execute(
    tool: Arc<dyn Tool>,
    call: ToolCall,
    ctx: ToolContext,
    timeout: Option<Duration>,
    emitter: EventEmitter,
) -> ToolResult {
    let start = Instant::now();
    let fut = AssertUnwindSafe(tool.invoke(call.arguments.clone(), &ctx)).catch_unwind();
    let outcome = match timeout {
        Some(limit) => tokio::time::timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    };

    let result = match outcome {
        Some(Ok(Ok(value))) => ToolResult::success(&call, value),
        Some(Ok(Err(e))) => {
            let kind = match &e {
                ToolError::InvalidArguments(_) => ToolFailureKind::InvalidArguments,
                ToolError::Timeout(_) => ToolFailureKind::TimedOut,
                _ => ToolFailureKind::ExecutionFailed,
            };
            ToolResult::failure(&call, kind, e.to_string())
        }
        Some(Err(panic)) => {
            let msg = panic_message(&panic);
            error!(tool = %call.name, panic = %msg, "tool panicked during execution");
            ToolResult::failure(&call, ToolFailureKind::Panicked, "internal error: tool crashed")
        }
        None => {
            let limit = timeout.unwrap_or_default();
            warn!(tool = %call.name, timeout_ms = limit.as_millis() as u64, "tool timed out");
            ToolResult::failure(
                &call,
                ToolFailureKind::TimedOut,
                format!("tool timed out after {}ms", limit.as_millis()),
            )
        }
    };

    finish_event(&emitter, &result, start.elapsed()).await;
    result
}

async fn finish_event(emitter: &EventEmitter, result: &ToolResult, duration: Duration) {
    emitter
        .emit(RunEvent::ToolFinished {
            call_id: result.call_id.clone(),
            tool: result.tool_name.clone(),
            failed: result.is_failure(),
            duration_ms: duration.as_millis() as u64,
        })
        .await;
}

pub(crate) fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    panic
        .downcast_ref::<String>()
        .map(|s| s.as_str())
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic")
        .to_string()
}
