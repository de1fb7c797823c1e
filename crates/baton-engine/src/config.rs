use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use baton_core::errors::BackendError;
use baton_core::session::SessionHandle;
use baton_core::trace::TraceSink;

/// Retry policy for transient backend failures.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            base_delay_ms: 500,
            max_delay_ms: 5000,
            jitter_factor: 0.2,
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based) after `error`.
    pub fn delay_for(&self, attempt: u32, error: &BackendError) -> Duration {
        let max = self.max_delay_ms as f64;

        // Respect a server hint, still bounded by max_delay.
        if let Some(hint) = error.suggested_delay() {
            return hint.min(Duration::from_millis(self.max_delay_ms));
        }

        let exp = self.base_delay_ms as f64 * 2.0_f64.powi(attempt.min(30) as i32);
        let capped = exp.min(max);

        let range = capped * self.jitter_factor.clamp(0.0, 1.0);
        let jitter = if range > 0.0 {
            rand::thread_rng().gen_range(-range..=range)
        } else {
            0.0
        };
        Duration::from_millis((capped + jitter).clamp(0.0, max) as u64)
    }
}

/// Engine-wide settings, shared by every run of a [`Runner`](crate::runner::Runner).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub default_max_turns: u32,
    pub retry: RetryPolicy,
    /// Per tool call. `None` disables the timeout.
    pub tool_timeout_ms: Option<u64>,
    /// Capacity of the run event channel.
    pub event_buffer: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            default_max_turns: 10,
            retry: RetryPolicy::default(),
            tool_timeout_ms: Some(120_000),
            event_buffer: 256,
        }
    }
}

impl RunnerConfig {
    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_ms.map(Duration::from_millis)
    }
}

/// Per-run options.
#[derive(Clone, Default)]
pub struct RunOptions {
    /// Overrides [`RunnerConfig::default_max_turns`].
    pub max_turns: Option<u32>,
    pub session: Option<SessionHandle>,
    /// Cancelling this token ends the run with `Cancelled`.
    pub cancel: Option<CancellationToken>,
    pub trace_sink: Option<Arc<dyn TraceSink>>,
    /// Opaque context handed to tools, guardrails and dynamic instructions.
    pub context: serde_json::Value,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = Some(max_turns);
        self
    }

    pub fn with_session(mut self, session: SessionHandle) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_trace_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.trace_sink = Some(sink);
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }
}

impl std::fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOptions")
            .field("max_turns", &self.max_turns)
            .field("session", &self.session)
            .field("cancel", &self.cancel.is_some())
            .field("trace_sink", &self.trace_sink.is_some())
            .field("context", &self.context)
            .finish()
    }
}
