use crate::errors::BackendError;
use crate::ids::ToolCallId;
use crate::provider::ModelResponse;

/// Events emitted by [`ModelBackend::stream`](crate::provider::ModelBackend::stream).
///
/// Ordering contract: `(TextDelta | ToolCallStarted)* → (Completed | Error)`.
#[derive(Clone, Debug)]
pub enum StreamEvent {
    TextDelta { delta: String },
    ToolCallStarted { call_id: ToolCallId, name: String },
    Completed(ModelResponse),
    Error(BackendError),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Error(_))
    }

    /// Whether the event carries partial output a consumer may already have seen.
    pub fn is_delta(&self) -> bool {
        matches!(self, Self::TextDelta { .. } | Self::ToolCallStarted { .. })
    }
}
