use crate::events::RunEvent;

/// Receives the structured event stream of every run it is attached to.
///
/// Called synchronously from the orchestrator, so implementations should not block.
pub trait TraceSink: Send + Sync {
    fn record(&self, event: &RunEvent);
}
