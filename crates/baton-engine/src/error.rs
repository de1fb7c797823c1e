use baton_core::ids::AgentId;
use baton_core::session::SessionError;

/// Conditions that prevent a run from producing a [`RunResult`](baton_core::result::RunResult).
///
/// Fatal outcomes of a run that did start are reported as
/// [`RunOutcome`](baton_core::result::RunOutcome) variants instead.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("unknown agent: {0}")]
    UnknownAgent(AgentId),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("run task failed: {0}")]
    TaskFailed(String),
}
