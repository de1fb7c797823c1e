use std::sync::Arc;

use tracing::{info, warn};

use baton_core::agent::{Agent, AgentGraph};
use baton_core::ids::AgentId;
use baton_core::items::{HandoffMarker, HandoffRequest, Item};

/// A resolved transfer of control.
#[derive(Debug)]
pub struct HandoffTransition {
    pub destination: Arc<Agent>,
    pub marker: HandoffMarker,
    /// History the destination starts with.
    pub context: Vec<Item>,
}

/// The requested target is not among the source agent's declared handoffs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnauthorizedHandoff {
    pub source: AgentId,
    pub target: AgentId,
}

// Implemented by hand: thiserror would treat a field named `source` as the cause.
impl std::fmt::Display for UnauthorizedHandoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "agent {} is not allowed to hand off to {}",
            self.source, self.target
        )
    }
}

impl std::error::Error for UnauthorizedHandoff {}

/// Validate `request` against `source` and build the destination's starting context.
///
/// The marker is appended before the handoff's filter runs, so an identity
/// filter carries it forward.
pub fn resolve(
    graph: &AgentGraph,
    source: &Agent,
    request: &HandoffRequest,
    context: &[Item],
) -> Result<HandoffTransition, UnauthorizedHandoff> {
    let unauthorized = || UnauthorizedHandoff {
        source: source.id.clone(),
        target: request.target.clone(),
    };

    let Some(handoff) = source.handoff_to(&request.target) else {
        warn!(source = %source.id, target = %request.target, "undeclared handoff target");
        return Err(unauthorized());
    };
    let Some(destination) = graph.get(&request.target) else {
        warn!(source = %source.id, target = %request.target, "handoff target missing from graph");
        return Err(unauthorized());
    };

    let marker = HandoffMarker {
        call_id: request.call_id.clone(),
        source: source.id.clone(),
        destination: destination.id.clone(),
    };
    let mut carried = Vec::with_capacity(context.len() + 1);
    carried.extend_from_slice(context);
    carried.push(Item::Handoff(marker.clone()));
    let context = handoff.filter.apply(&carried);

    info!(
        source = %source.id,
        destination = %destination.id,
        carried = context.len(),
        "handoff resolved"
    );
    Ok(HandoffTransition {
        destination,
        marker,
        context,
    })
}
