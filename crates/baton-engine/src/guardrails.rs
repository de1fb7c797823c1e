use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tracing::{debug, warn};

use baton_core::guardrail::{
    Guardrail, GuardrailContext, GuardrailInput, GuardrailResult, GuardrailTrip, GuardrailVerdict,
};

use crate::invoker::panic_message;

/// Results of evaluating one guardrail set.
#[derive(Clone, Debug, Default)]
pub struct GuardrailEvaluation {
    /// One result per guardrail, in completion order.
    pub results: Vec<GuardrailResult>,
    /// The first trip to complete, if any.
    pub trip: Option<GuardrailTrip>,
}

/// Run every guardrail against `input` concurrently and wait for all of them.
///
/// A guardrail that errors or panics counts as tripped.
pub async fn evaluate(
    guardrails: &[Arc<dyn Guardrail>],
    input: GuardrailInput<'_>,
    ctx: &GuardrailContext,
) -> GuardrailEvaluation {
    let kind = input.kind();
    let mut pending: FuturesUnordered<_> = guardrails
        .iter()
        .map(|guardrail| {
            let input = &input;
            async move {
                let name = guardrail.name().to_string();
                let verdict = match AssertUnwindSafe(guardrail.check(input, ctx))
                    .catch_unwind()
                    .await
                {
                    Ok(Ok(verdict)) => verdict,
                    Ok(Err(e)) => {
                        warn!(guardrail = %name, error = %e, "guardrail faulted");
                        GuardrailVerdict::trip(format!("guardrail fault: {e}"))
                    }
                    Err(panic) => {
                        let msg = panic_message(&panic);
                        warn!(guardrail = %name, panic = %msg, "guardrail panicked");
                        GuardrailVerdict::trip(format!("guardrail fault: panicked: {msg}"))
                    }
                };
                GuardrailResult {
                    guardrail: name,
                    kind,
                    verdict,
                }
            }
        })
        .collect();

    let mut evaluation = GuardrailEvaluation::default();
    while let Some(result) = pending.next().await {
        debug!(guardrail = %result.guardrail, %kind, tripped = result.verdict.is_trip(), "guardrail evaluated");
        if evaluation.trip.is_none() {
            evaluation.trip = result.as_trip();
        }
        evaluation.results.push(result);
    }
    evaluation
}
