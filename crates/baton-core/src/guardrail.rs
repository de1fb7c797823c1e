use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, RunId};
use crate::items::{FinalOutput, Item};

/// Which side of the model a guardrail guards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailKind {
    Input,
    Output,
}

impl std::fmt::Display for GuardrailKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Input => f.write_str("input"),
            Self::Output => f.write_str("output"),
        }
    }
}

/// The subject a guardrail inspects.
#[derive(Clone, Copy, Debug)]
pub enum GuardrailInput<'a> {
    /// The run's original input, before any model call.
    Input(&'a [Item]),
    /// The final output, before it is returned.
    Output(&'a FinalOutput),
}

impl GuardrailInput<'_> {
    pub fn kind(&self) -> GuardrailKind {
        match self {
            Self::Input(_) => GuardrailKind::Input,
            Self::Output(_) => GuardrailKind::Output,
        }
    }

    /// Plain-text view of the subject: user text for inputs, the output text otherwise.
    pub fn text(&self) -> String {
        match self {
            Self::Input(items) => items
                .iter()
                .filter_map(|item| match item {
                    Item::User { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Self::Output(output) => output.as_text(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct GuardrailContext {
    pub run_id: RunId,
    pub agent: AgentId,
    pub context: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum GuardrailVerdict {
    Pass,
    Trip {
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        info: Option<serde_json::Value>,
    },
}

impl GuardrailVerdict {
    pub fn trip(reason: impl Into<String>) -> Self {
        Self::Trip {
            reason: reason.into(),
            info: None,
        }
    }

    pub fn is_trip(&self) -> bool {
        matches!(self, Self::Trip { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GuardrailError {
    #[error("guardrail fault: {0}")]
    Fault(String),
}

/// An independent check that can veto a run.
#[async_trait]
pub trait Guardrail: Send + Sync {
    fn name(&self) -> &str;

    async fn check(
        &self,
        input: &GuardrailInput<'_>,
        ctx: &GuardrailContext,
    ) -> Result<GuardrailVerdict, GuardrailError>;
}

/// Outcome of one guardrail in a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GuardrailResult {
    pub guardrail: String,
    pub kind: GuardrailKind,
    pub verdict: GuardrailVerdict,
}

/// The trip that ended a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GuardrailTrip {
    pub guardrail: String,
    pub kind: GuardrailKind,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<serde_json::Value>,
}

impl GuardrailResult {
    pub fn as_trip(&self) -> Option<GuardrailTrip> {
        match &self.verdict {
            GuardrailVerdict::Pass => None,
            GuardrailVerdict::Trip { reason, info } => Some(GuardrailTrip {
                guardrail: self.guardrail.clone(),
                kind: self.kind,
                reason: reason.clone(),
                info: info.clone(),
            }),
        }
    }
}

type CheckFn = dyn Fn(&GuardrailInput<'_>, &GuardrailContext) -> Result<GuardrailVerdict, GuardrailError>
    + Send
    + Sync;

/// A guardrail backed by a synchronous closure.
#[derive(Clone)]
pub struct FnGuardrail {
    name: String,
    check: Arc<CheckFn>,
}

impl FnGuardrail {
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&GuardrailInput<'_>, &GuardrailContext) -> Result<GuardrailVerdict, GuardrailError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    /// Trips when the subject text contains `needle` (case-insensitive).
    pub fn deny_substring(name: impl Into<String>, needle: impl Into<String>) -> Self {
        let needle = needle.into().to_lowercase();
        Self::new(name, move |input, _ctx| {
            if input.text().to_lowercase().contains(&needle) {
                Ok(GuardrailVerdict::trip(format!("contains forbidden text \"{needle}\"")))
            } else {
                Ok(GuardrailVerdict::Pass)
            }
        })
    }
}

impl std::fmt::Debug for FnGuardrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnGuardrail")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Guardrail for FnGuardrail {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(
        &self,
        input: &GuardrailInput<'_>,
        ctx: &GuardrailContext,
    ) -> Result<GuardrailVerdict, GuardrailError> {
        (self.check)(input, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> GuardrailContext {
        GuardrailContext {
            run_id: RunId::new(),
            agent: AgentId::from("a"),
            context: serde_json::Value::Null,
        }
    }

    #[test]
    fn input_text_joins_user_items() {
        let items = vec![
            Item::user("first"),
            Item::assistant(AgentId::from("a"), "ignored"),
            Item::user("second"),
        ];
        let input = GuardrailInput::Input(&items);
        assert_eq!(input.kind(), GuardrailKind::Input);
        assert_eq!(input.text(), "first\nsecond");
    }

    #[tokio::test]
    async fn deny_substring_trips_case_insensitively() {
        let guard = FnGuardrail::deny_substring("no_secrets", "confidential");
        let output = FinalOutput::Text("This is CONFIDENTIAL data".into());
        let verdict = guard.check(&GuardrailInput::Output(&output), &ctx()).await.unwrap();
        assert!(verdict.is_trip());

        let clean = FinalOutput::Text("public data".into());
        let verdict = guard.check(&GuardrailInput::Output(&clean), &ctx()).await.unwrap();
        assert_eq!(verdict, GuardrailVerdict::Pass);
    }

    #[test]
    fn result_converts_to_trip() {
        let result = GuardrailResult {
            guardrail: "g".into(),
            kind: GuardrailKind::Output,
            verdict: GuardrailVerdict::trip("nope"),
        };
        let trip = result.as_trip().unwrap();
        assert_eq!(trip.guardrail, "g");
        assert_eq!(trip.reason, "nope");

        let pass = GuardrailResult {
            verdict: GuardrailVerdict::Pass,
            ..result
        };
        assert!(pass.as_trip().is_none());
    }

    #[test]
    fn verdict_serde_shape() {
        let json = serde_json::to_value(GuardrailVerdict::trip("bad")).unwrap();
        assert_eq!(json["verdict"], "trip");
        assert_eq!(json["reason"], "bad");
        assert!(json.get("info").is_none());
    }
}
