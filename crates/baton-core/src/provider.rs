use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::agent::ModelSettings;
use crate::errors::BackendError;
use crate::handoff::HandoffDefinition;
use crate::ids::AgentId;
use crate::items::{Item, OutputItem};
use crate::stream::StreamEvent;
use crate::tools::ToolDefinition;
use crate::usage::Usage;

pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Everything a backend needs for one model call.
#[derive(Clone, Debug, Serialize)]
pub struct ModelRequest {
    pub agent: AgentId,
    pub instructions: Option<String>,
    pub tools: Vec<ToolDefinition>,
    pub handoffs: Vec<HandoffDefinition>,
    pub history: Vec<Item>,
    pub settings: ModelSettings,
    pub output_schema: Option<serde_json::Value>,
}

/// Normalized result of one model call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub items: Vec<OutputItem>,
    pub usage: Usage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
}

impl ModelResponse {
    pub fn new(items: Vec<OutputItem>) -> Self {
        Self {
            items,
            usage: Usage::request(0, 0),
            response_id: None,
        }
    }

    /// A response holding a single assistant message.
    pub fn message(text: impl Into<String>) -> Self {
        Self::new(vec![OutputItem::message(text)])
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_response_id(mut self, id: impl Into<String>) -> Self {
        self.response_id = Some(id.into());
        self
    }
}

/// Contract the orchestrator requires from a model backend.
///
/// Implementations must be safe to call again with the same request after a
/// transient failure.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, BackendError>;

    /// Incremental variant. The stream ends with exactly one
    /// [`StreamEvent::Completed`] or [`StreamEvent::Error`].
    ///
    /// The default delivers the blocking response as a single completion.
    async fn stream(&self, request: &ModelRequest) -> Result<EventStream, BackendError> {
        let response = self.generate(request).await?;
        Ok(Box::pin(futures::stream::once(async move {
            StreamEvent::Completed(response)
        })))
    }
}
