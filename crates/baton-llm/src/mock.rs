use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;

use baton_core::errors::BackendError;
use baton_core::items::OutputItem;
use baton_core::provider::{EventStream, ModelBackend, ModelRequest, ModelResponse};
use baton_core::stream::StreamEvent;

/// Pre-programmed responses for deterministic testing without a real model.
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// A complete response. Streamed as one text delta per message, then completion.
    Reply(ModelResponse),
    /// Yield exactly these events when streamed. `generate` returns the terminal one.
    Stream(Vec<StreamEvent>),
    /// Fail the call itself.
    Error(BackendError),
    /// Wait a duration, then resolve the inner response.
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    pub fn text(text: &str) -> Self {
        Self::Reply(ModelResponse::message(text))
    }

    pub fn items(items: Vec<OutputItem>) -> Self {
        Self::Reply(ModelResponse::new(items))
    }

    pub fn tool_call(name: &str, arguments: serde_json::Value) -> Self {
        Self::items(vec![OutputItem::tool_call(name, arguments)])
    }

    pub fn handoff(target: &str) -> Self {
        Self::items(vec![OutputItem::handoff(target)])
    }

    /// A stream that emits partial text and then fails mid-flight.
    pub fn stream_error(partial: &str, error: BackendError) -> Self {
        Self::Stream(vec![
            StreamEvent::TextDelta {
                delta: partial.to_string(),
            },
            StreamEvent::Error(error),
        ])
    }

    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Backend that replays pre-programmed responses in order and records every request.
pub struct MockBackend {
    responses: Mutex<VecDeque<MockResponse>>,
    requests: Mutex<Vec<ModelRequest>>,
    call_count: AtomicUsize,
}

impl MockBackend {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Every request received so far, in call order.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().clone()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().len()
    }

    fn next(&self, request: &ModelRequest) -> Result<MockResponse, BackendError> {
        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);
        self.requests.lock().push(request.clone());
        self.responses.lock().pop_front().ok_or_else(|| {
            BackendError::InvalidRequest(format!(
                "MockBackend: no response configured for call {idx}"
            ))
        })
    }
}

enum Settled {
    Reply(ModelResponse),
    Stream(Vec<StreamEvent>),
    Error(BackendError),
}

/// Unrolls nested delays iteratively.
async fn settle(mut response: MockResponse) -> Settled {
    loop {
        match response {
            MockResponse::Reply(r) => return Settled::Reply(r),
            MockResponse::Stream(events) => return Settled::Stream(events),
            MockResponse::Error(e) => return Settled::Error(e),
            MockResponse::Delay(duration, inner) => {
                tokio::time::sleep(duration).await;
                response = *inner;
            }
        }
    }
}

#[async_trait]
impl ModelBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, BackendError> {
        let response = self.next(request)?;
        match settle(response).await {
            Settled::Reply(response) => Ok(response),
            Settled::Error(e) => Err(e),
            Settled::Stream(events) => {
                for event in events {
                    match event {
                        StreamEvent::Completed(response) => return Ok(response),
                        StreamEvent::Error(e) => return Err(e),
                        _ => {}
                    }
                }
                Err(BackendError::StreamInterrupted(
                    "stream ended without completion".into(),
                ))
            }
        }
    }

    async fn stream(&self, request: &ModelRequest) -> Result<EventStream, BackendError> {
        let response = self.next(request)?;
        let events = match settle(response).await {
            Settled::Reply(response) => {
                let mut events: Vec<StreamEvent> = response
                    .items
                    .iter()
                    .filter_map(|item| match item {
                        OutputItem::Message { text } => Some(StreamEvent::TextDelta {
                            delta: text.clone(),
                        }),
                        OutputItem::ToolCall { id, name, .. } => Some(StreamEvent::ToolCallStarted {
                            call_id: id.clone(),
                            name: name.clone(),
                        }),
                        OutputItem::Handoff(_) => None,
                    })
                    .collect();
                events.push(StreamEvent::Completed(response));
                events
            }
            Settled::Error(e) => return Err(e),
            Settled::Stream(events) => events,
        };
        Ok(Box::pin(stream::iter(events)))
    }
}
