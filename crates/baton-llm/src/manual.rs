use std::io::{BufRead, Write};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::debug;

use baton_core::errors::BackendError;
use baton_core::items::OutputItem;
use baton_core::provider::{EventStream, ModelBackend, ModelRequest, ModelResponse};
use baton_core::stream::StreamEvent;
use baton_core::usage::Usage;

pub const RESPONSE_ID: &str = "manual-response";

pub type PrintFn = Arc<dyn Fn(&str) + Send + Sync>;
pub type ResponseProvider =
    Arc<dyn Fn() -> BoxFuture<'static, Result<String, BackendError>> + Send + Sync>;

/// A backend where a human plays the model.
///
/// Each call prints the request context through the print function and waits
/// for the response provider to supply the next assistant message.
#[derive(Clone)]
pub struct ManualBackend {
    print_fn: PrintFn,
    response_provider: ResponseProvider,
    directives: bool,
}

impl Default for ManualBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualBackend {
    /// Prints to stdout and reads one line from stdin per call.
    pub fn new() -> Self {
        Self {
            print_fn: Arc::new(|line| println!("{line}")),
            response_provider: Arc::new(|| read_stdin_line().boxed()),
            directives: false,
        }
    }

    pub fn with_print_fn(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.print_fn = Arc::new(f);
        self
    }

    pub fn with_response_provider<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<String, BackendError>> + Send + 'static,
    {
        self.response_provider = Arc::new(move || f().boxed());
        self
    }

    /// Interpret `/tool <name> <json>` and `/handoff <agent>` lines in responses.
    pub fn with_directives(mut self, enabled: bool) -> Self {
        self.directives = enabled;
        self
    }

    fn print(&self, line: &str) {
        (self.print_fn)(line);
    }

    async fn interact(&self, request: &ModelRequest) -> Result<ModelResponse, BackendError> {
        self.print("=== Manual model interaction ===");
        match &request.instructions {
            Some(text) if !text.is_empty() => {
                self.print("System instructions:");
                self.print(text);
            }
            _ => self.print("System instructions: <none>"),
        }

        self.print("Conversation items:");
        let history = serde_json::to_string_pretty(&request.history)
            .map_err(|e| BackendError::InvalidRequest(e.to_string()))?;
        self.print(&history);

        if request.tools.is_empty() {
            self.print("Available tools: none");
        } else {
            self.print("Available tools:");
            for tool in &request.tools {
                if tool.description.is_empty() {
                    self.print(&format!("  - {}", tool.name));
                } else {
                    self.print(&format!("  - {}: {}", tool.name, tool.description));
                }
            }
        }

        if request.handoffs.is_empty() {
            self.print("Available handoffs: none");
        } else {
            self.print("Available handoffs:");
            for handoff in &request.handoffs {
                if handoff.description.is_empty() {
                    self.print(&format!("  - {} via `{}`", handoff.target, handoff.tool_name));
                } else {
                    self.print(&format!(
                        "  - {} via `{}`: {}",
                        handoff.target, handoff.tool_name, handoff.description
                    ));
                }
            }
        }

        self.print("Provide the next assistant message.");
        let text = (self.response_provider)().await?;
        debug!(agent = %request.agent, chars = text.len(), "manual response received");

        let items = if self.directives {
            parse_directives(&text)
        } else {
            vec![OutputItem::message(text)]
        };
        Ok(ModelResponse {
            items,
            usage: Usage::default(),
            response_id: Some(RESPONSE_ID.to_string()),
        })
    }
}

impl std::fmt::Debug for ManualBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualBackend")
            .field("directives", &self.directives)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ModelBackend for ManualBackend {
    fn name(&self) -> &str {
        "manual"
    }

    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, BackendError> {
        self.interact(request).await
    }

    async fn stream(&self, request: &ModelRequest) -> Result<EventStream, BackendError> {
        let response = self.interact(request).await?;
        Ok(Box::pin(futures::stream::once(async move {
            StreamEvent::Completed(response)
        })))
    }
}

/// Split a response into output items.
///
/// Directive lines become tool calls or handoffs; all other lines form a single
/// message. Arguments that are not valid JSON are passed through as a string so
/// the tool's schema check reports them.
pub fn parse_directives(text: &str) -> Vec<OutputItem> {
    let mut items = Vec::new();
    let mut message = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("/tool ") {
            let rest = rest.trim();
            let (name, raw_args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            let raw_args = raw_args.trim();
            let arguments = if raw_args.is_empty() {
                serde_json::json!({})
            } else {
                serde_json::from_str(raw_args)
                    .unwrap_or_else(|_| serde_json::Value::String(raw_args.to_string()))
            };
            items.push(OutputItem::tool_call(name, arguments));
        } else if let Some(target) = trimmed.strip_prefix("/handoff ") {
            items.push(OutputItem::handoff(target.trim()));
        } else {
            message.push(line);
        }
    }
    let message = message.join("\n");
    if !message.trim().is_empty() {
        items.insert(0, OutputItem::message(message.trim()));
    }
    items
}

async fn read_stdin_line() -> Result<String, BackendError> {
    tokio::task::spawn_blocking(|| {
        let mut stdout = std::io::stdout();
        let _ = write!(stdout, "Manual response: ");
        let _ = stdout.flush();
        let mut line = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| BackendError::Network(format!("stdin: {e}")))?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    })
    .await
    .map_err(|e| BackendError::Network(format!("stdin reader failed: {e}")))?
}
