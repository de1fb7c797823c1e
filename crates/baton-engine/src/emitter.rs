use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use baton_core::events::RunEvent;
use baton_core::trace::TraceSink;

/// Publishes run events to the stream consumer and the optional trace sink.
#[derive(Clone)]
pub struct EventEmitter {
    tx: mpsc::Sender<RunEvent>,
    sink: Option<Arc<dyn TraceSink>>,
    forward_deltas: bool,
}

impl EventEmitter {
    pub fn new(
        tx: mpsc::Sender<RunEvent>,
        sink: Option<Arc<dyn TraceSink>>,
        forward_deltas: bool,
    ) -> Self {
        Self {
            tx,
            sink,
            forward_deltas,
        }
    }

    pub fn forwards_deltas(&self) -> bool {
        self.forward_deltas
    }

    /// Deliver one event. A missing consumer never fails the run.
    pub async fn emit(&self, event: RunEvent) {
        if event.is_delta() {
            if !self.forward_deltas {
                return;
            }
        } else if let Some(sink) = &self.sink {
            sink.record(&event);
        }

        let event_type = event.event_type();
        if self.tx.send(event).await.is_err() {
            debug!(event_type, "no run event receiver, event dropped");
        }
    }
}
