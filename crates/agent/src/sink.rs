use std::sync::Arc;

use pagepilot_core::{ProgressEvent, ProgressSink, SinkMessage};
use tracing::info;

/// Forwards progress and results to the tracing subscriber.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn report_progress(&self, event: ProgressEvent) {
        info!(
            event_name = "agent.progress",
            task_id = %event.task_id,
            iteration = event.iteration,
            action = event.action.as_deref().unwrap_or(""),
            status = %event.status,
            "step {}: {}",
            event.iteration,
            event.status
        );
    }

    fn report_message(&self, message: SinkMessage) {
        match message {
            SinkMessage::Text { text } => {
                info!(event_name = "agent.message", kind = "text", "{text}");
            }
            SinkMessage::ActionResult { action, payload } => {
                info!(
                    event_name = "agent.message",
                    kind = "action_result",
                    action = %action,
                    "{}",
                    payload.describe()
                );
            }
        }
    }
}

/// Delivers every event to each inner sink in order.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ProgressSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn ProgressSink>>) -> Self {
        Self { sinks }
    }

    pub fn with(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl ProgressSink for FanoutSink {
    fn report_progress(&self, event: ProgressEvent) {
        for sink in &self.sinks {
            sink.report_progress(event.clone());
        }
    }

    fn report_message(&self, message: SinkMessage) {
        for sink in &self.sinks {
            sink.report_message(message.clone());
        }
    }
}
