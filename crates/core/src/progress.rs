use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::action::ActionPayload;
use crate::domain::task::TaskId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProgressStatus {
    Analyzing,
    Executing { action: String },
    Error { detail: String },
    TaskComplete { summary: String },
    MaxIterationsReached,
    Cancelled,
}

impl ProgressStatus {
    /// Short human label shown next to the step number.
    pub fn label(&self) -> String {
        match self {
            Self::Analyzing => "Analyzing task".to_string(),
            Self::Executing { action } => format!("Executing {action}"),
            Self::Error { .. } => "Error".to_string(),
            Self::TaskComplete { .. } => "Task Complete".to_string(),
            Self::MaxIterationsReached => "Max iterations reached".to_string(),
            Self::Cancelled => "Cancelled".to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub event_id: String,
    pub task_id: TaskId,
    pub iteration: u32,
    pub action: Option<String>,
    pub status: ProgressStatus,
    pub occurred_at: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(task_id: TaskId, iteration: u32, status: ProgressStatus) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            task_id,
            iteration,
            action: None,
            status,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SinkMessage {
    Text { text: String },
    ActionResult { action: String, payload: ActionPayload },
}

impl SinkMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Receiver for progress and result messages. Calls are fire-and-forget: implementations
/// must return promptly and swallow their own failures.
pub trait ProgressSink: Send + Sync {
    fn report_progress(&self, event: ProgressEvent);
    fn report_message(&self, message: SinkMessage);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn report_progress(&self, _event: ProgressEvent) {}

    fn report_message(&self, _message: SinkMessage) {}
}

#[derive(Clone, Default)]
pub struct InMemoryProgressSink {
    events: Arc<Mutex<Vec<ProgressEvent>>>,
    messages: Arc<Mutex<Vec<SinkMessage>>>,
}

impl InMemoryProgressSink {
    pub fn events(&self) -> Vec<ProgressEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn messages(&self) -> Vec<SinkMessage> {
        match self.messages.lock() {
            Ok(messages) => messages.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn text_messages(&self) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter_map(|message| match message {
                SinkMessage::Text { text } => Some(text),
                SinkMessage::ActionResult { .. } => None,
            })
            .collect()
    }

    pub fn labels(&self) -> Vec<String> {
        self.events().iter().map(|event| event.status.label()).collect()
    }
}

impl ProgressSink for InMemoryProgressSink {
    fn report_progress(&self, event: ProgressEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }

    fn report_message(&self, message: SinkMessage) {
        match self.messages.lock() {
            Ok(mut messages) => messages.push(message),
            Err(poisoned) => poisoned.into_inner().push(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        domain::{action::ActionPayload, task::TaskId},
        progress::{InMemoryProgressSink, ProgressEvent, ProgressSink, ProgressStatus, SinkMessage},
    };

    #[test]
    fn in_memory_sink_records_events_and_messages_in_order() {
        let sink = InMemoryProgressSink::default();
        let task_id = TaskId("task-1".to_owned());

        sink.report_progress(ProgressEvent::new(task_id.clone(), 1, ProgressStatus::Analyzing));
        sink.report_progress(
            ProgressEvent::new(
                task_id,
                1,
                ProgressStatus::Executing { action: "navigate".to_owned() },
            )
            .with_action("navigate"),
        );
        sink.report_message(SinkMessage::ActionResult {
            action: "navigate".to_owned(),
            payload: ActionPayload::Navigated {
                title: "About".to_owned(),
                locator: "#about".to_owned(),
            },
        });
        sink.report_message(SinkMessage::text("done"));

        assert_eq!(sink.labels(), vec!["Analyzing task", "Executing navigate"]);
        assert_eq!(sink.events()[1].action.as_deref(), Some("navigate"));
        assert_eq!(sink.messages().len(), 2);
        assert_eq!(sink.text_messages(), vec!["done"]);
    }

    #[test]
    fn status_labels_match_user_facing_text() {
        assert_eq!(ProgressStatus::Error { detail: "x".to_owned() }.to_string(), "Error");
        assert_eq!(
            ProgressStatus::TaskComplete { summary: "ok".to_owned() }.to_string(),
            "Task Complete"
        );
        assert!(ProgressStatus::Error { detail: String::new() }.is_error());
        assert!(!ProgressStatus::Analyzing.is_error());
    }
}
