use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use pagepilot_core::config::AppConfig;
use pagepilot_core::flows::DEFAULT_MAX_ITERATIONS;
use pagepilot_core::{
    ContextSnapshot, ExecutionOutcome, FailureReason, LoopState, ParsedCommand, PhaseEvent,
    ProgressEvent, ProgressSink, ProgressStatus, SinkMessage, StepOutcome, Task, TaskId,
    CONFIDENCE_THRESHOLD, TASK_COMPLETE,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::classifier::{Classification, ClassifierGate};
use crate::context::ContextLoader;
use crate::executor::ActionExecutor;
use crate::oracle::{CancelSignal, ChatMessage, Oracle, OracleError, OracleSession, SessionGuard};
use crate::parser::CommandParser;
use crate::prompt;

const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_COMPLETION_SUMMARY: &str = "Task complete.";
const CANCELLED_MESSAGE: &str = "Task cancelled.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoopSettings {
    pub max_iterations: u32,
    pub classify_first: bool,
    /// Upper bound on any single oracle call.
    pub oracle_timeout: Duration,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            classify_first: true,
            oracle_timeout: DEFAULT_ORACLE_TIMEOUT,
        }
    }
}

impl LoopSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_iterations: config.agent.max_iterations,
            classify_first: config.agent.classify_first,
            oracle_timeout: Duration::from_secs(config.oracle.timeout_secs),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskOutcome {
    Answered { text: String },
    Completed { summary: String },
    Failed { reason: FailureReason },
    MaxIterationsReached,
    Cancelled,
}

impl TaskOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Answered { .. } => "answered",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::MaxIterationsReached => "max_iterations_reached",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Answered { .. } | Self::Completed { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StepRecord {
    pub iteration: u32,
    pub command: ParsedCommand,
    pub outcome: ExecutionOutcome,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TaskReport {
    pub task_id: TaskId,
    pub outcome: TaskOutcome,
    pub iterations: u32,
    pub max_iterations: u32,
    pub history: Vec<StepRecord>,
}

impl TaskReport {
    /// The terminal text the sink received for this task.
    pub fn final_message(&self) -> String {
        match &self.outcome {
            TaskOutcome::Answered { text } => text.clone(),
            TaskOutcome::Completed { summary } => summary.clone(),
            TaskOutcome::Failed { reason } => reason.user_message(),
            TaskOutcome::MaxIterationsReached => max_iterations_message(self.max_iterations),
            TaskOutcome::Cancelled => CANCELLED_MESSAGE.to_string(),
        }
    }
}

pub fn max_iterations_message(max_iterations: u32) -> String {
    format!("Reached the maximum of {max_iterations} steps; the task may be incomplete.")
}

/// Borrowed inputs shared by every pass of one run.
struct Pass<'a> {
    task: &'a Task,
    session: &'a dyn OracleSession,
    context: &'a ContextSnapshot,
}

/// Drives one task from classification to a terminal outcome.
///
/// The controller itself is stateless between runs; all per-task state lives in a
/// [`LoopState`] owned by the run. Any session it opens is destroyed before `run` returns.
pub struct IterationController {
    oracle: Arc<dyn Oracle>,
    executor: ActionExecutor,
    context: Arc<dyn ContextLoader>,
    sink: Arc<dyn ProgressSink>,
    classifier: ClassifierGate,
    parser: CommandParser,
    settings: LoopSettings,
}

impl IterationController {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        executor: ActionExecutor,
        context: Arc<dyn ContextLoader>,
        sink: Arc<dyn ProgressSink>,
        settings: LoopSettings,
    ) -> Self {
        let classifier = ClassifierGate::new(executor.catalog());
        Self { oracle, executor, context, sink, classifier, parser: CommandParser, settings }
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    pub async fn run(&self, task: &Task, mut cancel: CancelSignal) -> TaskReport {
        let mut state = LoopState::new(self.settings.max_iterations);
        let mut history = Vec::new();
        info!(
            event_name = "agent.task.started",
            task_id = %task.id,
            target_id = %task.target.id,
            max_iterations = state.max_iterations(),
            "task started"
        );

        let outcome = self.drive(task, &mut state, &mut history, &mut cancel).await;

        info!(
            event_name = "agent.task.finished",
            task_id = %task.id,
            outcome = outcome.label(),
            iterations = state.iteration(),
            phase = ?state.phase(),
            "task finished"
        );
        TaskReport {
            task_id: task.id.clone(),
            outcome,
            iterations: state.iteration(),
            max_iterations: state.max_iterations(),
            history,
        }
    }

    async fn drive(
        &self,
        task: &Task,
        state: &mut LoopState,
        history: &mut Vec<StepRecord>,
        cancel: &mut CancelSignal,
    ) -> TaskOutcome {
        if self.settings.classify_first {
            self.advance(&task.id, state, PhaseEvent::TaskAccepted);
            let classification = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                decided = tokio::time::timeout(
                    self.settings.oracle_timeout,
                    self.classifier.classify(self.oracle.as_ref(), &task.instruction),
                ) => Some(decided.unwrap_or(Classification::NeedsActions)),
            };
            match classification {
                None => return self.cancelled(task, state),
                Some(Classification::DirectAnswer(text)) => {
                    self.advance(&task.id, state, PhaseEvent::DirectAnswerReturned);
                    self.sink.report_message(SinkMessage::text(text.clone()));
                    return TaskOutcome::Answered { text };
                }
                Some(Classification::NeedsActions) => {
                    self.advance(&task.id, state, PhaseEvent::ActionsRequired);
                }
            }
        } else {
            self.advance(&task.id, state, PhaseEvent::ClassificationSkipped);
        }

        let context = match self.context.load_context(&task.target).await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                warn!(
                    event_name = "agent.context.load_failed",
                    task_id = %task.id,
                    target_id = %task.target.id,
                    error = %error,
                    "context unavailable; continuing without page structure"
                );
                ContextSnapshot::default()
            }
        };

        let system_prompt = prompt::system_prompt(self.executor.catalog(), &context);
        let guard = match self.call_oracle(cancel, self.oracle.create_session(&system_prompt)).await
        {
            Ok(session) => SessionGuard::new(session),
            Err(OracleError::Cancelled) => return self.cancelled(task, state),
            Err(error) => {
                self.advance(&task.id, state, PhaseEvent::OracleFailed);
                let reason = FailureReason::Oracle { iteration: 0, message: error.to_string() };
                return TaskOutcome::Failed {
                    reason: self.report_failure(task, 0, None, error.to_string(), reason),
                };
            }
        };
        self.advance(&task.id, state, PhaseEvent::SessionOpened);
        state.begin_actions(&task.instruction);

        let outcome = match guard.session() {
            Ok(session) => {
                let pass = Pass { task, session, context: &context };
                self.iterate(&pass, state, history, cancel).await
            }
            Err(error) => {
                self.advance(&task.id, state, PhaseEvent::OracleFailed);
                let reason = FailureReason::Oracle { iteration: 0, message: error.to_string() };
                TaskOutcome::Failed {
                    reason: self.report_failure(task, 0, None, error.to_string(), reason),
                }
            }
        };

        match guard.destroy().await {
            Ok(()) => debug!(
                event_name = "agent.session.destroyed",
                task_id = %task.id,
                "oracle session destroyed"
            ),
            Err(error) => warn!(
                event_name = "agent.session.destroy_failed",
                task_id = %task.id,
                error = %error,
                "oracle session teardown failed"
            ),
        }
        outcome
    }

    async fn iterate(
        &self,
        pass: &Pass<'_>,
        state: &mut LoopState,
        history: &mut Vec<StepRecord>,
        cancel: &mut CancelSignal,
    ) -> TaskOutcome {
        loop {
            let Some(iteration) = state.next_iteration() else {
                return self.cap_reached(pass.task, state);
            };

            match self.step(pass, state, history, cancel, iteration).await {
                StepOutcome::Continue { next_prompt } => state.set_prompt(next_prompt),
                StepOutcome::Complete { summary } => return TaskOutcome::Completed { summary },
                StepOutcome::Failed(reason) => return TaskOutcome::Failed { reason },
                StepOutcome::CapReached => return self.cap_reached(pass.task, state),
                StepOutcome::Cancelled => return self.cancelled(pass.task, state),
            }
        }
    }

    /// One parse/execute pass. Emits every progress event and message for the pass.
    async fn step(
        &self,
        pass: &Pass<'_>,
        state: &mut LoopState,
        history: &mut Vec<StepRecord>,
        cancel: &mut CancelSignal,
        iteration: u32,
    ) -> StepOutcome {
        let task = pass.task;
        self.report(task, iteration, None, ProgressStatus::Analyzing);

        let parsed = self
            .call_oracle(
                cancel,
                self.parser.parse(pass.session, state.current_prompt(), pass.context),
            )
            .await;
        let command = match parsed {
            Ok(Some(command)) if command.meets_threshold() => command,
            Ok(rejected) => {
                self.advance(&task.id, state, PhaseEvent::ConfidenceTooLow);
                self.advance(&task.id, state, PhaseEvent::ParseRejected);
                let detail = match &rejected {
                    Some(command) => format!(
                        "confidence {:.2} for `{}` is below {:.2}",
                        command.confidence, command.action, CONFIDENCE_THRESHOLD
                    ),
                    None => "no command could be parsed from the oracle reply".to_string(),
                };
                let reason = FailureReason::ParseFailure {
                    confidence: rejected.map(|command| format!("{:.2}", command.confidence)),
                };
                return StepOutcome::Failed(self.report_failure(task, iteration, None, detail, reason));
            }
            Err(error) => return self.oracle_failure(task, state, iteration, error),
        };

        if command.is_task_complete() {
            self.advance(&task.id, state, PhaseEvent::CompletionRequested);
            let summary = command
                .summary()
                .filter(|summary| !summary.is_empty())
                .unwrap_or(DEFAULT_COMPLETION_SUMMARY)
                .to_string();
            self.report(
                task,
                iteration,
                Some(TASK_COMPLETE),
                ProgressStatus::TaskComplete { summary: summary.clone() },
            );
            self.sink.report_message(SinkMessage::text(summary.clone()));
            return StepOutcome::Complete { summary };
        }

        self.advance(&task.id, state, PhaseEvent::CommandAccepted);
        self.report(
            task,
            iteration,
            Some(command.action.as_str()),
            ProgressStatus::Executing { action: command.action.clone() },
        );

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return StepOutcome::Cancelled,
            outcome = self.executor.execute(&command) => outcome,
        };
        history.push(StepRecord { iteration, command, outcome: outcome.clone() });

        let (action, payload) = match &outcome {
            ExecutionOutcome::Succeeded { action, payload } => (action.clone(), payload.clone()),
            ExecutionOutcome::Failed { action, error } => {
                self.advance(&task.id, state, PhaseEvent::ExecutionFailed);
                let reason = FailureReason::ActionFailed {
                    iteration,
                    action: action.clone(),
                    message: error.clone(),
                };
                return StepOutcome::Failed(self.report_failure(
                    task,
                    iteration,
                    Some(action.as_str()),
                    error.clone(),
                    reason,
                ));
            }
        };
        self.advance(&task.id, state, PhaseEvent::ExecutionSucceeded);

        let appended = self
            .call_oracle(cancel, pass.session.append(ChatMessage::assistant(outcome.describe())))
            .await;
        if let Err(error) = appended {
            return self.oracle_failure(task, state, iteration, error);
        }

        // The last permitted pass has no follow-up to plan.
        let next_prompt = if state.cap_reached() {
            None
        } else {
            let query = prompt::next_action_query(&outcome);
            match self.call_oracle(cancel, pass.session.prompt(&query)).await {
                Ok(reply) => Some(reply),
                Err(error) => return self.oracle_failure(task, state, iteration, error),
            }
        };

        self.sink.report_message(SinkMessage::ActionResult { action, payload });

        match next_prompt {
            Some(next_prompt) => {
                self.advance(&task.id, state, PhaseEvent::NextPromptReady);
                StepOutcome::Continue { next_prompt }
            }
            None => StepOutcome::CapReached,
        }
    }

    /// Bounds an oracle call by the configured timeout and the cancel signal.
    async fn call_oracle<T, F>(&self, cancel: &mut CancelSignal, call: F) -> Result<T, OracleError>
    where
        F: Future<Output = Result<T, OracleError>>,
    {
        let limit = self.settings.oracle_timeout;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(OracleError::Cancelled),
            result = tokio::time::timeout(limit, call) => {
                result.unwrap_or_else(|_| Err(OracleError::Timeout(limit)))
            }
        }
    }

    fn oracle_failure(
        &self,
        task: &Task,
        state: &mut LoopState,
        iteration: u32,
        error: OracleError,
    ) -> StepOutcome {
        if error == OracleError::Cancelled {
            return StepOutcome::Cancelled;
        }
        self.advance(&task.id, state, PhaseEvent::OracleFailed);
        let reason = FailureReason::Oracle { iteration, message: error.to_string() };
        StepOutcome::Failed(self.report_failure(task, iteration, None, error.to_string(), reason))
    }

    fn report_failure(
        &self,
        task: &Task,
        iteration: u32,
        action: Option<&str>,
        detail: String,
        reason: FailureReason,
    ) -> FailureReason {
        warn!(
            event_name = "agent.task.failed",
            task_id = %task.id,
            iteration,
            error_class = reason.error_class(),
            detail = %detail,
            "task failed"
        );
        self.report(task, iteration, action, ProgressStatus::Error { detail });
        self.sink.report_message(SinkMessage::text(reason.user_message()));
        reason
    }

    fn cap_reached(&self, task: &Task, state: &mut LoopState) -> TaskOutcome {
        self.advance(&task.id, state, PhaseEvent::IterationCapReached);
        info!(
            event_name = "agent.task.max_iterations",
            task_id = %task.id,
            max_iterations = state.max_iterations(),
            "iteration cap reached"
        );
        self.report(task, state.iteration(), None, ProgressStatus::MaxIterationsReached);
        self.sink.report_message(SinkMessage::text(max_iterations_message(state.max_iterations())));
        TaskOutcome::MaxIterationsReached
    }

    fn cancelled(&self, task: &Task, state: &mut LoopState) -> TaskOutcome {
        self.advance(&task.id, state, PhaseEvent::CancelRequested);
        info!(
            event_name = "agent.task.cancelled",
            task_id = %task.id,
            iteration = state.iteration(),
            "task cancelled"
        );
        self.report(task, state.iteration(), None, ProgressStatus::Cancelled);
        self.sink.report_message(SinkMessage::text(CANCELLED_MESSAGE));
        TaskOutcome::Cancelled
    }

    fn report(&self, task: &Task, iteration: u32, action: Option<&str>, status: ProgressStatus) {
        let mut event = ProgressEvent::new(task.id.clone(), iteration, status);
        if let Some(action) = action {
            event = event.with_action(action);
        }
        self.sink.report_progress(event);
    }

    fn advance(&self, task_id: &TaskId, state: &mut LoopState, event: PhaseEvent) {
        match state.apply(event) {
            Ok(transition) => debug!(
                event_name = "agent.loop.transition",
                task_id = %task_id,
                from = ?transition.from,
                to = ?transition.to,
                trigger = ?transition.event,
                "loop phase changed"
            ),
            Err(error) => warn!(
                event_name = "agent.loop.invalid_transition",
                task_id = %task_id,
                error = %error,
                "ignored invalid loop transition"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use pagepilot_core::{
        ActionCatalog, ActionParams, ActionPayload, InMemoryProgressSink, Task, TaskTarget,
    };
    use tokio::sync::Mutex;

    use super::{IterationController, LoopSettings, TaskOutcome};
    use crate::context::ContextRepository;
    use crate::executor::ActionExecutor;
    use crate::oracle::{CancelHandle, CancelSignal, ChatMessage, Oracle, OracleError, OracleSession};
    use crate::page::StaticPage;
    use crate::tools::{Action, ActionRegistry};

    struct SlowScroll {
        finished: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Action for SlowScroll {
        fn name(&self) -> &'static str {
            "scroll"
        }

        async fn invoke(&self, params: ActionParams) -> Result<ActionPayload> {
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            match params {
                ActionParams::Scroll { direction } => Ok(ActionPayload::Scrolled { direction }),
                other => Err(anyhow!("unexpected {:?}", other.kind())),
            }
        }
    }

    struct StallingOracle {
        destroyed: Arc<AtomicUsize>,
        replies: Mutex<VecDeque<String>>,
    }

    struct StallingSession {
        destroyed: Arc<AtomicUsize>,
        first_reply: Option<String>,
    }

    #[async_trait]
    impl Oracle for StallingOracle {
        async fn create_session(
            &self,
            _system_prompt: &str,
        ) -> Result<Box<dyn OracleSession>, OracleError> {
            Ok(Box::new(StallingSession {
                destroyed: self.destroyed.clone(),
                first_reply: self.replies.lock().await.pop_front(),
            }))
        }

        async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, OracleError> {
            Ok("ACTIONS_REQUIRED".to_string())
        }
    }

    #[async_trait]
    impl OracleSession for StallingSession {
        fn id(&self) -> &str {
            "stalling"
        }

        async fn prompt(&self, _message: &str) -> Result<String, OracleError> {
            match &self.first_reply {
                Some(reply) => Ok(reply.clone()),
                None => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(String::new())
                }
            }
        }

        async fn append(&self, _message: ChatMessage) -> Result<(), OracleError> {
            Ok(())
        }

        async fn destroy(&self) -> Result<(), OracleError> {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn controller(
        oracle: Arc<dyn Oracle>,
        sink: InMemoryProgressSink,
        settings: LoopSettings,
    ) -> IterationController {
        let page = Arc::new(
            StaticPage::from_json(
                r##"{"sections": [{"title": "About", "locator": "#about", "content": "Hi"}]}"##,
            )
            .expect("page"),
        );
        let executor = ActionExecutor::new(
            Arc::new(ActionCatalog::builtin()),
            Arc::new(ActionRegistry::with_page_driver(page)),
        );
        IterationController::new(
            oracle,
            executor,
            Arc::new(ContextRepository::in_memory()),
            Arc::new(sink),
            settings,
        )
    }

    #[tokio::test]
    async fn stalled_oracle_call_times_out_and_destroys_session() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let oracle = Arc::new(StallingOracle {
            destroyed: destroyed.clone(),
            replies: Mutex::new(VecDeque::new()),
        });
        let sink = InMemoryProgressSink::default();
        let settings = LoopSettings {
            oracle_timeout: Duration::from_millis(20),
            ..LoopSettings::default()
        };

        let report = controller(oracle, sink.clone(), settings)
            .run(&Task::new("summarize", TaskTarget::new("tab")), CancelSignal::never())
            .await;

        match &report.outcome {
            TaskOutcome::Failed { reason } => {
                assert!(reason.user_message().contains("timed out"));
            }
            other => panic!("expected timeout failure, got {other:?}"),
        }
        assert_eq!(report.iterations, 1);
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(sink.labels(), vec!["Analyzing task", "Error"]);
    }

    #[tokio::test]
    async fn cancel_during_parse_ends_cancelled_and_destroys_session() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let oracle = Arc::new(StallingOracle {
            destroyed: destroyed.clone(),
            replies: Mutex::new(VecDeque::new()),
        });
        let sink = InMemoryProgressSink::default();
        let controller = controller(oracle, sink.clone(), LoopSettings::default());
        let (handle, signal) = CancelHandle::new();

        let task = Task::new("summarize", TaskTarget::new("tab"));
        let run = controller.run(&task, signal);
        let cancel = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.cancel();
        };
        let (report, ()) = tokio::join!(run, cancel);

        assert_eq!(report.outcome, TaskOutcome::Cancelled);
        assert_eq!(report.final_message(), "Task cancelled.");
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(sink.labels().last().map(String::as_str), Some("Cancelled"));
    }

    #[tokio::test]
    async fn missing_summary_falls_back_to_default_text() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let oracle = Arc::new(StallingOracle {
            destroyed: destroyed.clone(),
            replies: Mutex::new(VecDeque::from(vec![
                r#"{"action": "task_complete", "confidence": 0.9}"#.to_string(),
            ])),
        });
        let sink = InMemoryProgressSink::default();

        let report = controller(oracle, sink.clone(), LoopSettings::default())
            .run(&Task::new("done?", TaskTarget::new("tab")), CancelSignal::never())
            .await;

        assert_eq!(report.outcome, TaskOutcome::Completed { summary: "Task complete.".to_string() });
        assert_eq!(sink.text_messages(), vec!["Task complete."]);
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_during_slow_action_stops_the_action() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        let oracle = Arc::new(StallingOracle {
            destroyed: destroyed.clone(),
            replies: Mutex::new(VecDeque::from(vec![
                r#"{"action": "scroll", "parameters": {"direction": "down"}, "confidence": 0.9}"#
                    .to_string(),
            ])),
        });
        let mut registry = ActionRegistry::default();
        registry.register(SlowScroll { finished: finished.clone() });
        let executor = ActionExecutor::new(Arc::new(ActionCatalog::builtin()), Arc::new(registry));
        let sink = InMemoryProgressSink::default();
        let controller = IterationController::new(
            oracle,
            executor,
            Arc::new(ContextRepository::in_memory()),
            Arc::new(sink.clone()),
            LoopSettings::default(),
        );
        let (handle, signal) = CancelHandle::new();

        let task = Task::new("scroll down", TaskTarget::new("tab"));
        let run = controller.run(&task, signal);
        let cancel = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.cancel();
        };
        let (report, ()) = tokio::join!(run, cancel);

        assert_eq!(report.outcome, TaskOutcome::Cancelled);
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }
}
