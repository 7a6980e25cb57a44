use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use pagepilot_core::Task;
use tracing::info;

use crate::controller::{IterationController, TaskReport};
use crate::oracle::CancelHandle;

/// Single-flight front door for one task consumer (e.g. one tab).
///
/// A task submitted while another is running is dropped, not queued.
pub struct TaskRunner {
    controller: Arc<IterationController>,
    processing: Arc<AtomicBool>,
    active_cancel: Mutex<Option<CancelHandle>>,
}

/// Clears the processing flag however the run ends.
struct ProcessingGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

impl TaskRunner {
    pub fn new(controller: Arc<IterationController>) -> Self {
        Self {
            controller,
            processing: Arc::new(AtomicBool::new(false)),
            active_cancel: Mutex::new(None),
        }
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    /// Runs `task` to completion, or returns `None` if a task is already in flight.
    pub async fn submit(&self, task: Task) -> Option<TaskReport> {
        if self
            .processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!(
                event_name = "agent.task.dropped",
                task_id = %task.id,
                "task dropped; another task is in progress"
            );
            return None;
        }
        let _processing = ProcessingGuard { flag: self.processing.clone() };

        let (handle, signal) = CancelHandle::new();
        self.set_cancel(Some(handle));
        let report = self.controller.run(&task, signal).await;
        self.set_cancel(None);

        Some(report)
    }

    /// Requests cancellation of the in-flight task. Returns `false` when idle.
    pub fn cancel(&self) -> bool {
        let guard = match self.active_cancel.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match guard.as_ref() {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    fn set_cancel(&self, handle: Option<CancelHandle>) {
        match self.active_cancel.lock() {
            Ok(mut slot) => *slot = handle,
            Err(poisoned) => *poisoned.into_inner() = handle,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use pagepilot_core::{ActionCatalog, NoopProgressSink, Task, TaskTarget};
    use tokio::sync::Notify;

    use super::TaskRunner;
    use crate::context::ContextRepository;
    use crate::controller::{IterationController, LoopSettings, TaskOutcome};
    use crate::executor::ActionExecutor;
    use crate::oracle::{Oracle, OracleError, OracleSession};
    use crate::tools::ActionRegistry;

    /// Classifier call blocks until released, then answers directly.
    struct GatedOracle {
        release: Arc<Notify>,
        entered: Arc<Notify>,
    }

    #[async_trait]
    impl Oracle for GatedOracle {
        async fn create_session(
            &self,
            _system_prompt: &str,
        ) -> Result<Box<dyn OracleSession>, OracleError> {
            Err(OracleError::Request("not used".to_string()))
        }

        async fn complete(&self, _system: &str, prompt: &str) -> Result<String, OracleError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(format!("answer to {prompt}"))
        }
    }

    fn runner(oracle: GatedOracle) -> TaskRunner {
        let executor = ActionExecutor::new(
            Arc::new(ActionCatalog::builtin()),
            Arc::new(ActionRegistry::default()),
        );
        let controller = IterationController::new(
            Arc::new(oracle),
            executor,
            Arc::new(ContextRepository::in_memory()),
            Arc::new(NoopProgressSink),
            LoopSettings { oracle_timeout: Duration::from_secs(5), ..LoopSettings::default() },
        );
        TaskRunner::new(Arc::new(controller))
    }

    #[tokio::test]
    async fn second_submission_is_dropped_while_first_runs() {
        let release = Arc::new(Notify::new());
        let entered = Arc::new(Notify::new());
        let runner = Arc::new(runner(GatedOracle { release: release.clone(), entered: entered.clone() }));

        let first = tokio::spawn({
            let runner = runner.clone();
            async move { runner.submit(Task::new("first", TaskTarget::new("tab"))).await }
        });
        entered.notified().await;

        assert!(runner.is_processing());
        assert!(runner.submit(Task::new("second", TaskTarget::new("tab"))).await.is_none());

        release.notify_one();
        let report = first.await.expect("join").expect("first task ran");
        assert_eq!(report.outcome, TaskOutcome::Answered { text: "answer to first".to_string() });
        assert!(!runner.is_processing());
    }

    #[tokio::test]
    async fn cancel_reaches_in_flight_task() {
        let release = Arc::new(Notify::new());
        let entered = Arc::new(Notify::new());
        let runner = Arc::new(runner(GatedOracle { release, entered: entered.clone() }));
        assert!(!runner.cancel());

        let running = tokio::spawn({
            let runner = runner.clone();
            async move { runner.submit(Task::new("slow", TaskTarget::new("tab"))).await }
        });
        entered.notified().await;

        assert!(runner.cancel());
        let report = running.await.expect("join").expect("ran");
        assert_eq!(report.outcome, TaskOutcome::Cancelled);
        assert!(!runner.is_processing());
    }
}
