use std::sync::Arc;

use pagepilot_core::{ActionCatalog, ActionParams, ExecutionOutcome, ParsedCommand};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::tools::ActionRegistry;

/// Validates a command against the catalog and runs its implementation.
///
/// Never returns an error: every failure is reported as [`ExecutionOutcome::Failed`].
#[derive(Clone)]
pub struct ActionExecutor {
    catalog: Arc<ActionCatalog>,
    registry: Arc<ActionRegistry>,
}

impl ActionExecutor {
    pub fn new(catalog: Arc<ActionCatalog>, registry: Arc<ActionRegistry>) -> Self {
        Self { catalog, registry }
    }

    pub fn catalog(&self) -> &ActionCatalog {
        &self.catalog
    }

    pub async fn execute(&self, command: &ParsedCommand) -> ExecutionOutcome {
        let name = command.action.trim();
        let Some(definition) = self.catalog.get(name) else {
            return ExecutionOutcome::failed(name, format!("unknown action `{name}`"));
        };

        let params = match ActionParams::from_command(definition, command) {
            Ok(params) => params,
            Err(error) => return ExecutionOutcome::failed(definition.name, error.to_string()),
        };
        if matches!(params, ActionParams::TaskComplete { .. }) {
            return ExecutionOutcome::failed(
                definition.name,
                "task_complete ends the task and cannot be executed",
            );
        }

        let Some(action) = self.registry.get(definition.name) else {
            return ExecutionOutcome::failed(
                definition.name,
                format!("no implementation registered for `{}`", definition.name),
            );
        };

        // Spawned so a panicking implementation surfaces as a join error.
        let mut invocation =
            AbortOnDrop(tokio::spawn(async move { action.invoke(params).await }));
        match (&mut invocation.0).await {
            Ok(Ok(payload)) => {
                info!(
                    event_name = "agent.action.succeeded",
                    action = definition.name,
                    "action succeeded"
                );
                ExecutionOutcome::succeeded(definition.name, payload)
            }
            Ok(Err(error)) => {
                warn!(
                    event_name = "agent.action.failed",
                    action = definition.name,
                    error = %error,
                    "action failed"
                );
                ExecutionOutcome::failed(definition.name, format!("{error:#}"))
            }
            Err(join_error) => {
                warn!(
                    event_name = "agent.action.aborted",
                    action = definition.name,
                    error = %join_error,
                    "action implementation aborted"
                );
                ExecutionOutcome::failed(
                    definition.name,
                    format!("action implementation aborted: {join_error}"),
                )
            }
        }
    }
}

/// Aborts the spawned invocation when the awaiting `execute` future is dropped.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use pagepilot_core::{
        ActionCatalog, ActionParams, ActionPayload, ExecutionOutcome, ParsedCommand,
        ScrollDirection,
    };

    use super::ActionExecutor;
    use crate::tools::{Action, ActionRegistry};

    struct ScriptedScroll {
        fail_with: Option<&'static str>,
        panic: bool,
    }

    #[async_trait]
    impl Action for ScriptedScroll {
        fn name(&self) -> &'static str {
            "scroll"
        }

        async fn invoke(&self, params: ActionParams) -> Result<ActionPayload> {
            if self.panic {
                panic!("driver crashed");
            }
            if let Some(message) = self.fail_with {
                return Err(anyhow!(message));
            }
            match params {
                ActionParams::Scroll { direction } => Ok(ActionPayload::Scrolled { direction }),
                other => Err(anyhow!("unexpected {:?}", other.kind())),
            }
        }
    }

    fn executor(action: ScriptedScroll) -> ActionExecutor {
        let mut registry = ActionRegistry::default();
        registry.register(action);
        ActionExecutor::new(Arc::new(ActionCatalog::builtin()), Arc::new(registry))
    }

    fn scroll_down() -> ParsedCommand {
        ParsedCommand::new("scroll", 0.9).with_param("direction", "down")
    }

    #[tokio::test]
    async fn valid_command_runs_implementation() {
        let outcome = executor(ScriptedScroll { fail_with: None, panic: false })
            .execute(&scroll_down())
            .await;
        assert_eq!(
            outcome,
            ExecutionOutcome::succeeded(
                "scroll",
                ActionPayload::Scrolled { direction: ScrollDirection::Down }
            )
        );
    }

    #[tokio::test]
    async fn unknown_action_fails_without_raising() {
        let outcome = executor(ScriptedScroll { fail_with: None, panic: false })
            .execute(&ParsedCommand::new("click", 0.9))
            .await;
        assert_eq!(outcome, ExecutionOutcome::failed("click", "unknown action `click`"));
    }

    #[tokio::test]
    async fn invalid_parameters_fail_before_invocation() {
        let outcome = executor(ScriptedScroll { fail_with: None, panic: true })
            .execute(&ParsedCommand::new("scroll", 0.9))
            .await;
        match outcome {
            ExecutionOutcome::Failed { error, .. } => assert!(error.contains("direction")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn implementation_error_and_panic_become_failed_outcomes() {
        let failed = executor(ScriptedScroll { fail_with: Some("selector not found"), panic: false })
            .execute(&scroll_down())
            .await;
        assert_eq!(failed, ExecutionOutcome::failed("scroll", "selector not found"));

        let panicked =
            executor(ScriptedScroll { fail_with: None, panic: true }).execute(&scroll_down()).await;
        assert!(!panicked.is_success());
        assert!(panicked.describe().contains("aborted"));
    }

    #[tokio::test]
    async fn missing_implementation_and_task_complete_are_rejected() {
        let executor = executor(ScriptedScroll { fail_with: None, panic: false });

        let outcome = executor.execute(&ParsedCommand::new("read_content", 0.9)).await;
        assert!(outcome.describe().contains("no implementation registered"));

        let outcome = executor
            .execute(&ParsedCommand::new("task_complete", 0.9).with_param("summary", "done"))
            .await;
        assert!(!outcome.is_success());
    }
}
