use std::path::PathBuf;
use std::sync::Arc;

use pagepilot_agent::{
    ActionExecutor, ActionRegistry, ContextRepository, FanoutSink, FileContextStore, HttpOracle,
    IterationController, LoopSettings, Oracle, StaticPage, TaskRunner, TracingProgressSink,
};
use pagepilot_core::config::AppConfig;
use pagepilot_core::{ActionCatalog, ProgressEvent, ProgressSink, SinkMessage, Task};
use tracing::{info, warn};

use crate::commands::CommandResult;

const COMMAND: &str = "run";

#[derive(Clone, Debug)]
pub struct RunArgs {
    pub page: PathBuf,
    pub instruction: String,
    pub target: Option<String>,
}

pub async fn run(config: &AppConfig, args: RunArgs) -> CommandResult {
    let oracle = match HttpOracle::from_config(&config.oracle) {
        Ok(oracle) => oracle,
        Err(error) => return CommandResult::failure(COMMAND, "oracle_config", error.to_string(), 2),
    };
    execute(config, args, Arc::new(oracle), Arc::new(ConsoleProgressSink)).await
}

/// Prints step progress and action results to stderr so stdout stays machine-readable.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleProgressSink;

impl ProgressSink for ConsoleProgressSink {
    fn report_progress(&self, event: ProgressEvent) {
        eprintln!("[step {}] {}", event.iteration, event.status);
    }

    fn report_message(&self, message: SinkMessage) {
        match message {
            SinkMessage::Text { text } => eprintln!("{text}"),
            SinkMessage::ActionResult { action, payload } => {
                eprintln!("  {action}: {}", payload.describe());
            }
        }
    }
}

/// Runs one task against a page file with the given oracle. Ctrl-C cancels the task.
pub async fn execute(
    config: &AppConfig,
    args: RunArgs,
    oracle: Arc<dyn Oracle>,
    sink: Arc<dyn ProgressSink>,
) -> CommandResult {
    let instruction = args.instruction.trim();
    if instruction.is_empty() {
        return CommandResult::failure(COMMAND, "invalid_input", "instruction must not be empty", 2);
    }

    let page = match StaticPage::load(&args.page).await {
        Ok(page) => Arc::new(page),
        Err(error) => return CommandResult::failure(COMMAND, "page_load", format!("{error:#}"), 2),
    };
    let fallback_id = args.target.unwrap_or_else(|| args.page.display().to_string());
    let target = page.target(&fallback_id);

    let repository = match &config.context.store_dir {
        Some(dir) => ContextRepository::new(Arc::new(FileContextStore::new(dir))),
        None => ContextRepository::in_memory(),
    };
    if let Err(error) = repository.save(&target, &page.snapshot()).await {
        warn!(
            event_name = "cli.run.context_save_failed",
            target_id = %target.id,
            error = %error,
            "could not persist page structure"
        );
    }

    let executor = ActionExecutor::new(
        Arc::new(ActionCatalog::builtin()),
        Arc::new(ActionRegistry::with_page_driver(page)),
    );
    let sinks: Vec<Arc<dyn ProgressSink>> = vec![Arc::new(TracingProgressSink), sink];
    let controller = IterationController::new(
        oracle,
        executor,
        Arc::new(repository),
        Arc::new(FanoutSink::new(sinks)),
        LoopSettings::from_config(config),
    );
    let runner = Arc::new(TaskRunner::new(Arc::new(controller)));

    let interrupt = tokio::spawn({
        let runner = runner.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!(event_name = "cli.run.interrupted", "interrupt received; cancelling task");
                runner.cancel();
            }
        }
    });

    let report = runner.submit(Task::new(instruction, target)).await;
    interrupt.abort();

    match report {
        Some(report) => CommandResult::from_report(COMMAND, &report),
        None => CommandResult::failure(COMMAND, "busy", "another task is already running", 1),
    }
}
