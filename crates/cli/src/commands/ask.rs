use std::sync::Arc;
use std::time::Duration;

use pagepilot_agent::{HttpOracle, Oracle, SessionGuard};
use pagepilot_core::config::AppConfig;
use tracing::warn;

use crate::commands::CommandResult;

const COMMAND: &str = "ask";
const SYSTEM_PROMPT: &str = "You are a concise assistant. Answer the question directly.";

pub async fn run(config: &AppConfig, question: &str) -> CommandResult {
    let oracle = match HttpOracle::from_config(&config.oracle) {
        Ok(oracle) => oracle,
        Err(error) => return CommandResult::failure(COMMAND, "oracle_config", error.to_string(), 2),
    };
    execute(Arc::new(oracle), question, Duration::from_secs(config.oracle.timeout_secs)).await
}

/// One streamed exchange in a throwaway session.
pub async fn execute(oracle: Arc<dyn Oracle>, question: &str, limit: Duration) -> CommandResult {
    let question = question.trim();
    if question.is_empty() {
        return CommandResult::failure(COMMAND, "invalid_input", "question must not be empty", 2);
    }

    let guard = match oracle.create_session(SYSTEM_PROMPT).await {
        Ok(session) => SessionGuard::new(session),
        Err(error) => return CommandResult::failure(COMMAND, "oracle", error.to_string(), 1),
    };

    let answer = match guard.session() {
        Ok(session) => {
            let streamed = async {
                let stream = session.prompt_streaming(question).await?;
                stream.collect_text().await
            };
            match tokio::time::timeout(limit, streamed).await {
                Ok(result) => result.map_err(|error| error.to_string()),
                Err(_) => Err(format!("oracle call timed out after {limit:?}")),
            }
        }
        Err(error) => Err(error.to_string()),
    };

    if let Err(error) = guard.destroy().await {
        warn!(event_name = "cli.ask.destroy_failed", error = %error, "oracle session teardown failed");
    }

    match answer {
        Ok(text) => CommandResult::success(COMMAND, text.trim()),
        Err(message) => CommandResult::failure(COMMAND, "oracle", message, 1),
    }
}
