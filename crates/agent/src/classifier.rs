use pagepilot_core::ActionCatalog;
use tracing::{debug, warn};

use crate::oracle::Oracle;
use crate::prompt::{classifier_system_prompt, ACTIONS_REQUIRED};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Classification {
    DirectAnswer(String),
    NeedsActions,
}

/// Decides whether an instruction can be answered without touching the page.
///
/// Uses a one-shot exchange, so a direct answer never opens a loop session.
/// Any oracle error routes to the action loop.
#[derive(Clone, Debug, Default)]
pub struct ClassifierGate {
    system_prompt: String,
}

impl ClassifierGate {
    pub fn new(catalog: &ActionCatalog) -> Self {
        Self { system_prompt: classifier_system_prompt(catalog) }
    }

    pub async fn classify(&self, oracle: &dyn Oracle, instruction: &str) -> Classification {
        match oracle.complete(&self.system_prompt, instruction).await {
            Ok(reply) => {
                let classification = interpret(&reply);
                debug!(
                    event_name = "agent.classifier.decided",
                    needs_actions = classification == Classification::NeedsActions,
                    "classified instruction"
                );
                classification
            }
            Err(error) => {
                warn!(
                    event_name = "agent.classifier.failed",
                    error = %error,
                    "classification failed; proceeding with actions"
                );
                Classification::NeedsActions
            }
        }
    }
}

/// Only the exact sentinel (after trimming) means actions. An empty reply is not an answer.
pub fn interpret(reply: &str) -> Classification {
    let trimmed = reply.trim();
    if trimmed.is_empty() || trimmed == ACTIONS_REQUIRED {
        Classification::NeedsActions
    } else {
        Classification::DirectAnswer(trimmed.to_string())
    }
}
