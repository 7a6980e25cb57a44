use serde::Serialize;
use thiserror::Error;

use crate::domain::action::ParamError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    InvalidParameters(#[from] ParamError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Why a task ended without completing. Carried as a value, never raised.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// No command could be parsed, or its confidence was below the threshold.
    ParseFailure { confidence: Option<String> },
    /// An action was unknown, had invalid parameters, or its implementation failed.
    ActionFailed { iteration: u32, action: String, message: String },
    /// The oracle failed, timed out, or the loop hit an unexpected internal error.
    Oracle { iteration: u32, message: String },
}

impl FailureReason {
    pub fn user_message(&self) -> String {
        match self {
            Self::ParseFailure { .. } => {
                "Sorry, I couldn't understand how to carry out that request. Try rephrasing it."
                    .to_string()
            }
            Self::ActionFailed { iteration, action, message } => {
                format!("Error at step {iteration} while running `{action}`: {message}")
            }
            Self::Oracle { iteration, message } => {
                format!("Something went wrong at step {iteration}: {message}")
            }
        }
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            Self::ParseFailure { .. } => "parse_failure",
            Self::ActionFailed { .. } => "action_failed",
            Self::Oracle { .. } => "oracle_failure",
        }
    }
}
