pub mod ask;
pub mod catalog;
pub mod config;
pub mod run;

use pagepilot_agent::TaskReport;
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome<'a> {
    command: &'a str,
    status: &'a str,
    error_class: Option<&'a str>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<&'a TaskReport>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command,
            status: "ok",
            error_class: None,
            message: message.into(),
            report: None,
        };
        Self { exit_code: 0, output: serialize_payload(&payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command,
            status: "error",
            error_class: Some(error_class),
            message: message.into(),
            report: None,
        };
        Self { exit_code, output: serialize_payload(&payload) }
    }

    /// Completed and answered tasks exit 0; every other terminal outcome exits 1.
    pub fn from_report(command: &str, report: &TaskReport) -> Self {
        let success = report.outcome.is_success();
        let error_class = match &report.outcome {
            pagepilot_agent::TaskOutcome::Failed { reason } => Some(reason.error_class()),
            outcome if !outcome.is_success() => Some(outcome.label()),
            _ => None,
        };
        let payload = CommandOutcome {
            command,
            status: if success { "ok" } else { "error" },
            error_class,
            message: report.final_message(),
            report: Some(report),
        };
        Self { exit_code: if success { 0 } else { 1 }, output: serialize_payload(&payload) }
    }
}

fn serialize_payload(payload: &CommandOutcome<'_>) -> String {
    serde_json::to_string(payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
