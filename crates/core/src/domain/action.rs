use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Action name that ends a task. It is never dispatched to an executor.
pub const TASK_COMPLETE: &str = "task_complete";

/// Minimum parser confidence required before a command is executed.
pub const CONFIDENCE_THRESHOLD: f64 = 0.8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    String,
    Integer,
    Boolean,
    Choice(&'static [&'static str]),
}

impl ParamKind {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.as_str().is_some(),
            // Integer params are counts.
            Self::Integer => value.as_u64().is_some(),
            Self::Boolean => value.as_bool().is_some(),
            Self::Choice(options) => value
                .as_str()
                .map(|raw| options.iter().any(|option| option.eq_ignore_ascii_case(raw.trim())))
                .unwrap_or(false),
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => f.write_str("string"),
            Self::Integer => f.write_str("integer"),
            Self::Boolean => f.write_str("boolean"),
            Self::Choice(options) => write!(f, "one of {}", options.join("|")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub description: &'static str,
}

impl ParamSpec {
    pub const fn required(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self { name, kind, required: true, description }
    }

    pub const fn optional(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self { name, kind, required: false, description }
    }
}

/// Selects the typed parameter and payload variants an action works with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Navigate,
    ReadContent,
    Extract,
    Scroll,
    TaskComplete,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ActionDefinition {
    pub name: &'static str,
    pub kind: ActionKind,
    pub description: &'static str,
    pub parameters: Vec<ParamSpec>,
    pub examples: Vec<&'static str>,
}

impl ActionDefinition {
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.parameters.iter().find(|spec| spec.name == name)
    }

    /// Checks required parameters are present and every known parameter has the declared kind.
    /// Parameters the definition does not declare are ignored.
    pub fn validate(&self, parameters: &BTreeMap<String, Value>) -> Result<(), ParamError> {
        for spec in &self.parameters {
            let value = parameters.get(spec.name).filter(|value| !is_blank(value));
            match value {
                None if spec.required => {
                    return Err(ParamError::Missing {
                        action: self.name.to_string(),
                        param: spec.name.to_string(),
                    });
                }
                None => {}
                Some(value) if !spec.kind.accepts(value) => {
                    return Err(ParamError::WrongKind {
                        action: self.name.to_string(),
                        param: spec.name.to_string(),
                        expected: spec.kind.to_string(),
                        found: value.to_string(),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        _ => false,
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ParamError {
    #[error("action `{action}` is missing required parameter `{param}`")]
    Missing { action: String, param: String },
    #[error("action `{action}` parameter `{param}` must be {expected}, got {found}")]
    WrongKind { action: String, param: String, expected: String, found: String },
}

/// One candidate invocation proposed by the command parser for the current iteration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParsedCommand {
    pub action: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    pub confidence: f64,
}

impl ParsedCommand {
    pub fn new(action: impl Into<String>, confidence: f64) -> Self {
        Self { action: action.into(), parameters: BTreeMap::new(), confidence }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn meets_threshold(&self) -> bool {
        self.confidence.is_finite() && self.confidence >= CONFIDENCE_THRESHOLD
    }

    pub fn is_task_complete(&self) -> bool {
        self.action.trim() == TASK_COMPLETE
    }

    pub fn summary(&self) -> Option<&str> {
        self.parameters.get("summary").and_then(Value::as_str).map(str::trim)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
    Top,
    Bottom,
}

impl ScrollDirection {
    pub const NAMES: &'static [&'static str] = &["up", "down", "top", "bottom"];

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "top" => Some(Self::Top),
            "bottom" => Some(Self::Bottom),
            _ => None,
        }
    }
}

impl fmt::Display for ScrollDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Top => "top",
            Self::Bottom => "bottom",
        };
        f.write_str(name)
    }
}

/// Parameters after validation at the catalog boundary, one variant per action kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionParams {
    Navigate { section: String },
    ReadContent { section: Option<String> },
    Extract { query: String, limit: Option<u32> },
    Scroll { direction: ScrollDirection },
    TaskComplete { summary: String },
}

impl ActionParams {
    pub fn from_command(
        definition: &ActionDefinition,
        command: &ParsedCommand,
    ) -> Result<Self, ParamError> {
        definition.validate(&command.parameters)?;
        let params = &command.parameters;

        let typed = match definition.kind {
            ActionKind::Navigate => {
                Self::Navigate { section: required_str(definition, params, "section")? }
            }
            ActionKind::ReadContent => {
                Self::ReadContent { section: optional_str(params, "section") }
            }
            ActionKind::Extract => Self::Extract {
                query: required_str(definition, params, "query")?,
                limit: params
                    .get("limit")
                    .and_then(Value::as_u64)
                    .map(|limit| u32::try_from(limit).unwrap_or(u32::MAX)),
            },
            ActionKind::Scroll => {
                let raw = required_str(definition, params, "direction")?;
                let direction =
                    ScrollDirection::parse(&raw).ok_or_else(|| ParamError::WrongKind {
                        action: definition.name.to_string(),
                        param: "direction".to_string(),
                        expected: ParamKind::Choice(ScrollDirection::NAMES).to_string(),
                        found: raw.clone(),
                    })?;
                Self::Scroll { direction }
            }
            ActionKind::TaskComplete => {
                Self::TaskComplete { summary: optional_str(params, "summary").unwrap_or_default() }
            }
        };

        Ok(typed)
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Navigate { .. } => ActionKind::Navigate,
            Self::ReadContent { .. } => ActionKind::ReadContent,
            Self::Extract { .. } => ActionKind::Extract,
            Self::Scroll { .. } => ActionKind::Scroll,
            Self::TaskComplete { .. } => ActionKind::TaskComplete,
        }
    }
}

fn required_str(
    definition: &ActionDefinition,
    params: &BTreeMap<String, Value>,
    name: &str,
) -> Result<String, ParamError> {
    optional_str(params, name).ok_or_else(|| ParamError::Missing {
        action: definition.name.to_string(),
        param: name.to_string(),
    })
}

fn optional_str(params: &BTreeMap<String, Value>, name: &str) -> Option<String> {
    params
        .get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

/// Typed result of one successful action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionPayload {
    Navigated { title: String, locator: String },
    Content { section: Option<String>, text: String },
    Extracted { query: String, matches: Vec<String> },
    Scrolled { direction: ScrollDirection },
}

impl ActionPayload {
    pub fn describe(&self) -> String {
        match self {
            Self::Navigated { title, locator } => format!("Navigated to \"{title}\" ({locator})."),
            Self::Content { section: Some(section), text } => {
                format!("Content of \"{section}\":\n{text}")
            }
            Self::Content { section: None, text } => format!("Page content:\n{text}"),
            Self::Extracted { query, matches } if matches.is_empty() => {
                format!("No matches found for \"{query}\".")
            }
            Self::Extracted { query, matches } => {
                format!("Matches for \"{query}\":\n- {}", matches.join("\n- "))
            }
            Self::Scrolled { direction } => format!("Scrolled {direction}."),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Succeeded { action: String, payload: ActionPayload },
    Failed { action: String, error: String },
}

impl ExecutionOutcome {
    pub fn succeeded(action: impl Into<String>, payload: ActionPayload) -> Self {
        Self::Succeeded { action: action.into(), payload }
    }

    pub fn failed(action: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Failed { action: action.into(), error: error.into() }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    pub fn action(&self) -> &str {
        match self {
            Self::Succeeded { action, .. } | Self::Failed { action, .. } => action,
        }
    }

    /// Text handed back to the oracle as an assistant turn.
    pub fn describe(&self) -> String {
        match self {
            Self::Succeeded { action, payload } => {
                format!("Action `{action}` succeeded. {}", payload.describe())
            }
            Self::Failed { action, error } => format!("Action `{action}` failed: {error}"),
        }
    }
}
