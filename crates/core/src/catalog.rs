use std::collections::BTreeSet;

use crate::domain::action::{
    ActionDefinition, ActionKind, ParamKind, ParamSpec, ScrollDirection, TASK_COMPLETE,
};
use crate::errors::DomainError;

/// Name of the action that must run before any content-dependent answer.
pub const READ_ACTION: &str = "read_content";

/// Read-only registry of the actions a task may invoke. Safe to share between tasks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionCatalog {
    definitions: Vec<ActionDefinition>,
}

impl ActionCatalog {
    pub fn new(definitions: Vec<ActionDefinition>) -> Result<Self, DomainError> {
        let mut seen = BTreeSet::new();
        for definition in &definitions {
            if !seen.insert(definition.name) {
                return Err(DomainError::InvariantViolation(format!(
                    "duplicate action name `{}` in catalog",
                    definition.name
                )));
            }
        }

        if !definitions.iter().any(|definition| definition.name == TASK_COMPLETE) {
            return Err(DomainError::InvariantViolation(format!(
                "catalog must define the terminal `{TASK_COMPLETE}` action"
            )));
        }

        Ok(Self { definitions })
    }

    pub fn builtin() -> Self {
        Self { definitions: builtin_definitions() }
    }

    pub fn get(&self, name: &str) -> Option<&ActionDefinition> {
        let name = name.trim();
        self.definitions.iter().find(|definition| definition.name == name)
    }

    pub fn definitions(&self) -> &[ActionDefinition] {
        &self.definitions
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.definitions.iter().map(|definition| definition.name).collect()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// One `name: description` line per action, used as classifier context.
    pub fn summary(&self) -> String {
        self.definitions
            .iter()
            .map(|definition| format!("- {}: {}", definition.name, definition.description))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Full listing with parameters and examples, used in the session system prompt.
    pub fn render_detailed(&self) -> String {
        let mut blocks = Vec::with_capacity(self.definitions.len());
        for definition in &self.definitions {
            let mut block = vec![format!("## {}", definition.name), definition.description.into()];

            if definition.parameters.is_empty() {
                block.push("Parameters: none".to_string());
            } else {
                block.push("Parameters:".to_string());
                for param in &definition.parameters {
                    let presence = if param.required { "required" } else { "optional" };
                    block.push(format!(
                        "  - {} ({}, {}): {}",
                        param.name, param.kind, presence, param.description
                    ));
                }
            }

            if !definition.examples.is_empty() {
                block.push("Examples:".to_string());
                block.extend(definition.examples.iter().map(|example| format!("  {example}")));
            }

            blocks.push(block.join("\n"));
        }
        blocks.join("\n\n")
    }
}

impl Default for ActionCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn builtin_definitions() -> Vec<ActionDefinition> {
    vec![
        ActionDefinition {
            name: "navigate",
            kind: ActionKind::Navigate,
            description: "Move the view to a section of the page.",
            parameters: vec![ParamSpec::required(
                "section",
                ParamKind::String,
                "section title or locator taken from the page sections list",
            )],
            examples: vec![r##"{"action":"navigate","parameters":{"section":"About"},"confidence":0.95}"##],
        },
        ActionDefinition {
            name: READ_ACTION,
            kind: ActionKind::ReadContent,
            description: "Read the text of the page or of one section. Required before summarizing or answering questions about page content.",
            parameters: vec![ParamSpec::optional(
                "section",
                ParamKind::String,
                "section title or locator; omit to read the whole page",
            )],
            examples: vec![
                r#"{"action":"read_content","parameters":{},"confidence":0.9}"#,
                r#"{"action":"read_content","parameters":{"section":"Pricing"},"confidence":0.9}"#,
            ],
        },
        ActionDefinition {
            name: "extract",
            kind: ActionKind::Extract,
            description: "Find lines of page text matching a query.",
            parameters: vec![
                ParamSpec::required("query", ParamKind::String, "text to search for"),
                ParamSpec::optional("limit", ParamKind::Integer, "maximum number of matches"),
            ],
            examples: vec![r#"{"action":"extract","parameters":{"query":"email","limit":3},"confidence":0.85}"#],
        },
        ActionDefinition {
            name: "scroll",
            kind: ActionKind::Scroll,
            description: "Scroll the page.",
            parameters: vec![ParamSpec::required(
                "direction",
                ParamKind::Choice(ScrollDirection::NAMES),
                "where to scroll",
            )],
            examples: vec![r#"{"action":"scroll","parameters":{"direction":"down"},"confidence":0.9}"#],
        },
        ActionDefinition {
            name: TASK_COMPLETE,
            kind: ActionKind::TaskComplete,
            description: "Finish the task and report the result to the user.",
            parameters: vec![ParamSpec::required(
                "summary",
                ParamKind::String,
                "final answer or a short description of what was done",
            )],
            examples: vec![r#"{"action":"task_complete","parameters":{"summary":"Moved to the About section."},"confidence":0.95}"#],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::{ActionCatalog, READ_ACTION};
    use crate::domain::action::{ActionDefinition, ActionKind, TASK_COMPLETE};
    use crate::errors::DomainError;

    fn definition(name: &'static str, kind: ActionKind) -> ActionDefinition {
        ActionDefinition { name, kind, description: "", parameters: vec![], examples: vec![] }
    }

    #[test]
    fn builtin_catalog_has_read_and_terminal_actions() {
        let catalog = ActionCatalog::builtin();
        assert!(catalog.get(READ_ACTION).is_some());
        assert!(catalog.get(TASK_COMPLETE).is_some());
        assert!(catalog.get(" navigate ").is_some());
        assert!(catalog.get("click").is_none());
        assert_eq!(catalog.len(), 5);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let error = ActionCatalog::new(vec![
            definition("navigate", ActionKind::Navigate),
            definition("navigate", ActionKind::Navigate),
            definition(TASK_COMPLETE, ActionKind::TaskComplete),
        ])
        .expect_err("duplicate names must fail");

        assert!(matches!(error, DomainError::InvariantViolation(ref message) if message.contains("duplicate")));
    }

    #[test]
    fn catalog_without_terminal_action_is_rejected() {
        let result = ActionCatalog::new(vec![definition("navigate", ActionKind::Navigate)]);
        assert!(result.is_err());
    }

    #[test]
    fn summary_and_detailed_render_every_action() {
        let catalog = ActionCatalog::builtin();
        let summary = catalog.summary();
        let detailed = catalog.render_detailed();

        for name in catalog.names() {
            assert!(summary.contains(&format!("- {name}:")));
            assert!(detailed.contains(&format!("## {name}")));
        }
        assert!(detailed.contains("direction (one of up|down|top|bottom, required)"));
        assert!(detailed.contains("section (string, optional)"));
    }
}
