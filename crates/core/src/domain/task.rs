use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn generate() -> Self {
        Self(format!("task-{}", Uuid::new_v4()))
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The thing a task acts upon, e.g. one open page. `id` keys the context store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTarget {
    pub id: String,
    pub url: Option<String>,
}

impl TaskTarget {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), url: None }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// One natural-language instruction bound to a target. Immutable once a loop starts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub instruction: String,
    pub target: TaskTarget,
}

impl Task {
    pub fn new(instruction: impl Into<String>, target: TaskTarget) -> Self {
        Self { id: TaskId::generate(), instruction: instruction.into(), target }
    }
}

/// An addressable section of the target, in page order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSection {
    pub title: String,
    pub locator: String,
}

impl PageSection {
    pub fn new(title: impl Into<String>, locator: impl Into<String>) -> Self {
        Self { title: title.into(), locator: locator.into() }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub sections: Vec<PageSection>,
}

impl ContextSnapshot {
    pub fn new(sections: Vec<PageSection>) -> Self {
        Self { sections }
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Case-insensitive lookup by title or exact locator.
    pub fn find(&self, needle: &str) -> Option<&PageSection> {
        let needle = needle.trim();
        self.sections.iter().find(|section| {
            section.locator == needle || section.title.eq_ignore_ascii_case(needle)
        })
    }

    pub fn render(&self) -> String {
        if self.sections.is_empty() {
            return "No page structure is available.".to_string();
        }

        let mut lines = vec!["Page sections (in order):".to_string()];
        for (index, section) in self.sections.iter().enumerate() {
            lines.push(format!("{}. {} ({})", index + 1, section.title, section.locator));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::{ContextSnapshot, PageSection, Task, TaskTarget};

    #[test]
    fn find_matches_title_case_insensitively_or_locator() {
        let snapshot = ContextSnapshot::new(vec![
            PageSection::new("About", "#about"),
            PageSection::new("Pricing", "#pricing"),
        ]);

        assert_eq!(snapshot.find("about").map(|s| s.locator.as_str()), Some("#about"));
        assert_eq!(snapshot.find("#pricing").map(|s| s.title.as_str()), Some("Pricing"));
        assert!(snapshot.find("careers").is_none());
    }

    #[test]
    fn render_lists_sections_in_order() {
        let snapshot = ContextSnapshot::new(vec![
            PageSection::new("Intro", "#intro"),
            PageSection::new("About", "#about"),
        ]);

        let rendered = snapshot.render();
        assert!(rendered.contains("1. Intro (#intro)"));
        assert!(rendered.contains("2. About (#about)"));
        assert_eq!(ContextSnapshot::default().render(), "No page structure is available.");
    }

    #[test]
    fn new_tasks_get_distinct_ids() {
        let target = TaskTarget::new("tab-1").with_url("https://example.com");
        let first = Task::new("read the page", target.clone());
        let second = Task::new("read the page", target);

        assert_ne!(first.id, second.id);
        assert!(first.id.0.starts_with("task-"));
    }
}
