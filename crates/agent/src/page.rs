use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use pagepilot_core::{ContextSnapshot, PageSection, ScrollDirection, TaskTarget};
use serde::{Deserialize, Serialize};

use crate::tools::PageDriver;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageDocument {
    #[serde(default)]
    pub url: Option<String>,
    pub sections: Vec<SectionDocument>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionDocument {
    pub title: String,
    pub locator: String,
    #[serde(default)]
    pub content: String,
}

/// An in-process page: ordered sections with text and a cursor for the current one.
#[derive(Debug)]
pub struct StaticPage {
    document: PageDocument,
    cursor: Mutex<usize>,
}

impl StaticPage {
    pub fn new(document: PageDocument) -> Self {
        Self { document, cursor: Mutex::new(0) }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let document: PageDocument =
            serde_json::from_str(raw).context("page document is not valid JSON")?;
        Ok(Self::new(document))
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read page file {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("failed to load {}", path.display()))
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot::new(
            self.document
                .sections
                .iter()
                .map(|section| PageSection::new(&section.title, &section.locator))
                .collect(),
        )
    }

    /// Keyed by URL when present so saved context follows the page.
    pub fn target(&self, fallback_id: &str) -> TaskTarget {
        match &self.document.url {
            Some(url) => TaskTarget::new(url.clone()).with_url(url.clone()),
            None => TaskTarget::new(fallback_id),
        }
    }

    pub fn current_section(&self) -> Option<&SectionDocument> {
        self.document.sections.get(self.cursor())
    }

    fn cursor(&self) -> usize {
        match self.cursor.lock() {
            Ok(cursor) => *cursor,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn set_cursor(&self, index: usize) {
        match self.cursor.lock() {
            Ok(mut cursor) => *cursor = index,
            Err(poisoned) => *poisoned.into_inner() = index,
        }
    }

    /// Every non-empty section's text in page order, blank-line separated.
    fn full_text(&self) -> String {
        self.document
            .sections
            .iter()
            .map(|section| section.content.trim())
            .filter(|content| !content.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn position_of(&self, needle: &str) -> Option<usize> {
        let needle = needle.trim();
        self.document.sections.iter().position(|section| {
            section.locator == needle || section.title.eq_ignore_ascii_case(needle)
        })
    }
}

#[async_trait]
impl PageDriver for StaticPage {
    async fn navigate(&self, section: &str) -> Result<PageSection> {
        let index =
            self.position_of(section).ok_or_else(|| anyhow!("no section named `{section}`"))?;
        self.set_cursor(index);
        let found = &self.document.sections[index];
        Ok(PageSection::new(&found.title, &found.locator))
    }

    async fn read_content(&self, section: Option<&str>) -> Result<String> {
        let Some(name) = section else {
            return Ok(self.full_text());
        };
        let index = self.position_of(name).ok_or_else(|| anyhow!("no section named `{name}`"))?;
        Ok(self.document.sections[index].content.clone())
    }

    async fn scroll(&self, direction: ScrollDirection) -> Result<()> {
        let count = self.document.sections.len();
        if count == 0 {
            bail!("page has no sections to scroll");
        }
        let current = self.cursor();
        let next = match direction {
            ScrollDirection::Up => current.saturating_sub(1),
            ScrollDirection::Down => (current + 1).min(count - 1),
            ScrollDirection::Top => 0,
            ScrollDirection::Bottom => count - 1,
        };
        self.set_cursor(next);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pagepilot_core::{ActionParams, ActionPayload, ScrollDirection};

    use super::StaticPage;
    use crate::tools::{ActionRegistry, PageDriver};

    const PAGE: &str = r##"{
        "url": "https://example.com",
        "sections": [
            {"title": "Intro", "locator": "#intro", "content": "Welcome."},
            {"title": "About", "locator": "#about", "content": "We build tools."},
            {"title": "Contact", "locator": "#contact"}
        ]
    }"##;

    #[test]
    fn snapshot_and_target_follow_document() {
        let page = StaticPage::from_json(PAGE).expect("page");
        let snapshot = page.snapshot();

        assert_eq!(snapshot.sections.len(), 3);
        assert_eq!(snapshot.sections[1].locator, "#about");
        assert_eq!(page.target("fallback").id, "https://example.com");
    }

    #[tokio::test]
    async fn navigate_moves_cursor_for_later_reads() {
        let page = StaticPage::from_json(PAGE).expect("page");

        let section = page.navigate("about").await.expect("navigate");
        assert_eq!(section.title, "About");
        assert_eq!(page.current_section().map(|s| s.title.as_str()), Some("About"));
        assert_eq!(page.read_content(Some("#intro")).await.expect("read"), "Welcome.");
        assert!(page.navigate("Pricing").await.is_err());
    }

    #[tokio::test]
    async fn scroll_is_bounded_by_section_range() {
        let page = StaticPage::from_json(PAGE).expect("page");

        page.scroll(ScrollDirection::Up).await.expect("scroll");
        assert_eq!(page.current_section().map(|s| s.title.as_str()), Some("Intro"));
        page.scroll(ScrollDirection::Bottom).await.expect("scroll");
        page.scroll(ScrollDirection::Down).await.expect("scroll");
        assert_eq!(page.current_section().map(|s| s.title.as_str()), Some("Contact"));
        assert_eq!(page.read_content(Some("Contact")).await.expect("read"), "");
    }

    #[tokio::test]
    async fn unscoped_read_covers_every_section_regardless_of_cursor() {
        let page = StaticPage::from_json(PAGE).expect("page");

        assert_eq!(page.read_content(None).await.expect("read"), "Welcome.\n\nWe build tools.");
        page.scroll(ScrollDirection::Bottom).await.expect("scroll");
        assert_eq!(page.read_content(None).await.expect("read"), "Welcome.\n\nWe build tools.");
        assert!(page.read_content(Some("Pricing")).await.is_err());
    }

    #[tokio::test]
    async fn extract_searches_sections_away_from_the_cursor() {
        let page = Arc::new(
            StaticPage::from_json(
                r##"{"sections": [
                    {"title": "Intro", "locator": "#intro", "content": "Welcome."},
                    {"title": "Pricing", "locator": "#pricing", "content": "Pro costs $20"}
                ]}"##,
            )
            .expect("page"),
        );
        let registry = ActionRegistry::with_page_driver(page.clone());

        let payload = registry
            .get("extract")
            .expect("extract")
            .invoke(ActionParams::Extract { query: "costs".to_string(), limit: None })
            .await
            .expect("extract");

        assert_eq!(
            payload,
            ActionPayload::Extracted {
                query: "costs".to_string(),
                matches: vec!["Pro costs $20".to_string()],
            }
        );
        assert_eq!(page.current_section().map(|s| s.title.as_str()), Some("Intro"));
    }

    #[tokio::test]
    async fn empty_page_cannot_scroll() {
        let page = StaticPage::from_json(r#"{"sections": []}"#).expect("page");
        assert!(page.scroll(ScrollDirection::Down).await.is_err());
        assert_eq!(page.target("tab-7").id, "tab-7");
    }

    #[test]
    fn invalid_json_is_reported() {
        let error = StaticPage::from_json("{").expect_err("invalid");
        assert!(error.to_string().contains("not valid JSON"));
    }
}
