use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use pagepilot_core::{ActionParams, ActionPayload, PageSection, ScrollDirection};

/// Executable implementation behind one catalog entry.
#[async_trait]
pub trait Action: Send + Sync {
    fn name(&self) -> &'static str;
    async fn invoke(&self, params: ActionParams) -> Result<ActionPayload>;
}

/// Surface the built-in actions drive. One implementation per kind of target.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn navigate(&self, section: &str) -> Result<PageSection>;
    /// Text of `section`, or of the whole page in section order when `None`.
    async fn read_content(&self, section: Option<&str>) -> Result<String>;
    async fn scroll(&self, direction: ScrollDirection) -> Result<()>;
}

#[derive(Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    /// Registers the navigate, read_content, extract and scroll actions against `driver`.
    pub fn with_page_driver(driver: Arc<dyn PageDriver>) -> Self {
        let mut registry = Self::default();
        registry.register(NavigateAction { driver: driver.clone() });
        registry.register(ReadContentAction { driver: driver.clone() });
        registry.register(ExtractAction { driver: driver.clone() });
        registry.register(ScrollAction { driver });
        registry
    }

    pub fn register<T>(&mut self, action: T)
    where
        T: Action + 'static,
    {
        self.actions.insert(action.name().to_string(), Arc::new(action));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

pub struct NavigateAction {
    driver: Arc<dyn PageDriver>,
}

#[async_trait]
impl Action for NavigateAction {
    fn name(&self) -> &'static str {
        "navigate"
    }

    async fn invoke(&self, params: ActionParams) -> Result<ActionPayload> {
        let section = match params {
            ActionParams::Navigate { section } => section,
            other => bail!("navigate received {:?} parameters", other.kind()),
        };
        let section = self.driver.navigate(&section).await?;
        Ok(ActionPayload::Navigated { title: section.title, locator: section.locator })
    }
}

pub struct ReadContentAction {
    driver: Arc<dyn PageDriver>,
}

#[async_trait]
impl Action for ReadContentAction {
    fn name(&self) -> &'static str {
        "read_content"
    }

    async fn invoke(&self, params: ActionParams) -> Result<ActionPayload> {
        let section = match params {
            ActionParams::ReadContent { section } => section,
            other => bail!("read_content received {:?} parameters", other.kind()),
        };
        let text = self.driver.read_content(section.as_deref()).await?;
        Ok(ActionPayload::Content { section, text })
    }
}

pub struct ExtractAction {
    driver: Arc<dyn PageDriver>,
}

const DEFAULT_EXTRACT_LIMIT: u32 = 5;

#[async_trait]
impl Action for ExtractAction {
    fn name(&self) -> &'static str {
        "extract"
    }

    async fn invoke(&self, params: ActionParams) -> Result<ActionPayload> {
        let (query, limit) = match params {
            ActionParams::Extract { query, limit } => (query, limit),
            other => bail!("extract received {:?} parameters", other.kind()),
        };
        // Whole page, not just the section under the cursor.
        let text = self.driver.read_content(None).await?;
        let needle = query.to_lowercase();
        let limit = limit.unwrap_or(DEFAULT_EXTRACT_LIMIT) as usize;

        let matches = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && line.to_lowercase().contains(&needle))
            .take(limit)
            .map(str::to_owned)
            .collect();
        Ok(ActionPayload::Extracted { query, matches })
    }
}

pub struct ScrollAction {
    driver: Arc<dyn PageDriver>,
}

#[async_trait]
impl Action for ScrollAction {
    fn name(&self) -> &'static str {
        "scroll"
    }

    async fn invoke(&self, params: ActionParams) -> Result<ActionPayload> {
        let direction = match params {
            ActionParams::Scroll { direction } => direction,
            other => bail!("scroll received {:?} parameters", other.kind()),
        };
        self.driver.scroll(direction).await?;
        Ok(ActionPayload::Scrolled { direction })
    }
}
