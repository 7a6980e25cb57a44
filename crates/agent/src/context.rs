use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use pagepilot_core::{ContextSnapshot, TaskTarget};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("context store i/o failed for `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("stored context for `{target}` is not valid: {source}")]
    Decode {
        target: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Supplies the structural snapshot for a target. A missing snapshot is not an error.
#[async_trait]
pub trait ContextLoader: Send + Sync {
    async fn load_context(&self, target: &TaskTarget) -> Result<ContextSnapshot, ContextError>;
}

#[async_trait]
pub trait ContextStore: Send + Sync {
    async fn get(&self, target_id: &str) -> Result<Option<ContextSnapshot>, ContextError>;
    async fn put(&self, target_id: &str, snapshot: &ContextSnapshot) -> Result<(), ContextError>;
    async fn remove(&self, target_id: &str) -> Result<(), ContextError>;
}

#[derive(Default)]
pub struct InMemoryContextStore {
    entries: RwLock<HashMap<String, ContextSnapshot>>,
}

#[async_trait]
impl ContextStore for InMemoryContextStore {
    async fn get(&self, target_id: &str) -> Result<Option<ContextSnapshot>, ContextError> {
        Ok(self.entries.read().await.get(target_id).cloned())
    }

    async fn put(&self, target_id: &str, snapshot: &ContextSnapshot) -> Result<(), ContextError> {
        self.entries.write().await.insert(target_id.to_string(), snapshot.clone());
        Ok(())
    }

    async fn remove(&self, target_id: &str) -> Result<(), ContextError> {
        self.entries.write().await.remove(target_id);
        Ok(())
    }
}

/// One JSON document per target under `root`.
#[derive(Clone, Debug)]
pub struct FileContextStore {
    root: PathBuf,
}

impl FileContextStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, target_id: &str) -> PathBuf {
        let file_stem: String = target_id
            .chars()
            .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
            .collect();
        self.root.join(format!("{file_stem}.json"))
    }
}

#[async_trait]
impl ContextStore for FileContextStore {
    async fn get(&self, target_id: &str) -> Result<Option<ContextSnapshot>, ContextError> {
        let path = self.path_for(target_id);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(ContextError::Io { path, source }),
        };

        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|source| ContextError::Decode { target: target_id.to_string(), source })
    }

    async fn put(&self, target_id: &str, snapshot: &ContextSnapshot) -> Result<(), ContextError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| ContextError::Io { path: self.root.clone(), source })?;

        let path = self.path_for(target_id);
        let encoded = serde_json::to_vec_pretty(snapshot)
            .map_err(|source| ContextError::Decode { target: target_id.to_string(), source })?;
        tokio::fs::write(&path, encoded).await.map_err(|source| ContextError::Io { path, source })
    }

    async fn remove(&self, target_id: &str) -> Result<(), ContextError> {
        let path = self.path_for(target_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ContextError::Io { path, source }),
        }
    }
}

/// Loads snapshots from a store, falling back to an empty snapshot when none is saved.
#[derive(Clone)]
pub struct ContextRepository {
    store: Arc<dyn ContextStore>,
}

impl ContextRepository {
    pub fn new(store: Arc<dyn ContextStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryContextStore::default()))
    }

    pub async fn save(
        &self,
        target: &TaskTarget,
        snapshot: &ContextSnapshot,
    ) -> Result<(), ContextError> {
        self.store.put(&target.id, snapshot).await
    }

    pub async fn forget(&self, target: &TaskTarget) -> Result<(), ContextError> {
        self.store.remove(&target.id).await
    }
}

#[async_trait]
impl ContextLoader for ContextRepository {
    async fn load_context(&self, target: &TaskTarget) -> Result<ContextSnapshot, ContextError> {
        let snapshot = self.store.get(&target.id).await?;
        debug!(
            event_name = "agent.context.loaded",
            target_id = %target.id,
            found = snapshot.is_some(),
            "loaded target context"
        );
        Ok(snapshot.unwrap_or_default())
    }
}

/// A fixed snapshot, for callers that already know the page structure.
#[derive(Clone, Debug, Default)]
pub struct StaticContextLoader {
    snapshot: ContextSnapshot,
}

impl StaticContextLoader {
    pub fn new(snapshot: ContextSnapshot) -> Self {
        Self { snapshot }
    }
}

#[async_trait]
impl ContextLoader for StaticContextLoader {
    async fn load_context(&self, _target: &TaskTarget) -> Result<ContextSnapshot, ContextError> {
        Ok(self.snapshot.clone())
    }
}
