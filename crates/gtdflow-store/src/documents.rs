//! Document stores for merged output.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use gtdflow_core::{DocumentId, DocumentStore, Error, Result};

use crate::atomic::write_atomic;

/// Documents held in memory.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<HashMap<DocumentId, String>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document.
    pub async fn insert(&self, id: impl Into<DocumentId>, text: impl Into<String>) {
        self.documents.write().await.insert(id.into(), text.into());
    }

    pub async fn get(&self, id: &DocumentId) -> Option<String> {
        self.documents.read().await.get(id).cloned()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn read(&self, id: &DocumentId) -> Result<Option<String>> {
        Ok(self.documents.read().await.get(id).cloned())
    }

    async fn write(&self, id: &DocumentId, text: &str) -> Result<()> {
        self.documents
            .write()
            .await
            .insert(id.clone(), text.to_string());
        Ok(())
    }
}

/// Documents as UTF-8 files under a root directory.
///
/// Document ids are relative paths; ids that would escape the root are
/// rejected.
#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an id to a path inside the root.
    pub fn resolve(&self, id: &DocumentId) -> Result<PathBuf> {
        let relative = Path::new(id.as_str());
        if id.as_str().is_empty() {
            return Err(Error::InvalidInput("document id is empty".to_string()));
        }
        let escapes = relative.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes {
            return Err(Error::InvalidInput(format!(
                "document id escapes the store root: {}",
                id
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn read(&self, id: &DocumentId) -> Result<Option<String>> {
        let path = self.resolve(id)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Document(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn write(&self, id: &DocumentId, text: &str) -> Result<()> {
        let path = self.resolve(id)?;
        debug!(document = %id, bytes = text.len(), "Writing document");
        write_atomic(&path, text.as_bytes())
            .await
            .map_err(|e| Error::Document(format!("failed to write {}: {}", path.display(), e)))
    }
}
