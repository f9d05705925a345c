//! Cache stores keyed by entity.
//!
//! Both stores hold one entry per key, overwritten in place and never
//! expired. Concurrent access to different keys never blocks on I/O of
//! the in-memory map.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use gtdflow_core::defaults::CACHE_FORMAT_VERSION;
use gtdflow_core::{CacheEntry, CacheStore, EntityKey, Error, Result};

use crate::atomic::write_atomic;

// =============================================================================
// IN-MEMORY
// =============================================================================

/// Process-local cache, for tests and one-shot runs.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<EntityKey, CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &EntityKey) -> Result<Option<CacheEntry>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &EntityKey, entry: CacheEntry) -> Result<()> {
        self.entries.write().await.insert(key.clone(), entry);
        Ok(())
    }

    async fn force_invalidate(&self, key: &EntityKey) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

// =============================================================================
// FLAT JSON FILE
// =============================================================================

/// On-disk layout of the cache file.
#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    entries: BTreeMap<EntityKey, CacheEntry>,
}

/// Cache persisted as a single JSON document.
///
/// The file is loaded once at open and rewritten atomically after every
/// mutation. Rewrites are serialized so the file always reflects a complete
/// snapshot.
#[derive(Debug)]
pub struct JsonFileCacheStore {
    path: PathBuf,
    entries: RwLock<HashMap<EntityKey, CacheEntry>>,
    write_lock: Mutex<()>,
}

impl JsonFileCacheStore {
    /// Open the cache at `path`, starting empty if the file is missing,
    /// unreadable as JSON, or written by another format version.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = Self::load(&path).await?;
        info!(
            path = %path.display(),
            entries = entries.len(),
            "Opened cache file"
        );
        Ok(Self {
            path,
            entries: RwLock::new(entries),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn load(path: &Path) -> Result<HashMap<EntityKey, CacheEntry>> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No cache file yet");
                return Ok(HashMap::new());
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<CacheFile>(&bytes) {
            Ok(file) if file.version == CACHE_FORMAT_VERSION => {
                Ok(file.entries.into_iter().collect())
            }
            Ok(file) => {
                warn!(
                    path = %path.display(),
                    found = file.version,
                    expected = CACHE_FORMAT_VERSION,
                    "Cache file version mismatch, starting empty"
                );
                Ok(HashMap::new())
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Cache file is corrupt, starting empty"
                );
                Ok(HashMap::new())
            }
        }
    }

    /// Write `entries` as the new file contents. Callers hold `write_lock`.
    async fn persist(&self, entries: &HashMap<EntityKey, CacheEntry>) -> Result<()> {
        let snapshot = CacheFile {
            version: CACHE_FORMAT_VERSION,
            entries: entries
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)?;
        write_atomic(&self.path, &bytes).await.map_err(|e| {
            Error::Cache(format!(
                "failed to write cache file {}: {}",
                self.path.display(),
                e
            ))
        })
    }
}

#[async_trait]
impl CacheStore for JsonFileCacheStore {
    async fn get(&self, key: &EntityKey) -> Result<Option<CacheEntry>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    /// The entry becomes visible only once it is on disk.
    async fn put(&self, key: &EntityKey, entry: CacheEntry) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut next = self.entries.read().await.clone();
        next.insert(key.clone(), entry);
        self.persist(&next).await?;
        *self.entries.write().await = next;
        Ok(())
    }

    /// The entry is dropped from memory even when the rewrite fails.
    async fn force_invalidate(&self, key: &EntityKey) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let next = {
            let mut entries = self.entries.write().await;
            if entries.remove(key).is_none() {
                return Ok(());
            }
            entries.clone()
        };
        debug!(entity_key = %key, "Invalidated cache entry");
        self.persist(&next).await
    }
}
