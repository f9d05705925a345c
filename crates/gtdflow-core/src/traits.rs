//! Core traits for gtdflow abstractions.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy, enabling pluggable backends and testability.

use async_trait::async_trait;

use crate::error::{Result, TransportError};
use crate::models::*;

// =============================================================================
// INFERENCE TRAITS
// =============================================================================

/// One wire mechanism for reaching the AI service.
///
/// Implementations encode the same logical request (system prompt, messages,
/// sampling parameters) and classify failures into [`TransportError`] kinds;
/// they never retry on their own.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name used in logs ("converse", "invoke").
    fn name(&self) -> &str;

    /// Send the request once.
    async fn send(
        &self,
        request: &GenerationRequest,
    ) -> std::result::Result<TransportResponse, TransportError>;
}

// =============================================================================
// STORAGE TRAITS
// =============================================================================

/// Key-value store of the last computation per entity.
///
/// Concurrent `get`/`put` on different keys must not interfere; consistency
/// is per-key last-writer-wins.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch the entry for a key.
    async fn get(&self, key: &EntityKey) -> Result<Option<CacheEntry>>;

    /// Insert or overwrite the entry for a key.
    async fn put(&self, key: &EntityKey, entry: CacheEntry) -> Result<()>;

    /// Remove the entry so the next run recomputes the entity.
    async fn force_invalidate(&self, key: &EntityKey) -> Result<()>;
}

/// Reads and writes whole target documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Full text of the document, or `None` if it does not exist yet.
    async fn read(&self, id: &DocumentId) -> Result<Option<String>>;

    /// Replace the full text of the document.
    async fn write(&self, id: &DocumentId, text: &str) -> Result<()>;
}
