//! # gtdflow-store
//!
//! Storage backends for the gtdflow pipeline.
//!
//! This crate provides:
//! - `MemoryCacheStore` and `JsonFileCacheStore` implementing `CacheStore`
//! - `MemoryDocumentStore` and `FsDocumentStore` implementing `DocumentStore`
//!
//! File-backed stores replace files atomically (temp file + rename).

mod atomic;
pub mod cache;
pub mod documents;

pub use cache::{JsonFileCacheStore, MemoryCacheStore};
pub use documents::{FsDocumentStore, MemoryDocumentStore};
