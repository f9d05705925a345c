//! # gtdflow-core
//!
//! Core types, traits, and pure transforms for the gtdflow pipeline.
//!
//! This crate provides the foundational data structures and trait definitions
//! that other gtdflow crates depend on:
//! - Generation request/result and cache entry models
//! - Error taxonomy (transport, parse, region)
//! - `Transport`, `CacheStore` and `DocumentStore` seams
//! - Content digests over canonical entity context
//! - Idempotent managed-region merging

pub mod defaults;
pub mod digest;
pub mod error;
pub mod models;
pub mod regions;
pub mod traits;

// Re-export commonly used types at crate root
pub use digest::{digest, truncate_lines, ContentDigest, ContextFields};
pub use error::{
    Error, ParseError, RegionError, Result, TransportError, TransportErrorKind, Violation,
};
pub use models::*;
pub use regions::{
    merge, merge_at, read_region, spans, strip_regions, MergeAnchor, RegionMarkers, Span,
    SpanKind,
};
pub use traits::*;
