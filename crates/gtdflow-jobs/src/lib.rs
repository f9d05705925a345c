//! # gtdflow-jobs
//!
//! Batch processing for gtdflow.
//!
//! This crate provides:
//! - The `EntityHandler` seam a host implements for one kind of entity
//! - A `Scheduler` that skips cached entities, runs the rest on a bounded
//!   worker pool, and merges results into documents one at a time
//! - A batch-wide throttle governor
//! - Cooperative cancellation and batch events via broadcast channels
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use gtdflow_jobs::{BatchOptions, Scheduler, SchedulerConfig};
//!
//! let scheduler = Scheduler::new(
//!     Arc::new(handler),
//!     client,
//!     cache,
//!     documents,
//!     SchedulerConfig::from_env(),
//! );
//!
//! let mut events = scheduler.events();
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         println!("Event: {:?}", event);
//!     }
//! });
//!
//! let report = scheduler.run(keys, BatchOptions::default()).await;
//! println!("{} reviewed, {} skipped", report.succeeded.len(), report.skipped.len());
//! ```

pub mod governor;
pub mod handler;
pub mod scheduler;

pub use governor::ThrottleGovernor;
pub use handler::EntityHandler;
pub use scheduler::{
    BatchEvent, BatchOptions, BatchReport, Failed, FailureKind, Scheduler, SchedulerConfig,
    Succeeded,
};

// CancellationToken is part of the public API.
pub use tokio_util::sync::CancellationToken;
