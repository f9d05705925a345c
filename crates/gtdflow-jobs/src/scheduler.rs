//! Batch scheduler for entity reviews.
//!
//! A batch runs in three phases:
//!
//! 1. **Partition.** Every input key is loaded, digested and checked against
//!    the cache. Fresh entries are skipped without touching the network.
//! 2. **Dispatch.** Stale entities run on a bounded [`JoinSet`] pool. Each job
//!    sends its request through the [`InferenceClient`] and validates the
//!    response, re-issuing a strict request once when validation fails.
//! 3. **Commit.** The coordinator loop records every completed job: cache
//!    first, then the document merge, then the report. All merges happen on
//!    the coordinator, one at a time.
//!
//! A failed entity never aborts the batch. Cancellation stops dispatching,
//! abandons in-flight jobs without committing them, and still returns a
//! report.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use gtdflow_core::defaults::{
    BATCH_CONCURRENCY, EVENT_BUS_CAPACITY, THROTTLE_BASE_DELAY_MS, THROTTLE_MAX_DELAY_MS,
    THROTTLE_RECOVERY_SUCCESSES,
};
use gtdflow_core::{
    digest, merge_at, needs_recompute, CacheEntry, CacheStore, ContentDigest, DocumentId,
    DocumentStore, EntityKey, Error, GenerationRequest, GenerationResult, ParseError,
    TransportErrorKind, TransportKind,
};
use gtdflow_inference::{parse_value, InferenceClient, Schema};

use crate::governor::ThrottleGovernor;
use crate::handler::EntityHandler;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Configuration for the batch scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Default number of jobs in flight when a batch does not override it.
    pub concurrency: usize,
    /// First inter-dispatch delay after a throttle signal.
    pub throttle_base_delay: Duration,
    /// Cap for the inter-dispatch delay.
    pub throttle_max_delay: Duration,
    /// Consecutive clean completions needed to restore one slot.
    pub recovery_successes: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: BATCH_CONCURRENCY,
            throttle_base_delay: Duration::from_millis(THROTTLE_BASE_DELAY_MS),
            throttle_max_delay: Duration::from_millis(THROTTLE_MAX_DELAY_MS),
            recovery_successes: THROTTLE_RECOVERY_SUCCESSES,
        }
    }
}

impl SchedulerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `GTDFLOW_CONCURRENCY` | `3` | Max jobs in flight |
    /// | `GTDFLOW_THROTTLE_BASE_MS` | `1000` | First pause between dispatches after throttling |
    /// | `GTDFLOW_THROTTLE_MAX_MS` | `30000` | Longest pause between dispatches |
    /// | `GTDFLOW_RECOVERY_SUCCESSES` | `3` | Clean completions per restored slot |
    pub fn from_env() -> Self {
        let concurrency = std::env::var("GTDFLOW_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(BATCH_CONCURRENCY)
            .max(1);

        let throttle_base_ms = std::env::var("GTDFLOW_THROTTLE_BASE_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(THROTTLE_BASE_DELAY_MS);

        let throttle_max_ms = std::env::var("GTDFLOW_THROTTLE_MAX_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(THROTTLE_MAX_DELAY_MS)
            .max(throttle_base_ms);

        let recovery_successes = std::env::var("GTDFLOW_RECOVERY_SUCCESSES")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(THROTTLE_RECOVERY_SUCCESSES)
            .max(1);

        Self {
            concurrency,
            throttle_base_delay: Duration::from_millis(throttle_base_ms),
            throttle_max_delay: Duration::from_millis(throttle_max_ms),
            recovery_successes,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_throttle_delays(mut self, base: Duration, max: Duration) -> Self {
        self.throttle_base_delay = base;
        self.throttle_max_delay = max.max(base);
        self
    }

    pub fn with_recovery_successes(mut self, n: u32) -> Self {
        self.recovery_successes = n.max(1);
        self
    }

    /// Batch options seeded from this config.
    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            concurrency: self.concurrency,
            force_refresh: false,
        }
    }
}

/// Per-batch options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// Max jobs in flight (at least 1).
    pub concurrency: usize,
    /// Recompute every entity regardless of the cache.
    pub force_refresh: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: BATCH_CONCURRENCY,
            force_refresh: false,
        }
    }
}

impl BatchOptions {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }
}

// =============================================================================
// REPORT
// =============================================================================

/// Why an entity did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The handler could not build the entity's context.
    Load,
    /// Another entity in the batch already targets the same document.
    Conflict,
    /// The AI service call failed after retries.
    Transport(TransportErrorKind),
    /// The response never passed validation.
    Parse,
    /// The document's managed region is malformed.
    Merge,
    /// The document could not be read or written.
    Document,
    /// The cache could not record the result.
    Cache,
    /// The job panicked.
    Panic,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Load => f.write_str("load"),
            FailureKind::Conflict => f.write_str("conflict"),
            FailureKind::Transport(kind) => write!(f, "transport/{}", kind),
            FailureKind::Parse => f.write_str("parse"),
            FailureKind::Merge => f.write_str("merge"),
            FailureKind::Document => f.write_str("document"),
            FailureKind::Cache => f.write_str("cache"),
            FailureKind::Panic => f.write_str("panic"),
        }
    }
}

impl FailureKind {
    fn from_error(err: &Error) -> Self {
        match err {
            Error::Region(_) => FailureKind::Merge,
            Error::Cache(_) => FailureKind::Cache,
            Error::Transport(e) => FailureKind::Transport(e.kind),
            Error::Parse(_) => FailureKind::Parse,
            _ => FailureKind::Document,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Succeeded<T> {
    pub key: EntityKey,
    pub result: T,
    pub computed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Failed {
    pub key: EntityKey,
    pub error: String,
    pub kind: FailureKind,
}

/// Outcome of one batch. Every distinct input key lands in exactly one list.
#[derive(Debug, Clone)]
pub struct BatchReport<T> {
    pub batch_id: Uuid,
    pub succeeded: Vec<Succeeded<T>>,
    /// Cache hits.
    pub skipped: Vec<EntityKey>,
    pub failed: Vec<Failed>,
    /// Never dispatched, or abandoned in flight, because the batch was cancelled.
    pub cancelled: Vec<EntityKey>,
    pub duration_ms: u64,
}

impl<T> BatchReport<T> {
    fn new(batch_id: Uuid) -> Self {
        Self {
            batch_id,
            succeeded: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
            cancelled: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.skipped.len() + self.failed.len() + self.cancelled.len()
    }

    /// No failures and no cancellations.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.cancelled.is_empty()
    }

    pub fn failure(&self, key: &EntityKey) -> Option<&Failed> {
        self.failed.iter().find(|f| &f.key == key)
    }
}

/// Event emitted while a batch runs.
#[derive(Debug, Clone)]
pub enum BatchEvent {
    /// Partitioning finished.
    BatchStarted {
        batch_id: Uuid,
        total: usize,
        pending: usize,
    },
    /// Cache hit; no job will run.
    JobSkipped { key: EntityKey },
    /// A job was dispatched.
    JobStarted { key: EntityKey },
    /// A job's result was cached and merged. `attempt` is the number of
    /// requests the job issued; `attempts` the transport calls behind the last.
    JobSucceeded {
        key: EntityKey,
        attempt: u32,
        attempts: u32,
        transport: TransportKind,
        duration_ms: u64,
    },
    /// An entity failed.
    JobFailed {
        key: EntityKey,
        error: String,
        kind: FailureKind,
    },
    /// The throttle governor tightened dispatch.
    Throttled { limit: usize, delay_ms: u64 },
    /// The batch finished or was cancelled.
    BatchFinished {
        batch_id: Uuid,
        succeeded: usize,
        skipped: usize,
        failed: usize,
        cancelled: usize,
        duration_ms: u64,
    },
}

// =============================================================================
// JOBS
// =============================================================================

/// A stale entity waiting for dispatch.
///
/// `attempt` counts the requests issued for this entity in the current run:
/// one for the normal request, two once the strict request was re-issued.
/// Transport-level retries inside a request are reported separately through
/// `GenerationResult::attempts`.
struct Job {
    key: EntityKey,
    document: DocumentId,
    digest: ContentDigest,
    previous: Option<JsonValue>,
    request: GenerationRequest,
    strict_request: Option<GenerationRequest>,
    attempt: u32,
}

/// What the coordinator keeps about a dispatched job.
struct InFlight {
    document: DocumentId,
    digest: ContentDigest,
    previous: Option<JsonValue>,
}

enum JobOutcome<T> {
    Completed {
        output: T,
        value: JsonValue,
        generation: GenerationResult,
        attempt: u32,
        throttled: u32,
    },
    Failed {
        error: String,
        kind: FailureKind,
        attempt: u32,
        throttled: u32,
    },
}

/// Send, validate, and re-issue the strict request once if validation fails.
async fn execute<H: EntityHandler>(
    handler: Arc<H>,
    client: InferenceClient,
    key: EntityKey,
    request: GenerationRequest,
    strict_request: Option<GenerationRequest>,
    mut attempt: u32,
) -> JobOutcome<H::Output> {
    attempt += 1;
    let generation = match client.send(&request).await {
        Ok(generation) => generation,
        Err(e) => {
            return JobOutcome::Failed {
                attempt,
                throttled: u32::from(e.kind == TransportErrorKind::Throttle),
                kind: FailureKind::Transport(e.kind),
                error: e.to_string(),
            }
        }
    };

    let first_error = match validate(handler.schema(), &generation.raw_text) {
        Ok((value, output)) => {
            return JobOutcome::Completed {
                output,
                value,
                attempt,
                throttled: generation.throttled,
                generation,
            }
        }
        Err(e) => e,
    };

    let Some(strict) = strict_request else {
        return JobOutcome::Failed {
            error: first_error.to_string(),
            kind: FailureKind::Parse,
            attempt,
            throttled: generation.throttled,
        };
    };

    attempt += 1;
    warn!(
        entity_key = %key,
        attempt,
        error = %first_error,
        "Response failed validation, re-issuing strict request"
    );

    let mut throttled = generation.throttled;
    let retry = match client.send(&strict).await {
        Ok(retry) => retry,
        Err(e) => {
            if e.kind == TransportErrorKind::Throttle {
                throttled += 1;
            }
            return JobOutcome::Failed {
                error: e.to_string(),
                kind: FailureKind::Transport(e.kind),
                attempt,
                throttled,
            };
        }
    };
    throttled += retry.throttled;

    match validate(handler.schema(), &retry.raw_text) {
        Ok((value, output)) => JobOutcome::Completed {
            output,
            value,
            generation: retry,
            attempt,
            throttled,
        },
        Err(e) => JobOutcome::Failed {
            error: e.to_string(),
            kind: FailureKind::Parse,
            attempt,
            throttled,
        },
    }
}

fn validate<T: DeserializeOwned>(
    schema: &Schema<T>,
    raw: &str,
) -> Result<(JsonValue, T), ParseError> {
    let value = parse_value(raw, schema)?;
    let output =
        serde_json::from_value(value.clone()).map_err(|e| ParseError::Deserialize(e.to_string()))?;
    Ok((value, output))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("job panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("job panicked: {}", s)
    } else {
        "job panicked".to_string()
    }
}

// =============================================================================
// SCHEDULER
// =============================================================================

/// Runs batches of entities through inference, cache and merge.
pub struct Scheduler<H: EntityHandler> {
    handler: Arc<H>,
    client: InferenceClient,
    cache: Arc<dyn CacheStore>,
    documents: Arc<dyn DocumentStore>,
    config: SchedulerConfig,
    event_tx: broadcast::Sender<BatchEvent>,
}

impl<H: EntityHandler> Scheduler<H> {
    pub fn new(
        handler: Arc<H>,
        client: InferenceClient,
        cache: Arc<dyn CacheStore>,
        documents: Arc<dyn DocumentStore>,
        config: SchedulerConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            handler,
            client,
            cache,
            documents,
            config,
            event_tx,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }

    /// Subscribe to batch events.
    pub fn events(&self) -> broadcast::Receiver<BatchEvent> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: BatchEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }

    /// Run a batch to completion.
    pub async fn run(
        &self,
        keys: impl IntoIterator<Item = EntityKey>,
        options: BatchOptions,
    ) -> BatchReport<H::Output> {
        self.run_with_cancel(keys, options, CancellationToken::new())
            .await
    }

    /// Run a batch that stops early when `cancel` fires.
    pub async fn run_with_cancel(
        &self,
        keys: impl IntoIterator<Item = EntityKey>,
        options: BatchOptions,
        cancel: CancellationToken,
    ) -> BatchReport<H::Output> {
        let started = Instant::now();
        let batch_id = Uuid::now_v7();
        let concurrency = options.concurrency.max(1);
        let mut report = BatchReport::new(batch_id);

        let keys = dedupe(keys);
        info!(
            batch_id = %batch_id,
            entities = keys.len(),
            concurrency,
            force_refresh = options.force_refresh,
            "Starting batch"
        );

        let mut pending = self
            .partition(keys, options.force_refresh, &cancel, &mut report)
            .await;

        self.emit(BatchEvent::BatchStarted {
            batch_id,
            total: report.total() + pending.len(),
            pending: pending.len(),
        });

        self.dispatch(&mut pending, concurrency, &cancel, &mut report)
            .await;

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            batch_id = %batch_id,
            succeeded = report.succeeded.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            cancelled = report.cancelled.len(),
            duration_ms = report.duration_ms,
            "Batch finished"
        );
        self.emit(BatchEvent::BatchFinished {
            batch_id,
            succeeded: report.succeeded.len(),
            skipped: report.skipped.len(),
            failed: report.failed.len(),
            cancelled: report.cancelled.len(),
            duration_ms: report.duration_ms,
        });
        report
    }

    /// Load, digest and cache-check every key. Returns the stale entities.
    async fn partition(
        &self,
        keys: Vec<EntityKey>,
        force_refresh: bool,
        cancel: &CancellationToken,
        report: &mut BatchReport<H::Output>,
    ) -> VecDeque<Job> {
        let mut pending = VecDeque::new();
        let mut claimed: HashSet<DocumentId> = HashSet::new();

        let mut keys = keys.into_iter();
        while let Some(key) = keys.next() {
            if cancel.is_cancelled() {
                report.cancelled.push(key);
                report.cancelled.extend(keys.by_ref());
                break;
            }

            let context = match self.handler.load(&key).await {
                Ok(context) => context,
                Err(e) => {
                    self.record_failure(report, key, e.to_string(), FailureKind::Load);
                    continue;
                }
            };

            if !claimed.insert(context.document.clone()) {
                let error = format!(
                    "document {} is already targeted by another entity in this batch",
                    context.document
                );
                self.record_failure(report, key, error, FailureKind::Conflict);
                continue;
            }

            let fresh = digest(&context.fields);
            let entry = match self.cache.get(&key).await {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(entity_key = %key, error = %e, "Cache read failed, treating as miss");
                    None
                }
            };

            if !needs_recompute(entry.as_ref(), &fresh, force_refresh) {
                debug!(entity_key = %key, digest = %fresh.short(), "Cache hit, skipping");
                self.emit(BatchEvent::JobSkipped { key: key.clone() });
                report.skipped.push(key);
                continue;
            }

            debug!(
                entity_key = %key,
                digest = %fresh.short(),
                cached = entry.is_some(),
                "Entity needs recompute"
            );
            let previous = entry.map(|e| e.result).filter(|r| !r.is_null());
            pending.push_back(Job {
                key,
                document: context.document,
                digest: fresh,
                previous,
                request: context.request,
                strict_request: context.strict_request,
                attempt: 0,
            });
        }

        pending
    }

    /// Drive the worker pool until every pending job is committed or the
    /// batch is cancelled.
    async fn dispatch(
        &self,
        pending: &mut VecDeque<Job>,
        concurrency: usize,
        cancel: &CancellationToken,
        report: &mut BatchReport<H::Output>,
    ) {
        let mut governor = ThrottleGovernor::new(
            concurrency,
            self.config.throttle_base_delay,
            self.config.throttle_max_delay,
            self.config.recovery_successes,
        );
        let mut in_flight: JoinSet<(EntityKey, JobOutcome<H::Output>)> = JoinSet::new();
        let mut running: HashMap<EntityKey, InFlight> = HashMap::new();
        let mut merged: HashSet<DocumentId> = HashSet::new();
        let mut ready_at = Instant::now();

        loop {
            if cancel.is_cancelled() {
                break;
            }

            while in_flight.len() < governor.limit() && Instant::now() >= ready_at {
                let Some(job) = pending.pop_front() else {
                    break;
                };
                self.spawn_job(&mut in_flight, &mut running, job);
                ready_at = Instant::now() + governor.delay();
            }

            if in_flight.is_empty() && pending.is_empty() {
                return;
            }

            let can_dispatch = !pending.is_empty() && in_flight.len() < governor.limit();

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    match joined {
                        Ok((key, outcome)) => {
                            let Some(meta) = running.remove(&key) else {
                                error!(entity_key = %key, "Completed job was not tracked");
                                continue;
                            };
                            self.commit(report, &mut governor, &mut merged, key, meta, outcome)
                                .await;
                        }
                        // Panics are caught inside the task; only aborts reach here.
                        Err(e) => error!(error = %e, "Job task ended without a result"),
                    }
                }
                _ = sleep_until(ready_at), if can_dispatch => {}
            }
        }

        in_flight.abort_all();
        while in_flight.join_next().await.is_some() {}

        let mut abandoned: Vec<EntityKey> = running.into_keys().collect();
        abandoned.sort();
        warn!(
            abandoned = abandoned.len(),
            undispatched = pending.len(),
            "Batch cancelled"
        );
        report.cancelled.extend(abandoned);
        report.cancelled.extend(pending.drain(..).map(|job| job.key));
    }

    fn spawn_job(
        &self,
        in_flight: &mut JoinSet<(EntityKey, JobOutcome<H::Output>)>,
        running: &mut HashMap<EntityKey, InFlight>,
        job: Job,
    ) {
        debug!(entity_key = %job.key, "Dispatching job");
        self.emit(BatchEvent::JobStarted {
            key: job.key.clone(),
        });
        running.insert(
            job.key.clone(),
            InFlight {
                document: job.document,
                digest: job.digest,
                previous: job.previous,
            },
        );

        let work = AssertUnwindSafe(execute(
            self.handler.clone(),
            self.client.clone(),
            job.key.clone(),
            job.request,
            job.strict_request,
            job.attempt,
        ))
        .catch_unwind();
        let key = job.key;
        in_flight.spawn(async move {
            let outcome = match work.await {
                Ok(outcome) => outcome,
                Err(payload) => JobOutcome::Failed {
                    error: panic_message(payload.as_ref()),
                    kind: FailureKind::Panic,
                    attempt: 0,
                    throttled: 0,
                },
            };
            (key, outcome)
        });
    }

    /// Record a finished job: cache, then document, then report.
    async fn commit(
        &self,
        report: &mut BatchReport<H::Output>,
        governor: &mut ThrottleGovernor,
        merged: &mut HashSet<DocumentId>,
        key: EntityKey,
        meta: InFlight,
        outcome: JobOutcome<H::Output>,
    ) {
        let throttled = match &outcome {
            JobOutcome::Completed { throttled, .. } | JobOutcome::Failed { throttled, .. } => {
                *throttled
            }
        };
        if throttled > 0 {
            governor.on_throttle();
            warn!(
                entity_key = %key,
                limit = governor.limit(),
                delay_ms = governor.delay().as_millis() as u64,
                "Throttling observed, slowing dispatch"
            );
            self.emit(BatchEvent::Throttled {
                limit: governor.limit(),
                delay_ms: governor.delay().as_millis() as u64,
            });
        } else if matches!(outcome, JobOutcome::Completed { .. }) {
            if governor.on_clean() {
                info!(
                    limit = governor.limit(),
                    delay_ms = governor.delay().as_millis() as u64,
                    "Dispatch capacity restored"
                );
            }
        } else {
            governor.on_failure();
        }

        let (output, value, generation, attempt) = match outcome {
            JobOutcome::Completed {
                output,
                value,
                generation,
                attempt,
                ..
            } => (output, value, generation, attempt),
            JobOutcome::Failed {
                error,
                kind,
                attempt,
                ..
            } => {
                debug!(entity_key = %key, attempt, error_kind = %kind, "Job failed");
                let entry = CacheEntry::error(key.clone(), meta.digest, meta.previous);
                if let Err(e) = self.cache.put(&key, entry).await {
                    warn!(entity_key = %key, error = %e, "Failed to record error entry");
                }
                self.record_failure(report, key, error, kind);
                return;
            }
        };

        let entry = CacheEntry::ok(key.clone(), meta.digest, value);
        let computed_at = entry.computed_at;
        if let Err(e) = self.cache.put(&key, entry).await {
            if let Err(inv) = self.cache.force_invalidate(&key).await {
                error!(entity_key = %key, error = %inv, "Failed to invalidate cache after write failure");
            }
            self.record_failure(report, key, e.to_string(), FailureKind::Cache);
            return;
        }

        if let Err(e) = self
            .merge_document(merged, &key, &meta.document, &output)
            .await
        {
            if let Err(inv) = self.cache.force_invalidate(&key).await {
                error!(entity_key = %key, error = %inv, "Failed to invalidate cache after merge failure");
            }
            let kind = FailureKind::from_error(&e);
            self.record_failure(report, key, e.to_string(), kind);
            return;
        }

        info!(
            entity_key = %key,
            attempt,
            transport_attempts = generation.attempts,
            transport = ?generation.transport,
            model = %generation.model_id,
            duration_ms = generation.latency_ms,
            "Entity reviewed"
        );
        self.emit(BatchEvent::JobSucceeded {
            key: key.clone(),
            attempt,
            attempts: generation.attempts,
            transport: generation.transport,
            duration_ms: generation.latency_ms,
        });
        report.succeeded.push(Succeeded {
            key,
            result: output,
            computed_at,
        });
    }

    async fn merge_document(
        &self,
        merged: &mut HashSet<DocumentId>,
        key: &EntityKey,
        document: &DocumentId,
        output: &H::Output,
    ) -> gtdflow_core::Result<()> {
        if merged.contains(document) {
            return Err(Error::Internal(format!(
                "document {} was already merged in this batch",
                document
            )));
        }

        let current = self.documents.read(document).await?.unwrap_or_default();
        let rendered = self.handler.render(key, output);
        let updated = merge_at(
            &current,
            &self.handler.markers(),
            &rendered,
            self.handler.anchor(),
        )?;

        if updated != current {
            self.documents.write(document, &updated).await?;
            debug!(entity_key = %key, document = %document, "Merged review into document");
        } else {
            debug!(entity_key = %key, document = %document, "Document already up to date");
        }
        merged.insert(document.clone());
        Ok(())
    }

    fn record_failure(
        &self,
        report: &mut BatchReport<H::Output>,
        key: EntityKey,
        error: String,
        kind: FailureKind,
    ) {
        warn!(entity_key = %key, error_kind = %kind, error = %error, "Entity failed");
        self.emit(BatchEvent::JobFailed {
            key: key.clone(),
            error: error.clone(),
            kind,
        });
        report.failed.push(Failed { key, error, kind });
    }
}

fn dedupe(keys: impl IntoIterator<Item = EntityKey>) -> Vec<EntityKey> {
    let mut seen = HashSet::new();
    keys.into_iter()
        .filter(|key| {
            let fresh = seen.insert(key.clone());
            if !fresh {
                warn!(entity_key = %key, "Duplicate key in batch input, ignoring");
            }
            fresh
        })
        .collect()
}
