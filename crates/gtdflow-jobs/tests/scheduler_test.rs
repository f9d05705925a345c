//! Integration tests for the batch scheduler.
//!
//! These run the full pipeline (scheduler, retrying client, parser, cache and
//! document merge) against scripted transports and in-memory stores.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use gtdflow_core::{
    read_region, CacheEntry, CacheStatus, CacheStore, DocumentId, DocumentStore, EntityContext,
    EntityKey, Error, GenerationRequest, RegionMarkers, Result, Transport, TransportError,
    TransportErrorKind, TransportResponse,
};
use gtdflow_inference::mock::ScriptedTransport;
use gtdflow_inference::{FieldKind, InferenceClient, RetryPolicy, Schema};
use gtdflow_jobs::{
    BatchEvent, BatchOptions, CancellationToken, EntityHandler, FailureKind, Scheduler,
    SchedulerConfig,
};
use gtdflow_store::{MemoryCacheStore, MemoryDocumentStore};

const VALID: &str = r#"{"summary": "fine"}"#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Review {
    summary: String,
}

/// Handler over an in-memory table of `key -> (document, body)`.
struct NotesHandler {
    schema: Schema<Review>,
    entities: Mutex<HashMap<EntityKey, (DocumentId, String)>>,
    strict: bool,
}

impl NotesHandler {
    fn new() -> Self {
        Self {
            schema: Schema::object("review").required("summary", FieldKind::NonEmptyString),
            entities: Mutex::new(HashMap::new()),
            strict: false,
        }
    }

    fn with_strict(mut self) -> Self {
        self.strict = true;
        self
    }

    fn entity(self, key: &str, document: &str, body: &str) -> Self {
        self.set_body(key, document, body);
        self
    }

    fn set_body(&self, key: &str, document: &str, body: &str) {
        self.entities.lock().unwrap().insert(
            EntityKey::from(key),
            (DocumentId::from(document), body.to_string()),
        );
    }
}

#[async_trait]
impl EntityHandler for NotesHandler {
    type Output = Review;

    fn schema(&self) -> &Schema<Review> {
        &self.schema
    }

    async fn load(&self, key: &EntityKey) -> Result<EntityContext> {
        let (document, body) = self
            .entities
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::InvalidInput(format!("unknown entity {}", key)))?;

        let request = GenerationRequest::new("Review the note.")
            .with_user(format!("review {}: {}", key, body));
        let strict_request = self.strict.then(|| {
            GenerationRequest::new("Review the note. Reply with JSON only.")
                .with_user(format!("STRICT review {}: {}", key, body))
        });

        Ok(EntityContext {
            key: key.clone(),
            document,
            fields: vec![format!("body={}", body)],
            request,
            strict_request,
        })
    }

    fn render(&self, _key: &EntityKey, output: &Review) -> String {
        format!("Summary: {}", output.summary)
    }
}

struct Harness {
    scheduler: Scheduler<NotesHandler>,
    cache: Arc<MemoryCacheStore>,
    documents: Arc<MemoryDocumentStore>,
}

fn harness(handler: NotesHandler, transport: Arc<dyn Transport>) -> Harness {
    let cache = Arc::new(MemoryCacheStore::new());
    let documents = Arc::new(MemoryDocumentStore::new());
    let client = InferenceClient::new(transport, None, RetryPolicy::default());
    let scheduler = Scheduler::new(
        Arc::new(handler),
        client,
        cache.clone(),
        documents.clone(),
        SchedulerConfig::default(),
    );
    Harness {
        scheduler,
        cache,
        documents,
    }
}

fn keys(names: &[&str]) -> Vec<EntityKey> {
    names.iter().map(|n| EntityKey::from(*n)).collect()
}

fn five_projects() -> NotesHandler {
    (1..=5).fold(NotesHandler::new(), |handler, i| {
        handler.entity(
            &format!("p{}", i),
            &format!("projects/p{}.md", i),
            &format!("body {}", i),
        )
    })
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<BatchEvent>) -> Vec<BatchEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// =============================================================================
// PARTITION AND REPORT
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_fatal_failures_do_not_abort_the_batch() {
    let transport = Arc::new(
        ScriptedTransport::new("primary")
            .then_ok(VALID)
            .route("review p2:", Err(TransportError::auth("denied")))
            .route("review p4:", Err(TransportError::auth("denied"))),
    );
    let h = harness(five_projects(), transport.clone());

    let report = h
        .scheduler
        .run(
            keys(&["p1", "p2", "p3", "p4", "p5"]),
            BatchOptions::default().with_concurrency(2),
        )
        .await;

    assert_eq!(report.succeeded.len(), 3);
    assert_eq!(report.failed.len(), 2);
    assert!(report.skipped.is_empty());
    assert!(report.cancelled.is_empty());
    assert_eq!(report.total(), 5);
    // Auth errors are fatal: one call each.
    assert_eq!(transport.calls(), 5);

    for key in ["p2", "p4"] {
        let failure = report.failure(&EntityKey::from(key)).unwrap();
        assert_eq!(
            failure.kind,
            FailureKind::Transport(TransportErrorKind::Auth)
        );
        let entry = h.cache.get(&EntityKey::from(key)).await.unwrap().unwrap();
        assert_eq!(entry.status, CacheStatus::Error);
        let doc = DocumentId::from(format!("projects/{}.md", key));
        assert!(h.documents.get(&doc).await.is_none());
    }

    for key in ["p1", "p3", "p5"] {
        let doc = DocumentId::from(format!("projects/{}.md", key));
        let text = h.documents.get(&doc).await.unwrap();
        assert_eq!(
            read_region(&text, &RegionMarkers::managed()).unwrap(),
            Some("Summary: fine")
        );
        let entry = h.cache.get(&EntityKey::from(key)).await.unwrap().unwrap();
        assert_eq!(entry.status, CacheStatus::Ok);
        assert_eq!(entry.result["summary"], "fine");
    }
}

#[tokio::test]
async fn test_cache_hit_makes_no_call_and_keeps_entry_verbatim() {
    let transport = Arc::new(ScriptedTransport::new("primary").then_ok(VALID));
    let h = harness(
        NotesHandler::new().entity("p1", "projects/p1.md", "body"),
        transport.clone(),
    );

    let first = h.scheduler.run(keys(&["p1"]), BatchOptions::default()).await;
    assert_eq!(first.succeeded.len(), 1);
    assert_eq!(transport.calls(), 1);
    let cached = h.cache.get(&EntityKey::from("p1")).await.unwrap().unwrap();
    assert_eq!(first.succeeded[0].computed_at, cached.computed_at);

    let second = h.scheduler.run(keys(&["p1"]), BatchOptions::default()).await;
    assert_eq!(second.skipped, keys(&["p1"]));
    assert!(second.succeeded.is_empty());
    assert_eq!(transport.calls(), 1);

    let after = h.cache.get(&EntityKey::from("p1")).await.unwrap().unwrap();
    assert_eq!(after, cached);
}

#[tokio::test]
async fn test_force_refresh_and_changed_fields_recompute() {
    let transport = Arc::new(ScriptedTransport::new("primary").then_ok(VALID));
    let h = harness(
        NotesHandler::new().entity("p1", "projects/p1.md", "body"),
        transport.clone(),
    );

    h.scheduler.run(keys(&["p1"]), BatchOptions::default()).await;
    assert_eq!(transport.calls(), 1);

    let forced = h
        .scheduler
        .run(keys(&["p1"]), BatchOptions::default().with_force_refresh(true))
        .await;
    assert_eq!(forced.succeeded.len(), 1);
    assert_eq!(transport.calls(), 2);

    h.scheduler
        .handler()
        .set_body("p1", "projects/p1.md", "edited body");
    let changed = h.scheduler.run(keys(&["p1"]), BatchOptions::default()).await;
    assert_eq!(changed.succeeded.len(), 1);
    assert_eq!(transport.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_error_entry_is_retried_next_run() {
    let transport = Arc::new(
        ScriptedTransport::new("primary")
            .route("review p1:", Err(TransportError::auth("denied")))
            .route("review p1:", Ok(VALID.to_string())),
    );
    let h = harness(
        NotesHandler::new().entity("p1", "projects/p1.md", "body"),
        transport.clone(),
    );

    let first = h.scheduler.run(keys(&["p1"]), BatchOptions::default()).await;
    assert_eq!(first.failed.len(), 1);

    let second = h.scheduler.run(keys(&["p1"]), BatchOptions::default()).await;
    assert_eq!(second.succeeded.len(), 1);
    assert!(second.skipped.is_empty());
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_duplicate_keys_are_processed_once() {
    let transport = Arc::new(ScriptedTransport::new("primary").then_ok(VALID));
    let h = harness(
        NotesHandler::new().entity("p1", "projects/p1.md", "body"),
        transport.clone(),
    );

    let report = h
        .scheduler
        .run(keys(&["p1", "p1", "p1"]), BatchOptions::default())
        .await;
    assert_eq!(report.total(), 1);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_load_failure_is_reported() {
    let transport = Arc::new(ScriptedTransport::new("primary").then_ok(VALID));
    let h = harness(
        NotesHandler::new().entity("p1", "projects/p1.md", "body"),
        transport.clone(),
    );

    let report = h
        .scheduler
        .run(keys(&["p1", "ghost"]), BatchOptions::default())
        .await;
    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(
        report.failure(&EntityKey::from("ghost")).unwrap().kind,
        FailureKind::Load
    );
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_second_entity_on_same_document_conflicts() {
    let transport = Arc::new(ScriptedTransport::new("primary").then_ok(VALID));
    let h = harness(
        NotesHandler::new()
            .entity("a", "projects/shared.md", "one")
            .entity("b", "projects/shared.md", "two"),
        transport.clone(),
    );

    let report = h.scheduler.run(keys(&["a", "b"]), BatchOptions::default()).await;
    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(report.succeeded[0].key, EntityKey::from("a"));
    assert_eq!(
        report.failure(&EntityKey::from("b")).unwrap().kind,
        FailureKind::Conflict
    );
    assert_eq!(transport.calls(), 1);
}

// =============================================================================
// PARSING
// =============================================================================

#[tokio::test]
async fn test_strict_request_is_issued_once_after_invalid_response() {
    let transport = Arc::new(
        ScriptedTransport::new("primary")
            .then_ok("I think the project is going well!")
            .route("STRICT", Ok(format!("```json\n{}\n```", VALID))),
    );
    let h = harness(
        NotesHandler::new()
            .with_strict()
            .entity("p1", "projects/p1.md", "body"),
        transport.clone(),
    );
    let mut rx = h.scheduler.events();

    let report = h.scheduler.run(keys(&["p1"]), BatchOptions::default()).await;
    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(report.succeeded[0].result.summary, "fine");
    assert_eq!(transport.calls(), 2);
    assert!(transport.requests()[1].messages[0].content.starts_with("STRICT"));
    assert!(drain(&mut rx).iter().any(|e| matches!(
        e,
        BatchEvent::JobSucceeded {
            attempt: 2,
            attempts: 1,
            ..
        }
    )));
}

#[tokio::test]
async fn test_parse_failure_without_strict_request() {
    let transport = Arc::new(ScriptedTransport::new("primary").then_ok(r#"{"summary": ""}"#));
    let h = harness(
        NotesHandler::new().entity("p1", "projects/p1.md", "body"),
        transport.clone(),
    );

    let report = h.scheduler.run(keys(&["p1"]), BatchOptions::default()).await;
    let failure = report.failure(&EntityKey::from("p1")).unwrap();
    assert_eq!(failure.kind, FailureKind::Parse);
    assert!(failure.error.contains("summary"));
    assert_eq!(transport.calls(), 1);
    assert!(h
        .documents
        .get(&DocumentId::from("projects/p1.md"))
        .await
        .is_none());
}

#[tokio::test]
async fn test_strict_reissue_failing_again_is_a_parse_failure() {
    let transport = Arc::new(ScriptedTransport::new("primary").then_ok("no json here"));
    let h = harness(
        NotesHandler::new()
            .with_strict()
            .entity("p1", "projects/p1.md", "body"),
        transport.clone(),
    );

    let report = h.scheduler.run(keys(&["p1"]), BatchOptions::default()).await;
    assert_eq!(
        report.failure(&EntityKey::from("p1")).unwrap().kind,
        FailureKind::Parse
    );
    assert_eq!(transport.calls(), 2);
}

// =============================================================================
// MERGE
// =============================================================================

#[tokio::test]
async fn test_merge_preserves_raw_region_and_is_idempotent() {
    let transport = Arc::new(ScriptedTransport::new("primary").then_ok(VALID));
    let h = harness(
        NotesHandler::new().entity("p1", "projects/p1.md", "body"),
        transport.clone(),
    );
    let doc = DocumentId::from("projects/p1.md");
    let original = "# Garden\n\n<!-- gtdflow:start:notes -->\nmy own words  \n<!-- gtdflow:end:notes -->\n";
    h.documents.insert(doc.clone(), original).await;

    h.scheduler.run(keys(&["p1"]), BatchOptions::default()).await;
    let once = h.documents.get(&doc).await.unwrap();
    assert!(once.starts_with(original));
    assert_eq!(
        read_region(&once, &RegionMarkers::raw()).unwrap(),
        Some("my own words  ")
    );

    h.scheduler
        .run(keys(&["p1"]), BatchOptions::default().with_force_refresh(true))
        .await;
    let twice = h.documents.get(&doc).await.unwrap();
    assert_eq!(once, twice);
}

#[tokio::test]
async fn test_malformed_region_fails_and_invalidates_cache() {
    let transport = Arc::new(ScriptedTransport::new("primary").then_ok(VALID));
    let h = harness(
        NotesHandler::new().entity("p1", "projects/p1.md", "body"),
        transport.clone(),
    );
    let doc = DocumentId::from("projects/p1.md");
    let broken = "# Garden\n<!-- gtdflow:start:ai-review -->\nold review\n";
    h.documents.insert(doc.clone(), broken).await;

    let report = h.scheduler.run(keys(&["p1"]), BatchOptions::default()).await;
    assert_eq!(
        report.failure(&EntityKey::from("p1")).unwrap().kind,
        FailureKind::Merge
    );
    assert!(h.cache.get(&EntityKey::from("p1")).await.unwrap().is_none());
    assert_eq!(h.documents.get(&doc).await.unwrap(), broken);
}

#[tokio::test]
async fn test_review_region_inside_user_notes_is_left_alone() {
    let transport = Arc::new(ScriptedTransport::new("primary").then_ok(VALID));
    let h = harness(
        NotesHandler::new().entity("p1", "projects/p1.md", "body"),
        transport.clone(),
    );
    let doc = DocumentId::from("projects/p1.md");
    let nested = "# P\n<!-- gtdflow:start:notes -->\nuser text\n<!-- gtdflow:start:ai-review -->\nuser-owned old\n<!-- gtdflow:end:ai-review -->\n<!-- gtdflow:end:notes -->\n";
    h.documents.insert(doc.clone(), nested).await;

    let report = h.scheduler.run(keys(&["p1"]), BatchOptions::default()).await;
    assert_eq!(
        report.failure(&EntityKey::from("p1")).unwrap().kind,
        FailureKind::Merge
    );
    assert!(report.succeeded.is_empty());
    assert_eq!(h.documents.get(&doc).await.unwrap(), nested);
    assert!(h.cache.get(&EntityKey::from("p1")).await.unwrap().is_none());
}

struct ReadOnlyDocuments;

#[async_trait]
impl DocumentStore for ReadOnlyDocuments {
    async fn read(&self, _id: &DocumentId) -> Result<Option<String>> {
        Ok(Some("# Garden\n".to_string()))
    }

    async fn write(&self, id: &DocumentId, _text: &str) -> Result<()> {
        Err(Error::Document(format!("{} is read-only", id)))
    }
}

#[tokio::test]
async fn test_document_write_failure_invalidates_cache() {
    let transport = Arc::new(ScriptedTransport::new("primary").then_ok(VALID));
    let cache = Arc::new(MemoryCacheStore::new());
    let scheduler = Scheduler::new(
        Arc::new(NotesHandler::new().entity("p1", "projects/p1.md", "body")),
        InferenceClient::new(transport, None, RetryPolicy::default()),
        cache.clone(),
        Arc::new(ReadOnlyDocuments),
        SchedulerConfig::default(),
    );

    let report = scheduler.run(keys(&["p1"]), BatchOptions::default()).await;
    assert_eq!(
        report.failure(&EntityKey::from("p1")).unwrap().kind,
        FailureKind::Document
    );
    assert!(cache.is_empty().await);
}

/// Stores the entry, then reports the first `failures` writes as failed.
struct LossyCache {
    inner: MemoryCacheStore,
    failures: AtomicUsize,
}

#[async_trait]
impl CacheStore for LossyCache {
    async fn get(&self, key: &EntityKey) -> Result<Option<CacheEntry>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &EntityKey, entry: CacheEntry) -> Result<()> {
        self.inner.put(key, entry).await?;
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(Error::Cache("disk full".to_string()));
        }
        Ok(())
    }

    async fn force_invalidate(&self, key: &EntityKey) -> Result<()> {
        self.inner.force_invalidate(key).await
    }
}

#[tokio::test]
async fn test_cache_write_failure_is_recomputed_next_run() {
    let transport = Arc::new(ScriptedTransport::new("primary").then_ok(VALID));
    let cache = Arc::new(LossyCache {
        inner: MemoryCacheStore::new(),
        failures: AtomicUsize::new(1),
    });
    let scheduler = Scheduler::new(
        Arc::new(NotesHandler::new().entity("p1", "projects/p1.md", "body")),
        InferenceClient::new(transport.clone(), None, RetryPolicy::default()),
        cache.clone(),
        Arc::new(MemoryDocumentStore::new()),
        SchedulerConfig::default(),
    );

    let first = scheduler.run(keys(&["p1"]), BatchOptions::default()).await;
    assert_eq!(
        first.failure(&EntityKey::from("p1")).unwrap().kind,
        FailureKind::Cache
    );
    assert!(cache.get(&EntityKey::from("p1")).await.unwrap().is_none());

    let second = scheduler.run(keys(&["p1"]), BatchOptions::default()).await;
    assert_eq!(second.succeeded.len(), 1);
    assert!(second.skipped.is_empty());
    assert_eq!(transport.calls(), 2);
}

// =============================================================================
// CONCURRENCY, THROTTLING, CANCELLATION
// =============================================================================

/// Tracks the peak number of concurrent sends.
struct CountingTransport {
    current: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl Transport for CountingTransport {
    fn name(&self) -> &str {
        "counting"
    }

    async fn send(
        &self,
        _request: &GenerationRequest,
    ) -> std::result::Result<TransportResponse, TransportError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(TransportResponse {
            raw_text: VALID.to_string(),
            model_id: "counting".to_string(),
            tokens_used: None,
        })
    }
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_never_exceeds_concurrency() {
    let transport = Arc::new(CountingTransport {
        current: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let handler = (0..8).fold(NotesHandler::new(), |h, i| {
        h.entity(&format!("k{}", i), &format!("d{}.md", i), "body")
    });
    let h = harness(handler, transport.clone());

    let names: Vec<String> = (0..8).map(|i| format!("k{}", i)).collect();
    let report = h
        .scheduler
        .run(
            names.iter().map(|n| EntityKey::from(n.as_str())),
            BatchOptions::default().with_concurrency(3),
        )
        .await;

    assert_eq!(report.succeeded.len(), 8);
    assert_eq!(transport.peak.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_throttling_tightens_dispatch() {
    let transport = Arc::new(
        ScriptedTransport::new("primary")
            .then_err(TransportError::throttle("slow down"))
            .then_ok(VALID),
    );
    let h = harness(five_projects(), transport.clone());
    let mut rx = h.scheduler.events();

    let report = h
        .scheduler
        .run(
            keys(&["p1", "p2", "p3", "p4", "p5"]),
            BatchOptions::default().with_concurrency(4),
        )
        .await;
    assert_eq!(report.succeeded.len(), 5);

    let throttled: Vec<(usize, u64)> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            BatchEvent::Throttled { limit, delay_ms } => Some((limit, delay_ms)),
            _ => None,
        })
        .collect();
    assert_eq!(throttled, vec![(2, 1_000)]);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_abandons_in_flight_and_keeps_completed() {
    let transport = Arc::new(
        ScriptedTransport::new("primary")
            .then_ok(VALID)
            .with_latency(Duration::from_secs(1)),
    );
    let h = harness(
        NotesHandler::new()
            .entity("p1", "projects/p1.md", "body")
            .entity("p2", "projects/p2.md", "body")
            .entity("p3", "projects/p3.md", "body"),
        transport.clone(),
    );

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        trigger.cancel();
    });

    let report = h
        .scheduler
        .run_with_cancel(
            keys(&["p1", "p2", "p3"]),
            BatchOptions::default().with_concurrency(1),
            token,
        )
        .await;

    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(report.succeeded[0].key, EntityKey::from("p1"));
    assert_eq!(report.cancelled, keys(&["p2", "p3"]));
    assert_eq!(transport.calls(), 2);

    assert!(h
        .documents
        .get(&DocumentId::from("projects/p1.md"))
        .await
        .is_some());
    assert!(h
        .documents
        .get(&DocumentId::from("projects/p2.md"))
        .await
        .is_none());
    assert!(h.cache.get(&EntityKey::from("p2")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_cancel_before_start_dispatches_nothing() {
    let transport = Arc::new(ScriptedTransport::new("primary").then_ok(VALID));
    let h = harness(five_projects(), transport.clone());

    let token = CancellationToken::new();
    token.cancel();
    let report = h
        .scheduler
        .run_with_cancel(keys(&["p1", "p2"]), BatchOptions::default(), token)
        .await;

    assert_eq!(report.cancelled, keys(&["p1", "p2"]));
    assert_eq!(transport.calls(), 0);
}

struct PanickingTransport;

#[async_trait]
impl Transport for PanickingTransport {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn send(
        &self,
        _request: &GenerationRequest,
    ) -> std::result::Result<TransportResponse, TransportError> {
        panic!("transport exploded");
    }
}

#[tokio::test]
async fn test_panicking_job_is_recorded_as_failure() {
    let h = harness(
        NotesHandler::new().entity("p1", "projects/p1.md", "body"),
        Arc::new(PanickingTransport),
    );

    let report = h.scheduler.run(keys(&["p1"]), BatchOptions::default()).await;
    let failure = report.failure(&EntityKey::from("p1")).unwrap();
    assert_eq!(failure.kind, FailureKind::Panic);
    assert!(failure.error.contains("transport exploded"));
}

#[tokio::test]
async fn test_events_bracket_the_batch() {
    let transport = Arc::new(ScriptedTransport::new("primary").then_ok(VALID));
    let h = harness(
        NotesHandler::new().entity("p1", "projects/p1.md", "body"),
        transport,
    );
    let mut rx = h.scheduler.events();

    h.scheduler.run(keys(&["p1"]), BatchOptions::default()).await;
    let events = drain(&mut rx);

    assert!(matches!(
        events.first(),
        Some(BatchEvent::BatchStarted { total: 1, pending: 1, .. })
    ));
    assert!(events
        .iter()
        .any(|e| matches!(e, BatchEvent::JobSucceeded { attempt: 1, attempts: 1, .. })));
    assert!(matches!(
        events.last(),
        Some(BatchEvent::BatchFinished { succeeded: 1, .. })
    ));
}
