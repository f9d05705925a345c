//! Subcommand implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use gtdflow_core::defaults::CACHE_FILE_NAME;
use gtdflow_core::{CacheStore, EntityKey};
use gtdflow_inference::{InferenceClient, ProviderHealth};
use gtdflow_jobs::{BatchReport, CancellationToken, Scheduler, SchedulerConfig};
use gtdflow_store::{FsDocumentStore, JsonFileCacheStore};

use crate::handler::{discover_projects, project_key, ProjectReviewHandler};
use crate::project::ProjectReview;

/// Options for `gtdflow review`.
#[derive(Debug, Clone)]
pub struct ReviewArgs {
    pub projects_dir: String,
    pub force: bool,
    pub concurrency: Option<usize>,
    pub projects: Vec<String>,
}

/// Cache file path: explicit, or `.gtdflow-cache.json` in the vault.
pub fn cache_path(vault: &Path, explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(|| vault.join(CACHE_FILE_NAME))
}

/// Review project notes. Returns `None` when there was nothing to review.
pub async fn review(
    vault: &Path,
    cache_file: &Path,
    client: InferenceClient,
    config: SchedulerConfig,
    args: ReviewArgs,
    cancel: CancellationToken,
) -> anyhow::Result<Option<BatchReport<ProjectReview>>> {
    let keys: Vec<EntityKey> = if args.projects.is_empty() {
        discover_projects(vault, &args.projects_dir).await?
    } else {
        args.projects
            .iter()
            .map(|p| project_key(&args.projects_dir, p))
            .collect()
    };
    if keys.is_empty() {
        info!(vault = %vault.display(), "No project notes found");
        return Ok(None);
    }

    let mut options = config.batch_options().with_force_refresh(args.force);
    if let Some(n) = args.concurrency {
        options = options.with_concurrency(n.max(1));
    }

    let cache = JsonFileCacheStore::open(cache_file)
        .await
        .with_context(|| format!("opening cache {}", cache_file.display()))?;
    let handler = ProjectReviewHandler::new(vault)?;
    let scheduler = Scheduler::new(
        Arc::new(handler),
        client,
        Arc::new(cache),
        Arc::new(FsDocumentStore::new(vault)),
        config,
    );

    Ok(Some(scheduler.run_with_cancel(keys, options, cancel).await))
}

/// Drop cache entries so the next review recomputes them.
pub async fn invalidate(
    cache_file: &Path,
    projects_dir: &str,
    projects: &[String],
) -> anyhow::Result<Vec<EntityKey>> {
    let cache = JsonFileCacheStore::open(cache_file)
        .await
        .with_context(|| format!("opening cache {}", cache_file.display()))?;

    let mut invalidated = Vec::with_capacity(projects.len());
    for project in projects {
        let key = project_key(projects_dir, project);
        cache.force_invalidate(&key).await?;
        info!(entity_key = %key, "Invalidated cache entry");
        invalidated.push(key);
    }
    Ok(invalidated)
}

pub async fn health(client: &InferenceClient) -> ProviderHealth {
    client.health_check().await
}

/// Human-readable summary table.
pub fn format_report(report: &BatchReport<ProjectReview>) -> String {
    let mut rows: Vec<(&str, String, String)> = Vec::with_capacity(report.total());
    for s in &report.succeeded {
        rows.push(("reviewed", s.key.to_string(), s.result.health.to_string()));
    }
    for key in &report.skipped {
        rows.push(("cached", key.to_string(), String::new()));
    }
    for f in &report.failed {
        rows.push(("failed", f.key.to_string(), format!("{}: {}", f.kind, f.error)));
    }
    for key in &report.cancelled {
        rows.push(("cancelled", key.to_string(), String::new()));
    }

    let width = rows
        .iter()
        .map(|(_, key, _)| key.len())
        .max()
        .unwrap_or(0)
        .max("PROJECT".len());

    let mut out = format!("{:<10} {:<width$} DETAIL\n", "STATUS", "PROJECT");
    for (status, key, detail) in rows {
        out.push_str(format!("{:<10} {:<width$} {}", status, key, detail).trim_end());
        out.push('\n');
    }
    out.push_str(&format!(
        "\n{} reviewed, {} cached, {} failed, {} cancelled in {} ms\n",
        report.succeeded.len(),
        report.skipped.len(),
        report.failed.len(),
        report.cancelled.len(),
        report.duration_ms
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use gtdflow_core::{read_region, RegionMarkers, TransportError};
    use gtdflow_inference::mock::ScriptedTransport;
    use gtdflow_inference::RetryPolicy;

    const GARDEN: &str = "---\nstatus: active\ntags: [home]\n---\n# Garden\n\n## Next Actions\n- [ ] Buy seeds\n\n<!-- gtdflow:start:notes -->\nkeep me\n<!-- gtdflow:end:notes -->\n";
    const REVIEW: &str = r#"{"summary": "Seeds first.", "health": "on_track", "next_actions": ["Buy seeds"], "blockers": []}"#;

    fn vault() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("projects")).unwrap();
        std::fs::write(dir.path().join("projects/garden.md"), GARDEN).unwrap();
        std::fs::write(dir.path().join("projects/shed.md"), "# Shed\n").unwrap();
        dir
    }

    fn args(force: bool) -> ReviewArgs {
        ReviewArgs {
            projects_dir: "projects".into(),
            force,
            concurrency: Some(2),
            projects: Vec::new(),
        }
    }

    fn client(transport: Arc<ScriptedTransport>) -> InferenceClient {
        InferenceClient::new(transport, None, RetryPolicy::default())
    }

    #[tokio::test]
    async fn test_review_writes_notes_and_caches() {
        let dir = vault();
        let cache_file = cache_path(dir.path(), None);
        let transport = Arc::new(ScriptedTransport::new("primary").then_ok(REVIEW));

        let report = review(
            dir.path(),
            &cache_file,
            client(transport.clone()),
            SchedulerConfig::default(),
            args(false),
            CancellationToken::new(),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(report.succeeded.len(), 2);
        assert!(cache_file.exists());

        let garden = std::fs::read_to_string(dir.path().join("projects/garden.md")).unwrap();
        assert!(garden.starts_with(GARDEN));
        let region = read_region(&garden, &RegionMarkers::managed())
            .unwrap()
            .unwrap();
        assert!(region.contains("**Health:** on track"));
        assert_eq!(
            read_region(&garden, &RegionMarkers::raw()).unwrap(),
            Some("keep me")
        );

        // Second run: the merged review does not make the notes stale.
        let again = review(
            dir.path(),
            &cache_file,
            client(transport.clone()),
            SchedulerConfig::default(),
            args(false),
            CancellationToken::new(),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(again.skipped.len(), 2);
        assert_eq!(transport.calls(), 2);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("projects/garden.md")).unwrap(),
            garden
        );
    }

    #[tokio::test]
    async fn test_invalidate_forces_one_recompute() {
        let dir = vault();
        let cache_file = cache_path(dir.path(), None);
        let transport = Arc::new(ScriptedTransport::new("primary").then_ok(REVIEW));

        for _ in 0..2 {
            review(
                dir.path(),
                &cache_file,
                client(transport.clone()),
                SchedulerConfig::default(),
                args(false),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        }
        assert_eq!(transport.calls(), 2);

        let keys = invalidate(&cache_file, "projects", &["garden".to_string()])
            .await
            .unwrap();
        assert_eq!(keys, vec![EntityKey::from("projects/garden.md")]);

        let report = review(
            dir.path(),
            &cache_file,
            client(transport.clone()),
            SchedulerConfig::default(),
            args(false),
            CancellationToken::new(),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(report.succeeded.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_report_table_lists_every_project() {
        let dir = vault();
        let transport = Arc::new(
            ScriptedTransport::new("primary")
                .then_ok(REVIEW)
                .route("Shed", Err(TransportError::auth("denied"))),
        );

        let report = review(
            dir.path(),
            &cache_path(dir.path(), None),
            client(transport),
            SchedulerConfig::default(),
            args(false),
            CancellationToken::new(),
        )
        .await
        .unwrap()
        .unwrap();

        let table = format_report(&report);
        assert!(table.starts_with("STATUS"));
        assert!(table.contains("reviewed   projects/garden.md on track"));
        assert!(table.contains("failed     projects/shed.md   transport/auth"));
        assert!(table.contains("1 reviewed, 0 cached, 1 failed, 0 cancelled"));
    }

    #[tokio::test]
    async fn test_empty_projects_dir_reviews_nothing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("projects")).unwrap();
        let transport = Arc::new(ScriptedTransport::new("primary").then_ok(REVIEW));

        let report = review(
            dir.path(),
            &cache_path(dir.path(), None),
            client(transport),
            SchedulerConfig::default(),
            args(false),
            CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(report.is_none());
    }

    #[test]
    fn test_cache_path_default() {
        assert_eq!(
            cache_path(Path::new("/vault"), None),
            PathBuf::from("/vault/.gtdflow-cache.json")
        );
        assert_eq!(
            cache_path(Path::new("/vault"), Some(PathBuf::from("/tmp/c.json"))),
            PathBuf::from("/tmp/c.json")
        );
    }
}
