//! Project-note handler for the batch scheduler.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use gtdflow_core::defaults::CONTEXT_EXCERPT_LINES;
use gtdflow_core::{DocumentId, DocumentStore, EntityContext, EntityKey, Error, Result};
use gtdflow_inference::Schema;
use gtdflow_jobs::EntityHandler;
use gtdflow_store::FsDocumentStore;

use crate::project::{review_schema, ProjectNote, ProjectReview, TaskCounter};

/// Reviews project notes stored in a vault directory.
///
/// Entity keys are vault-relative note paths; each note is also the document
/// its review is merged into.
pub struct ProjectReviewHandler {
    notes: FsDocumentStore,
    schema: Schema<ProjectReview>,
    tasks: TaskCounter,
    excerpt_lines: usize,
}

impl ProjectReviewHandler {
    pub fn new(vault: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            notes: FsDocumentStore::new(vault),
            schema: review_schema(),
            tasks: TaskCounter::new()?,
            excerpt_lines: CONTEXT_EXCERPT_LINES,
        })
    }
}

#[async_trait]
impl EntityHandler for ProjectReviewHandler {
    type Output = ProjectReview;

    fn schema(&self) -> &Schema<ProjectReview> {
        &self.schema
    }

    async fn load(&self, key: &EntityKey) -> Result<EntityContext> {
        let document = DocumentId::from(key.as_str());
        let text = self
            .notes
            .read(&document)
            .await?
            .ok_or_else(|| Error::InvalidInput(format!("project note not found: {}", key)))?;

        let fallback_title = Path::new(key.as_str())
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(key.as_str());
        let note = ProjectNote::parse(&text, fallback_title, &self.tasks)?;
        let fields = note.context_fields(self.excerpt_lines).into_fields();
        debug!(
            entity_key = %key,
            title = %note.title,
            open_tasks = note.open_tasks,
            done_tasks = note.done_tasks,
            "Loaded project note"
        );

        Ok(EntityContext {
            key: key.clone(),
            request: note.request(&fields, false),
            strict_request: Some(note.request(&fields, true)),
            document,
            fields,
        })
    }

    fn render(&self, _key: &EntityKey, output: &ProjectReview) -> String {
        output.render()
    }
}

/// Vault-relative keys of the `*.md` notes directly under `projects_dir`, sorted.
pub async fn discover_projects(vault: &Path, projects_dir: &str) -> Result<Vec<EntityKey>> {
    let dir = vault.join(projects_dir);
    let mut entries = tokio::fs::read_dir(&dir).await.map_err(|e| {
        Error::InvalidInput(format!(
            "cannot read projects directory {}: {}",
            dir.display(),
            e
        ))
    })?;

    let mut keys = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_note = path.extension().is_some_and(|ext| ext == "md");
        if !is_note || !entry.file_type().await?.is_file() {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            keys.push(project_key(projects_dir, name));
        }
    }
    keys.sort();
    Ok(keys)
}

/// Key for a project given on the command line: `garden`, `garden.md` and
/// `projects/garden.md` all name the same note.
pub fn project_key(projects_dir: &str, arg: &str) -> EntityKey {
    let arg = arg.trim_start_matches("./");
    if arg.contains('/') {
        return EntityKey::from(arg);
    }
    let file = if arg.ends_with(".md") {
        arg.to_string()
    } else {
        format!("{}.md", arg)
    };
    let dir = projects_dir.trim_end_matches('/');
    if dir.is_empty() || dir == "." {
        EntityKey::from(file)
    } else {
        EntityKey::from(format!("{}/{}", dir, file))
    }
}
