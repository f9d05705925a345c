//! Project notes and their AI review.
//!
//! A project note is a markdown file with optional YAML frontmatter:
//!
//! ```text
//! ---
//! status: active
//! tags: [home, garden]
//! ---
//! # Vegetable garden
//!
//! ## Next Actions
//! - [ ] Buy seeds
//!
//! ## Waiting For
//! - Soil test results
//!
//! <!-- gtdflow:start:notes -->
//! free-form notes, never rewritten
//! <!-- gtdflow:end:notes -->
//! ```
//!
//! The review is written back into the `ai-review` region, which is excluded
//! from everything the review is computed from.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use gtdflow_core::{
    read_region, strip_regions, ContextFields, Error, GenerationRequest, InferenceConfig,
    RegionMarkers, Result,
};
use gtdflow_inference::{FieldKind, Schema};

const NEXT_ACTIONS: &str = "Next Actions";
const WAITING_FOR: &str = "Waiting For";

const SYSTEM_PROMPT: &str = "You are a GTD weekly-review assistant. Read the project \
note and assess whether it is moving. Answer with a JSON object with the keys \
\"summary\" (two or three sentences), \"health\" (one of \"on_track\", \"at_risk\", \
\"stalled\", \"done\"), \"next_actions\" (concrete physical next steps, at most five) \
and \"blockers\" (what the project is waiting on, possibly empty).";

const STRICT_SUFFIX: &str = " Your previous answer could not be parsed. Reply with the \
JSON object only: no prose, no code fences, no comments.";

// =============================================================================
// NOTE
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Frontmatter {
    pub status: Option<String>,
    pub tags: Vec<String>,
}

/// Checkbox task counter.
#[derive(Debug, Clone)]
pub struct TaskCounter {
    pattern: Regex,
}

impl TaskCounter {
    pub fn new() -> Result<Self> {
        let pattern = Regex::new(r"(?m)^\s*[-*+] \[([ xX])\]")
            .map_err(|e| Error::Internal(format!("task pattern: {}", e)))?;
        Ok(Self { pattern })
    }

    /// `(open, done)` checkbox counts.
    pub fn count(&self, text: &str) -> (usize, usize) {
        self.pattern
            .captures_iter(text)
            .fold((0, 0), |(open, done), caps| match &caps[1] {
                " " => (open + 1, done),
                _ => (open, done + 1),
            })
    }
}

/// The parts of a project note a review looks at.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectNote {
    pub title: String,
    pub frontmatter: Frontmatter,
    pub next_actions: String,
    pub waiting_for: String,
    /// Inner text of the raw notes region.
    pub notes: String,
    pub open_tasks: usize,
    pub done_tasks: usize,
}

impl ProjectNote {
    /// Parse a note. `fallback_title` is used when there is no `# ` heading.
    pub fn parse(text: &str, fallback_title: &str, tasks: &TaskCounter) -> Result<Self> {
        let (frontmatter, body) = split_frontmatter(text)?;
        let body = strip_regions(body, &[RegionMarkers::managed()])?;
        let outline = strip_regions(&body, &[RegionMarkers::raw()])?;

        let title = outline
            .lines()
            .find_map(|line| line.strip_prefix("# "))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| fallback_title.to_string());

        let notes = read_region(&body, &RegionMarkers::raw())?
            .unwrap_or_default()
            .to_string();
        let (open_tasks, done_tasks) = tasks.count(&body);

        Ok(Self {
            title,
            next_actions: section(&outline, NEXT_ACTIONS),
            waiting_for: section(&outline, WAITING_FOR),
            notes,
            open_tasks,
            done_tasks,
            frontmatter,
        })
    }

    /// Canonical digest fields, in a fixed order, excerpts truncated.
    pub fn context_fields(&self, excerpt_lines: usize) -> ContextFields {
        ContextFields::new()
            .field("title", &self.title)
            .field("status", self.frontmatter.status.as_deref().unwrap_or(""))
            .field("tags", self.frontmatter.tags.join(","))
            .count("open_tasks", self.open_tasks)
            .count("done_tasks", self.done_tasks)
            .excerpt("next_actions", &self.next_actions, excerpt_lines)
            .excerpt("waiting_for", &self.waiting_for, excerpt_lines)
            .excerpt("notes", &self.notes, excerpt_lines)
    }

    /// Generation request built from the canonical fields.
    pub fn request(&self, fields: &[String], strict: bool) -> GenerationRequest {
        let mut prompt = format!("Project note \"{}\":\n", self.title);
        for field in fields {
            prompt.push_str(field);
            prompt.push('\n');
        }

        if strict {
            GenerationRequest::new(format!("{}{}", SYSTEM_PROMPT, STRICT_SUFFIX))
                .with_user(prompt)
                .with_inference_config(InferenceConfig {
                    temperature: Some(0.0),
                    ..InferenceConfig::default()
                })
        } else {
            GenerationRequest::new(SYSTEM_PROMPT).with_user(prompt)
        }
    }
}

/// Split off a leading `---` YAML block.
fn split_frontmatter(text: &str) -> Result<(Frontmatter, &str)> {
    let Some(rest) = text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))
    else {
        return Ok((Frontmatter::default(), text));
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            let frontmatter = if yaml.trim().is_empty() {
                Frontmatter::default()
            } else {
                serde_yaml::from_str(yaml)
                    .map_err(|e| Error::InvalidInput(format!("invalid frontmatter: {}", e)))?
            };
            return Ok((frontmatter, body));
        }
        offset += line.len();
    }
    Err(Error::InvalidInput(
        "frontmatter is not terminated by ---".to_string(),
    ))
}

/// Body of a `## heading` section, up to the next heading of level 1 or 2.
fn section(body: &str, heading: &str) -> String {
    let mut lines = body.lines();
    let found = lines.by_ref().any(|line| {
        line.strip_prefix("## ")
            .is_some_and(|h| h.trim().eq_ignore_ascii_case(heading))
    });
    if !found {
        return String::new();
    }
    lines
        .take_while(|line| !line.starts_with("# ") && !line.starts_with("## "))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

// =============================================================================
// REVIEW
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    OnTrack,
    AtRisk,
    Stalled,
    Done,
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Health::OnTrack => "on track",
            Health::AtRisk => "at risk",
            Health::Stalled => "stalled",
            Health::Done => "done",
        })
    }
}

/// Validated model output for one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectReview {
    pub summary: String,
    pub health: Health,
    pub next_actions: Vec<String>,
    #[serde(default)]
    pub blockers: Option<Vec<String>>,
}

pub fn review_schema() -> Schema<ProjectReview> {
    Schema::object("project_review")
        .required("summary", FieldKind::NonEmptyString)
        .required(
            "health",
            FieldKind::one_of(&["on_track", "at_risk", "stalled", "done"]),
        )
        .required("next_actions", FieldKind::array(FieldKind::NonEmptyString))
        .optional("blockers", FieldKind::array(FieldKind::String))
}

impl ProjectReview {
    /// Markdown for the managed region.
    pub fn render(&self) -> String {
        let mut out = format!(
            "### AI review\n\n**Health:** {}\n\n{}\n",
            self.health,
            self.summary.trim()
        );

        if !self.next_actions.is_empty() {
            out.push_str("\n**Suggested next actions**\n\n");
            for action in &self.next_actions {
                out.push_str(&format!("- {}\n", action.trim()));
            }
        }

        let blockers: Vec<&str> = self
            .blockers
            .iter()
            .flatten()
            .map(|b| b.trim())
            .filter(|b| !b.is_empty())
            .collect();
        if !blockers.is_empty() {
            out.push_str("\n**Blockers**\n\n");
            for blocker in blockers {
                out.push_str(&format!("- {}\n", blocker));
            }
        }
        out
    }
}
