//! Marker-delimited regions in markdown documents.
//!
//! A document is a sequence of spans: unmanaged text plus any number of named
//! regions, each delimited by a unique start/end marker pair:
//!
//! ```text
//! <!-- gtdflow:start:ai-review -->
//! ...rewritten on every merge...
//! <!-- gtdflow:end:ai-review -->
//! ```
//!
//! [`merge`] splices new content into exactly one named region and passes all
//! other bytes through untouched, including other regions such as the raw
//! `notes` region that holds user-authored text. It never guesses: when a
//! region's markers are missing, duplicated, out of order or nested, it
//! returns a [`RegionError`] instead of writing.

use std::ops::Range;

use crate::defaults::{MANAGED_REGION_NAME, RAW_REGION_NAME, REGION_MARKER_PREFIX};
use crate::error::RegionError;

/// Start/end sentinel pair for one logical region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionMarkers {
    name: String,
    start: String,
    end: String,
}

impl RegionMarkers {
    /// Standard gtdflow markers for a region name.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            start: format!("{}start:{} -->", REGION_MARKER_PREFIX, name),
            end: format!("{}end:{} -->", REGION_MARKER_PREFIX, name),
            name,
        }
    }

    /// Region the pipeline rewrites with AI output.
    pub fn managed() -> Self {
        Self::named(MANAGED_REGION_NAME)
    }

    /// Region reserved for user-authored text; never written by the pipeline.
    pub fn raw() -> Self {
        Self::named(RAW_REGION_NAME)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn end(&self) -> &str {
        &self.end
    }
}

/// Where a region is inserted when the document does not contain it yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeAnchor {
    /// Append after the existing content.
    #[default]
    End,
    /// Directly after a leading YAML frontmatter block; falls back to `End`
    /// when the document has none.
    AfterFrontmatter,
}

/// Byte offsets of a located region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Located {
    /// Start of the start marker.
    outer_start: usize,
    /// First byte after the start marker.
    inner_start: usize,
    /// First byte of the end marker.
    inner_end: usize,
    /// First byte after the end marker.
    outer_end: usize,
}

fn locate(document: &str, markers: &RegionMarkers) -> Result<Option<Located>, RegionError> {
    let starts: Vec<usize> = document
        .match_indices(markers.start())
        .map(|(i, _)| i)
        .collect();
    let ends: Vec<usize> = document
        .match_indices(markers.end())
        .map(|(i, _)| i)
        .collect();
    let region = markers.name().to_string();

    match (starts.len(), ends.len()) {
        (0, 0) => Ok(None),
        (1, 1) => {
            let outer_start = starts[0];
            let inner_end = ends[0];
            let inner_start = outer_start + markers.start().len();
            if inner_end < inner_start {
                return Err(RegionError::OutOfOrder { region });
            }

            let inner = &document[inner_start..inner_end];
            if let Some(pos) = inner.find(REGION_MARKER_PREFIX) {
                return Err(RegionError::Nested {
                    region,
                    marker: marker_at(inner, pos),
                });
            }

            if let Some(marker) = enclosing_marker(&document[..outer_start]) {
                return Err(RegionError::Nested { region, marker });
            }

            Ok(Some(Located {
                outer_start,
                inner_start,
                inner_end,
                outer_end: inner_end + markers.end().len(),
            }))
        }
        (1, 0) => Err(RegionError::MissingEnd { region }),
        (0, 1) => Err(RegionError::MissingStart { region }),
        (starts, ends) => Err(RegionError::Duplicated {
            region,
            starts,
            ends,
        }),
    }
}

/// Start marker of a region still open at the end of `prefix`, if any.
fn enclosing_marker(prefix: &str) -> Option<String> {
    let mut open: Vec<(String, String)> = Vec::new();
    for (pos, _) in prefix.match_indices(REGION_MARKER_PREFIX) {
        let marker = marker_at(prefix, pos);
        let tag = marker[REGION_MARKER_PREFIX.len()..]
            .trim_end_matches("-->")
            .trim();
        if let Some(name) = tag.strip_prefix("start:") {
            open.push((name.to_string(), marker));
        } else if let Some(name) = tag.strip_prefix("end:") {
            if let Some(i) = open.iter().rposition(|(n, _)| n == name) {
                open.remove(i);
            }
        }
    }
    open.pop().map(|(_, marker)| marker)
}

fn marker_at(text: &str, pos: usize) -> String {
    let rest = &text[pos..];
    match rest.find("-->") {
        Some(end) => rest[..end + 3].to_string(),
        None => rest.lines().next().unwrap_or(rest).to_string(),
    }
}

/// Inner text as written by `merge`: content framed by single newlines.
fn region_body(content: &str) -> String {
    let content = content.trim_matches('\n');
    if content.is_empty() {
        "\n".to_string()
    } else {
        format!("\n{}\n", content)
    }
}

/// Byte offset just past a leading `---` frontmatter block, if any.
fn frontmatter_end(document: &str) -> Option<usize> {
    let rest = document
        .strip_prefix("---\n")
        .or_else(|| document.strip_prefix("---\r\n"))?;
    let mut pos = document.len() - rest.len();
    for line in rest.split_inclusive('\n') {
        pos += line.len();
        if line.trim_end() == "---" {
            return Some(pos);
        }
    }
    None
}

/// Replace the content of the region named by `markers`, appending the region
/// at the end of the document if it is absent.
pub fn merge(
    document: &str,
    markers: &RegionMarkers,
    new_content: &str,
) -> Result<String, RegionError> {
    merge_at(document, markers, new_content, MergeAnchor::End)
}

/// [`merge`] with an explicit anchor for first insertion.
pub fn merge_at(
    document: &str,
    markers: &RegionMarkers,
    new_content: &str,
    anchor: MergeAnchor,
) -> Result<String, RegionError> {
    if new_content.contains(REGION_MARKER_PREFIX)
        || new_content.contains(markers.start())
        || new_content.contains(markers.end())
    {
        return Err(RegionError::ContentContainsMarker {
            region: markers.name().to_string(),
        });
    }

    let body = region_body(new_content);

    if let Some(loc) = locate(document, markers)? {
        let mut out = String::with_capacity(document.len() + body.len());
        out.push_str(&document[..loc.inner_start]);
        out.push_str(&body);
        out.push_str(&document[loc.inner_end..]);
        return Ok(out);
    }

    let block = format!("{}{}{}", markers.start(), body, markers.end());

    let insert_at = match anchor {
        MergeAnchor::AfterFrontmatter => frontmatter_end(document),
        MergeAnchor::End => None,
    };

    let out = match insert_at {
        Some(pos) => {
            let (head, tail) = document.split_at(pos);
            let mut out = String::with_capacity(document.len() + block.len() + 3);
            out.push_str(head);
            if !head.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&block);
            out.push('\n');
            if !tail.is_empty() && !tail.starts_with('\n') {
                out.push('\n');
            }
            out.push_str(tail);
            out
        }
        None => {
            let mut out = String::with_capacity(document.len() + block.len() + 3);
            out.push_str(document);
            if !document.is_empty() {
                if !document.ends_with('\n') {
                    out.push('\n');
                }
                out.push('\n');
            }
            out.push_str(&block);
            out.push('\n');
            out
        }
    };

    Ok(out)
}

/// Inner text of a region without the framing newlines, or `None` if absent.
pub fn read_region<'a>(
    document: &'a str,
    markers: &RegionMarkers,
) -> Result<Option<&'a str>, RegionError> {
    Ok(locate(document, markers)?.map(|loc| {
        let inner = &document[loc.inner_start..loc.inner_end];
        let inner = inner.strip_prefix('\n').unwrap_or(inner);
        inner.strip_suffix('\n').unwrap_or(inner)
    }))
}

/// Kind of a document span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanKind {
    /// Text outside every known region.
    Unmanaged,
    /// A whole region including its markers; `inner` is the content range.
    Region { name: String, inner: Range<usize> },
}

/// Contiguous slice of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub kind: SpanKind,
    pub range: Range<usize>,
}

/// Split a document into typed spans for the given region kinds.
///
/// The spans are contiguous and cover the whole document in order.
pub fn spans(document: &str, regions: &[RegionMarkers]) -> Result<Vec<Span>, RegionError> {
    let mut found = Vec::new();
    for markers in regions {
        if let Some(loc) = locate(document, markers)? {
            found.push((loc, markers.name().to_string()));
        }
    }
    found.sort_by_key(|(loc, _)| loc.outer_start);

    let mut spans = Vec::with_capacity(found.len() * 2 + 1);
    let mut cursor = 0;
    for (loc, name) in found {
        if loc.outer_start > cursor {
            spans.push(Span {
                kind: SpanKind::Unmanaged,
                range: cursor..loc.outer_start,
            });
        }
        spans.push(Span {
            kind: SpanKind::Region {
                name,
                inner: loc.inner_start..loc.inner_end,
            },
            range: loc.outer_start..loc.outer_end,
        });
        cursor = loc.outer_end;
    }
    if cursor < document.len() {
        spans.push(Span {
            kind: SpanKind::Unmanaged,
            range: cursor..document.len(),
        });
    }
    Ok(spans)
}

/// Document text with the given regions (markers included) removed.
pub fn strip_regions(document: &str, regions: &[RegionMarkers]) -> Result<String, RegionError> {
    Ok(spans(document, regions)?
        .into_iter()
        .filter(|span| span.kind == SpanKind::Unmanaged)
        .map(|span| &document[span.range])
        .collect())
}
