//! Remote entities (book, TOC nodes, document content) and the job/progress values exchanged with callers.

use crate::config::Config;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::PathBuf;

/// TOC node kind for folder-like grouping entries.
pub const TITLE_KIND: &str = "TITLE";
/// TOC node kind for ordinary documents.
pub const DOC_KIND: &str = "DOC";

/// Remote fields are frequently `null` instead of absent; treat both as the default value.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Knowledge base snapshot embedded in the book page. Fetched once per job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Book {
    #[serde(default, deserialize_with = "nullable")]
    pub id: u64,
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub description: String,
    /// Table of contents in display order.
    #[serde(default, deserialize_with = "nullable")]
    pub toc: Vec<TocNode>,
}

/// One table-of-contents entry. Parent/child links are opaque identifiers, never references.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TocNode {
    #[serde(default, deserialize_with = "nullable")]
    pub uuid: String,
    #[serde(default, deserialize_with = "nullable")]
    pub title: String,
    #[serde(default, deserialize_with = "nullable")]
    pub url: String,
    #[serde(default, deserialize_with = "nullable")]
    pub slug: String,
    #[serde(rename = "type", default, deserialize_with = "nullable")]
    pub kind: String,
    #[serde(default, deserialize_with = "nullable")]
    pub parent_uuid: String,
    #[serde(default, deserialize_with = "nullable")]
    pub child_uuid: String,
    #[serde(default, deserialize_with = "nullable")]
    pub depth: u32,
}

impl TocNode {
    /// Folder-like node: an explicit `TITLE` entry or any node that has children.
    pub fn is_grouping(&self) -> bool {
        self.kind == TITLE_KIND || !self.child_uuid.is_empty()
    }

    /// Identifier used to fetch the node's content, if it has any.
    ///
    /// The `url` field is authoritative; `slug` is only consulted for `DOC` nodes.
    pub fn content_id(&self) -> Option<&str> {
        if !self.url.is_empty() {
            Some(&self.url)
        } else if self.kind == DOC_KIND && !self.slug.is_empty() && self.slug != "#" {
            Some(&self.slug)
        } else {
            None
        }
    }
}

/// Top-level object behind the page's embedded payload.
#[derive(Debug, Clone, Deserialize)]
pub struct PageData {
    pub book: Book,
}

/// One document as returned by the content API.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DocumentContent {
    #[serde(default, deserialize_with = "nullable")]
    pub id: u64,
    #[serde(default, deserialize_with = "nullable")]
    pub slug: String,
    #[serde(default, deserialize_with = "nullable")]
    pub title: String,
    /// Markdown source (`mode=markdown`).
    #[serde(rename = "sourcecode", default, deserialize_with = "nullable")]
    pub source: String,
}

/// Envelope of the content API response.
#[derive(Debug, Clone, Deserialize)]
pub struct DocResponse {
    pub data: DocumentContent,
}

/// Everything needed to run one export. Owned by the caller and never mutated by the crawler.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    /// Book page URL.
    pub url: String,
    /// Session cookie; empty for public books.
    pub credential: String,
    /// Root under which the book folder is created.
    pub output_dir: PathBuf,
    pub config: Config,
}

/// Job state as seen by observers. Every state except `Downloading` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Downloading,
    Completed,
    Error,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Downloading => "downloading",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time progress value handed to observers by copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub book_title: String,
    pub current_doc: String,
    pub total_docs: usize,
    pub finished_docs: usize,
    pub status: JobStatus,
    /// Only set when `status` is `Error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub start_time: DateTime<Utc>,
    /// 0–100, derived from the two counters.
    pub percentage: f64,
}

impl ProgressSnapshot {
    pub fn started_now() -> Self {
        Self {
            book_title: String::new(),
            current_doc: String::new(),
            total_docs: 0,
            finished_docs: 0,
            status: JobStatus::Downloading,
            error: None,
            start_time: Utc::now(),
            percentage: 0.0,
        }
    }

    /// Recompute `percentage` from the counters; stays at 0 when there is nothing to do.
    pub fn update_percentage(&mut self) {
        if self.total_docs > 0 {
            self.percentage = self.finished_docs as f64 / self.total_docs as f64 * 100.0;
        }
    }
}
