//! Errors surfaced by the exporter and the crawl orchestrator.

use crate::fetcher::FetchError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("download cancelled")]
    Cancelled,
}

impl ExportError {
    pub(crate) fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ExportError::Filesystem {
            path: path.into(),
            source,
        }
    }
}
