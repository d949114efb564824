//! yuque-export: download a Yuque knowledge base as a folder tree of Markdown files with
//! localized images and a `SUMMARY.md` index.

pub mod cli;
pub mod config;
pub mod crawl;
pub mod error;
pub mod exporter;
pub mod fetcher;
pub mod hierarchy;
pub mod logging;
pub mod model;
pub mod retry;
pub mod sanitize;
pub mod summary;

// Re-exports for CLI and consumers.
pub use config::Config;
pub use crawl::{
    plan_book, BookPlan, CancellationToken, ChannelObserver, Crawler, DelaySource,
    FixedDelay, ProgressObserver, RandomDelay,
};
pub use error::ExportError;
pub use fetcher::{
    validate_book_url, FetchError, RemoteSource, SessionClient, SessionClientBuilder,
    YuqueFetcher,
};
pub use model::{Book, DocumentContent, DownloadJob, JobStatus, ProgressSnapshot, TocNode};
pub use retry::{RetryPolicy, Retrying};
