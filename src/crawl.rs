//! End-to-end export of one book: metadata, folder layout, per-document export,
//! `SUMMARY.md`, pacing, progress reporting, and cooperative cancellation.

use crate::error::ExportError;
use crate::exporter::{join_relative, DocumentExporter};
use crate::fetcher::{FetchError, RemoteSource};
use crate::hierarchy::PathMap;
use crate::model::{Book, DownloadJob, JobStatus, ProgressSnapshot};
use crate::retry::{RetryPolicy, Retrying};
use crate::sanitize::resolve_folder_name;
use crate::summary::{Summary, SUMMARY_FILE};
use rand::Rng;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Receives a copy of the job's progress at every transition.
pub trait ProgressObserver {
    fn on_progress(&self, snapshot: ProgressSnapshot);
}

impl<F> ProgressObserver for F
where
    F: Fn(ProgressSnapshot),
{
    fn on_progress(&self, snapshot: ProgressSnapshot) {
        self(snapshot)
    }
}

/// Hands snapshots to another thread. A dropped receiver is ignored.
#[derive(Debug, Clone)]
pub struct ChannelObserver(pub Sender<ProgressSnapshot>);

impl ProgressObserver for ChannelObserver {
    fn on_progress(&self, snapshot: ProgressSnapshot) {
        let _ = self.0.send(snapshot);
    }
}

/// Cancellation flag shared between the caller and one job. Checked before each TOC node.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Source of the pause taken after each exported document.
pub trait DelaySource {
    fn next_delay(&mut self, min_secs: u64, max_secs: u64) -> Duration;
}

/// Uniform whole seconds in `[min, max)`; no pause when `max <= min`.
#[derive(Debug)]
pub struct RandomDelay<R = rand::rngs::ThreadRng> {
    rng: R,
}

impl RandomDelay {
    pub fn new() -> Self {
        Self { rng: rand::rng() }
    }
}

impl Default for RandomDelay {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> RandomDelay<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> DelaySource for RandomDelay<R> {
    fn next_delay(&mut self, min_secs: u64, max_secs: u64) -> Duration {
        if max_secs <= min_secs {
            return Duration::ZERO;
        }
        Duration::from_secs(self.rng.random_range(min_secs..max_secs))
    }
}

/// Replays a fixed sequence, then zero. Bounds are ignored.
#[derive(Debug, Default, Clone)]
pub struct FixedDelay {
    delays: VecDeque<Duration>,
}

impl FixedDelay {
    pub fn new(delays: impl IntoIterator<Item = Duration>) -> Self {
        Self {
            delays: delays.into_iter().collect(),
        }
    }
}

impl<T: DelaySource + ?Sized> DelaySource for &mut T {
    fn next_delay(&mut self, min_secs: u64, max_secs: u64) -> Duration {
        (**self).next_delay(min_secs, max_secs)
    }
}

impl DelaySource for FixedDelay {
    fn next_delay(&mut self, _min_secs: u64, _max_secs: u64) -> Duration {
        self.delays.pop_front().unwrap_or(Duration::ZERO)
    }
}

/// What the book page says about the book, and where it will be written.
#[derive(Debug, Clone)]
pub struct BookPlan {
    /// Title derived from the page `<title>`.
    pub fetched_title: String,
    /// Book name, or the fetched title when the book has none.
    pub display_title: String,
    pub folder_name: String,
    pub book: Book,
}

impl BookPlan {
    pub fn new(fetched_title: &str, book: Book) -> Self {
        let fetched_title = fetched_title.trim().to_string();
        let display_title = match book.name.trim() {
            "" => fetched_title.clone(),
            name => name.to_string(),
        };
        let folder_name = resolve_folder_name(&display_title, &fetched_title, book.id);
        Self {
            fetched_title,
            display_title,
            folder_name,
            book,
        }
    }

    /// Number of TOC nodes; the total reported to observers.
    pub fn node_count(&self) -> usize {
        self.book.toc.len()
    }
}

/// Fetch title and book data without writing anything.
pub fn plan_book<S: RemoteSource + ?Sized>(source: &S, url: &str) -> Result<BookPlan, FetchError> {
    let title = source.fetch_book_title(url)?;
    let book = source.fetch_book_data(url)?;
    Ok(BookPlan::new(&title, book))
}

/// Drives one job at a time over a remote source.
pub struct Crawler<'a, S: RemoteSource + ?Sized, D: DelaySource> {
    source: &'a S,
    delay: D,
    retry: RetryPolicy,
}

impl<'a, S: RemoteSource + ?Sized, D: DelaySource> Crawler<'a, S, D> {
    pub fn new(source: &'a S, delay: D) -> Self {
        Self {
            source,
            delay,
            retry: RetryPolicy::default(),
        }
    }

    /// Backoff tables for transient fetch failures. The attempt count always comes from the
    /// job's `max_retries`.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Export the whole book described by `job`.
    ///
    /// Every fetch goes through the retry policy, with `max_retries` attempts per call.
    /// Fatal failures (metadata, output folder, `SUMMARY.md`) end the job with an `error`
    /// snapshot; a failing document is logged and skipped. Cancellation ends the job with a
    /// `cancelled` snapshot and `ExportError::Cancelled`, leaving written files in place.
    /// On success returns the final `completed` snapshot.
    pub fn run(
        &mut self,
        job: DownloadJob,
        observer: &dyn ProgressObserver,
        cancel: &CancellationToken,
    ) -> Result<ProgressSnapshot, ExportError> {
        let config = job.config.clone().normalized();
        let retry = self.retry.clone().with_attempts(config.max_retries);
        let source = Retrying::new(self.source, &retry, cancel);
        let mut progress = ProgressSnapshot::started_now();
        info!(url = %job.url, output = %job.output_dir.display(), "export started");

        let fetched_title = match source.fetch_book_title(&job.url) {
            Ok(title) => title,
            Err(e) => return Err(fail(&mut progress, observer, "fetch book title", e.into())),
        };
        progress.book_title = fetched_title.trim().to_string();
        observer.on_progress(progress.clone());

        let book = match source.fetch_book_data(&job.url) {
            Ok(book) => book,
            Err(e) => return Err(fail(&mut progress, observer, "fetch book data", e.into())),
        };
        let plan = BookPlan::new(&fetched_title, book);
        progress.book_title = plan.display_title.clone();

        let book_dir = job.output_dir.join(&plan.folder_name);
        if let Err(e) = std::fs::create_dir_all(&book_dir) {
            let err = ExportError::filesystem(&book_dir, e);
            return Err(fail(&mut progress, observer, "create output folder", err));
        }

        let book = plan.book;
        let paths = PathMap::resolve(&book.toc);
        progress.total_docs = book.toc.len();
        observer.on_progress(progress.clone());
        info!(
            title = %progress.book_title,
            nodes = book.toc.len(),
            folder = %book_dir.display(),
            "book resolved"
        );

        let exporter = DocumentExporter::new(&source, &book_dir);
        let mut summary = Summary::new();

        for node in &book.toc {
            if cancel.is_cancelled() {
                progress.status = JobStatus::Cancelled;
                observer.on_progress(progress.clone());
                info!(finished = progress.finished_docs, "export cancelled");
                return Err(ExportError::Cancelled);
            }

            progress.current_doc = node.title.clone();
            observer.on_progress(progress.clone());

            if node.is_grouping() {
                if let Some(dir) = paths.dir(&node.uuid) {
                    summary.push_group(dir);
                    let dir_path = join_relative(&book_dir, dir);
                    if let Err(e) = std::fs::create_dir_all(&dir_path) {
                        warn!(path = %dir_path.display(), error = %e, "could not create directory");
                    }
                }
            }

            let Some(content_id) = node.content_id() else {
                continue;
            };
            let parent_dir = paths.parent_dir(node);
            if let Err(e) = exporter.export_document(book.id, content_id, &node.title, parent_dir)
            {
                warn!(title = %node.title, error = %e, "document skipped");
                continue;
            }

            summary.push_document(&node.title, parent_dir);
            progress.finished_docs += 1;
            progress.update_percentage();
            observer.on_progress(progress.clone());

            let pause = self
                .delay
                .next_delay(config.delay_min_secs, config.delay_max_secs);
            if !pause.is_zero() {
                std::thread::sleep(pause);
            }
        }

        let summary_path = book_dir.join(SUMMARY_FILE);
        if let Err(e) = std::fs::write(&summary_path, summary.as_str()) {
            let err = ExportError::filesystem(&summary_path, e);
            return Err(fail(&mut progress, observer, "write SUMMARY.md", err));
        }

        progress.status = JobStatus::Completed;
        observer.on_progress(progress.clone());
        info!(
            finished = progress.finished_docs,
            total = progress.total_docs,
            "export completed"
        );
        Ok(progress)
    }
}

/// Mark the job failed, notify, and hand the error back for propagation.
fn fail(
    progress: &mut ProgressSnapshot,
    observer: &dyn ProgressObserver,
    stage: &str,
    err: ExportError,
) -> ExportError {
    progress.status = JobStatus::Error;
    progress.error = Some(format!("{}: {}", stage, err));
    observer.on_progress(progress.clone());
    error!(stage, error = %err, "export failed");
    err
}

/// Book folder a job would write into, once its plan is known.
pub fn book_dir(job: &DownloadJob, plan: &BookPlan) -> PathBuf {
    job.output_dir.join(&plan.folder_name)
}
