//! Bounded retry around any [`RemoteSource`]. Transient failures are attempted again after a
//! backoff; a cancelled job stops retrying and wakes from the backoff early.

use crate::config::DEFAULT_MAX_RETRIES;
use crate::crawl::CancellationToken;
use crate::fetcher::{FetchError, RemoteSource};
use crate::model::{Book, DocumentContent};
use std::time::{Duration, Instant};
use tracing::debug;

/// Seconds to wait before each retry (1s, 2s, 4s, 8s). The last value is reused.
pub const DEFAULT_BACKOFF_SECS: [u64; 4] = [1, 2, 4, 8];
/// Backoff for HTTP 429 (rate limit): wait longer so the server can recover.
pub const RATE_LIMIT_BACKOFF_SECS: [u64; 4] = [30, 60, 90, 120];

const CANCEL_POLL: Duration = Duration::from_millis(100);

/// Attempt count and backoff tables for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    backoff_secs: Vec<u64>,
    rate_limit_backoff_secs: Vec<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_MAX_RETRIES,
            backoff_secs: DEFAULT_BACKOFF_SECS.to_vec(),
            rate_limit_backoff_secs: RATE_LIMIT_BACKOFF_SECS.to_vec(),
        }
    }
}

impl RetryPolicy {
    /// Attempts per call, counting the first one.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Set attempts per call (at least 1).
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Backoff delays in seconds before each retry. An empty list keeps the current table.
    pub fn with_backoff_secs(mut self, secs: Vec<u64>) -> Self {
        if !secs.is_empty() {
            self.backoff_secs = secs;
        }
        self
    }

    /// Same as [`RetryPolicy::with_backoff_secs`], for HTTP 429 responses.
    pub fn with_rate_limit_backoff_secs(mut self, secs: Vec<u64>) -> Self {
        if !secs.is_empty() {
            self.rate_limit_backoff_secs = secs;
        }
        self
    }

    /// Wait before retry number `retry` (0-based).
    pub fn delay(&self, retry: u32, rate_limited: bool) -> Duration {
        let table = if rate_limited {
            &self.rate_limit_backoff_secs
        } else {
            &self.backoff_secs
        };
        let secs = table
            .get(retry as usize)
            .or_else(|| table.last())
            .copied()
            .unwrap_or(0);
        Duration::from_secs(secs)
    }
}

/// [`RemoteSource`] that retries the calls of `inner` under a [`RetryPolicy`].
pub struct Retrying<'a, S: RemoteSource + ?Sized> {
    inner: &'a S,
    policy: &'a RetryPolicy,
    cancel: &'a CancellationToken,
}

impl<'a, S: RemoteSource + ?Sized> Retrying<'a, S> {
    pub fn new(inner: &'a S, policy: &'a RetryPolicy, cancel: &'a CancellationToken) -> Self {
        Self {
            inner,
            policy,
            cancel,
        }
    }

    fn call<T>(
        &self,
        what: &str,
        op: impl Fn(&S) -> Result<T, FetchError>,
    ) -> Result<T, FetchError> {
        let mut attempt: u32 = 1;
        loop {
            match op(self.inner) {
                Err(e)
                    if e.is_transient()
                        && attempt < self.policy.attempts
                        && !self.cancel.is_cancelled() =>
                {
                    let wait = self.policy.delay(attempt - 1, e.is_rate_limited());
                    debug!(what, attempt, ?wait, error = %e, "retrying");
                    if !self.pause(wait) {
                        return Err(e);
                    }
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Sleep for `wait`, waking early on cancellation. False when cancelled.
    fn pause(&self, wait: Duration) -> bool {
        let deadline = Instant::now() + wait;
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(CANCEL_POLL));
        }
    }
}

impl<S: RemoteSource + ?Sized> RemoteSource for Retrying<'_, S> {
    fn fetch_book_title(&self, url: &str) -> Result<String, FetchError> {
        self.call("book title", |s| s.fetch_book_title(url))
    }

    fn fetch_book_data(&self, url: &str) -> Result<Book, FetchError> {
        self.call("book data", |s| s.fetch_book_data(url))
    }

    fn fetch_document(&self, book_id: u64, slug: &str) -> Result<DocumentContent, FetchError> {
        self.call("document", |s| s.fetch_document(book_id, slug))
    }

    fn download_asset(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.call("asset", |s| s.download_asset(url))
    }
}
