//! CLI parsing and orchestration. Parses args, merges config, runs the export with a progress
//! bar and Ctrl-C cancellation. Maps errors to exit codes.

use crate::config::{self, default_output_dir, Config, ConfigFile};
use crate::crawl::{book_dir, plan_book, CancellationToken, Crawler, RandomDelay};
use crate::error::ExportError;
use crate::fetcher::{validate_book_url, FetchError, SessionClient, YuqueFetcher};
use crate::model::{DownloadJob, ProgressSnapshot};
use crate::retry::{RetryPolicy, Retrying};
use clap::Parser;
use std::cell::RefCell;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Export(#[from] ExportError),

    #[error("Download cancelled. Documents written so far were kept.")]
    Cancelled,
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) => 1,
            CliRunError::Export(_) => 2,
            CliRunError::Cancelled => 130,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "yuque-export")]
#[command(about = "Export a Yuque knowledge base to a folder of Markdown files")]
#[command(
    after_help = "Config file keys (output_dir, cookie, user_agent, api_base, delay_min_secs, delay_max_secs, timeout_secs, max_retries, retry_backoff_secs, concurrent_downloads) are read from ./yuque-export.toml or the user config dir. CLI flags override config."
)]
pub struct Args {
    /// Knowledge-base URL, e.g. https://www.yuque.com/<user>/<book>.
    pub url: String,

    /// Output directory. The book folder is created inside it. Default: ~/Downloads/yuque-downloads.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Session cookie from a logged-in browser (overrides config). Not needed for public books.
    #[arg(long)]
    pub cookie: Option<String>,

    /// Minimum pause after each document, in seconds (default 1).
    #[arg(long)]
    pub delay_min: Option<u64>,

    /// Maximum pause after each document, in seconds, exclusive (default 4).
    #[arg(long)]
    pub delay_max: Option<u64>,

    /// Request timeout in seconds (default 30).
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Attempts per request for transient failures (default 3).
    #[arg(long)]
    pub retries: Option<u32>,

    /// HTTP User-Agent (overrides config).
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Fetch book metadata only; print title, node count, and output folder without writing.
    #[arg(long)]
    pub dry_run: bool,

    /// Suppress progress output (errors only).
    #[arg(short, long)]
    pub quiet: bool,

    /// Debug logging and full error chain.
    #[arg(long)]
    pub verbose: bool,
}

fn url_error(e: FetchError) -> CliRunError {
    match e {
        FetchError::InvalidUrl { input, reason } => CliRunError::InvalidInput(format!(
            "Expected a knowledge-base URL. Example: https://www.yuque.com/user/book. Invalid: {}: {}",
            input, reason
        )),
        FetchError::UnrecognizedHost { host } => CliRunError::InvalidInput(format!(
            "Unsupported site: {}. Provide a yuque.com knowledge-base URL.",
            host
        )),
        other => CliRunError::Export(other.into()),
    }
}

/// Defaults, then config file keys, then command-line flags.
fn effective_config(args: &Args, file: Option<&ConfigFile>) -> Config {
    let base = match file {
        Some(f) => f.apply(Config::default()),
        None => Config::default(),
    };
    Config {
        delay_min_secs: args.delay_min.unwrap_or(base.delay_min_secs),
        delay_max_secs: args.delay_max.unwrap_or(base.delay_max_secs),
        timeout_secs: args.timeout.unwrap_or(base.timeout_secs),
        max_retries: args.retries.unwrap_or(base.max_retries),
        ..base
    }
    .normalized()
}

fn build_job(args: &Args, file: Option<&ConfigFile>, url: String) -> DownloadJob {
    let credential = args
        .cookie
        .clone()
        .or_else(|| file.and_then(|c| c.cookie.clone()))
        .unwrap_or_default();
    let output_dir = args
        .output
        .clone()
        .or_else(|| file.and_then(|c| c.output_dir.clone()))
        .unwrap_or_else(default_output_dir);
    DownloadJob {
        url,
        credential: credential.trim().to_string(),
        output_dir,
        config: effective_config(args, file),
    }
}

fn build_fetcher(
    args: &Args,
    file: Option<&ConfigFile>,
    job: &DownloadJob,
) -> Result<YuqueFetcher, CliRunError> {
    let mut builder = SessionClient::builder()
        .credential(job.credential.as_str())
        .timeout_secs(job.config.timeout_secs);
    if let Some(ua) = args
        .user_agent
        .clone()
        .or_else(|| file.and_then(|c| c.user_agent.clone()))
    {
        builder = builder.user_agent(ua);
    }
    let client = builder.build().map_err(|e| match e {
        FetchError::InvalidCredential { .. } => CliRunError::InvalidInput(e.to_string()),
        other => CliRunError::Export(other.into()),
    })?;

    let fetcher = YuqueFetcher::new(client);
    Ok(match file.and_then(|c| c.api_base.clone()) {
        Some(base) => fetcher.with_api_base(base),
        None => fetcher,
    })
}

/// Attempts from the job, backoff from the config file when it sets one.
fn retry_policy(file: Option<&ConfigFile>, job: &DownloadJob) -> RetryPolicy {
    let policy = RetryPolicy::default().with_attempts(job.config.max_retries);
    match file.and_then(|c| c.retry_backoff_secs.clone()) {
        Some(backoff) => policy.with_backoff_secs(backoff),
        None => policy,
    }
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and message on failure.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    let url = validate_book_url(&args.url).map_err(url_error)?;
    let file = config::load_config().map_err(CliRunError::InvalidInput)?;
    let job = build_job(args, file.as_ref(), url.to_string());
    let fetcher = build_fetcher(args, file.as_ref(), &job)?;
    let retry = retry_policy(file.as_ref(), &job);
    let cancel = CancellationToken::new();

    if args.dry_run {
        let source = Retrying::new(&fetcher, &retry, &cancel);
        let plan = plan_book(&source, &job.url).map_err(ExportError::from)?;
        eprintln!("Title: {}", plan.display_title);
        eprintln!("Nodes: {}", plan.node_count());
        eprintln!("Output: {}", book_dir(&job, &plan).display());
        return Ok(());
    }

    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        warn!(error = %e, "could not install Ctrl-C handler");
    }

    let progress_state: RefCell<Option<indicatif::ProgressBar>> = RefCell::new(None);
    let progress_cb = |snapshot: ProgressSnapshot| {
        if args.quiet || snapshot.total_docs == 0 {
            return;
        }
        let mut state = progress_state.borrow_mut();
        let pb = state.get_or_insert_with(|| {
            let bar = indicatif::ProgressBar::new(snapshot.total_docs as u64);
            if let Ok(style) = indicatif::ProgressStyle::default_bar()
                .template("{spinner} {msg} [{bar:40}] {pos}/{len} ({elapsed})")
            {
                bar.set_style(
                    style
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                        .progress_chars("█▉▊▋▌▍▎▏ "),
                );
            }
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        });
        pb.set_position(snapshot.finished_docs as u64);
        pb.set_message(snapshot.current_doc);
    };

    let output_dir = job.output_dir.clone();
    let result = Crawler::new(&fetcher, RandomDelay::new())
        .with_retry_policy(retry)
        .run(job, &progress_cb, &cancel);

    if let Some(pb) = progress_state.borrow_mut().take() {
        pb.disable_steady_tick();
        pb.finish_and_clear();
    }

    match result {
        Ok(snapshot) => {
            if !args.quiet {
                eprintln!(
                    "{}: {} of {} nodes exported from \"{}\" into {}",
                    snapshot.status,
                    snapshot.finished_docs,
                    snapshot.total_docs,
                    snapshot.book_title,
                    output_dir.display()
                );
            }
            Ok(())
        }
        Err(ExportError::Cancelled) => Err(CliRunError::Cancelled),
        Err(e) => Err(e.into()),
    }
}
