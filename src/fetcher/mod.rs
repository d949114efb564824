//! Remote access: URL validation, the source trait, the shared client, and the Yuque implementation.

mod client;
mod error;

pub mod yuque;

pub use client::{SessionClient, SessionClientBuilder};
pub use error::FetchError;
pub use yuque::YuqueFetcher;

use crate::model::{Book, DocumentContent};
use reqwest::Url;

/// Network operations the exporter and crawler need. Knows nothing about the filesystem.
///
/// [`YuqueFetcher`] is the real implementation; tests substitute in-memory sources.
pub trait RemoteSource {
    /// Page title of the book page, cleaned up for use as a fallback folder name.
    fn fetch_book_title(&self, url: &str) -> Result<String, FetchError>;

    /// Book metadata and TOC embedded in the book page.
    fn fetch_book_data(&self, url: &str) -> Result<Book, FetchError>;

    /// Markdown source of one document.
    fn fetch_document(&self, book_id: u64, slug: &str) -> Result<DocumentContent, FetchError>;

    /// Raw bytes from an arbitrary, possibly cross-origin, URL.
    fn download_asset(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Strip known site suffix from the end of a page title (e.g. " · 语雀")
/// so that titles containing the separator in the actual title are preserved.
pub fn strip_title_site_suffix(s: &str, suffixes: &[&str]) -> String {
    let mut t = s.trim();
    for suffix in suffixes {
        if let Some(stripped) = t.strip_suffix(suffix) {
            t = stripped.trim();
            break;
        }
    }
    t.to_string()
}

/// Accept only absolute http(s) URLs on yuque.com or one of its subdomains.
pub fn validate_book_url(url_input: &str) -> Result<Url, FetchError> {
    let url = Url::parse(url_input.trim()).map_err(|e| FetchError::InvalidUrl {
        input: url_input.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(FetchError::InvalidUrl {
            input: url_input.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    let host = url.host_str().ok_or_else(|| FetchError::InvalidUrl {
        input: url_input.to_string(),
        reason: "URL has no host".to_string(),
    })?;
    if host == "yuque.com" || host.ends_with(".yuque.com") {
        Ok(url)
    } else {
        Err(FetchError::UnrecognizedHost {
            host: host.to_string(),
        })
    }
}
