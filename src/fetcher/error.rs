//! Shared error type for the fetch layer: URL validation, transport, status, and payload decoding.

use thiserror::Error;

/// Errors raised while talking to the remote knowledge-base service.
#[derive(Debug, Error)]
pub enum FetchError {
    // Source URL
    #[error("Invalid URL: {input}: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("Unsupported host '{host}'. Expected a yuque.com knowledge-base URL.")]
    UnrecognizedHost { host: String },

    // Client setup
    #[error("Credential cannot be sent as a request header: {reason}")]
    InvalidCredential { reason: String },

    #[error("Failed to create HTTP client: {source}")]
    Client { source: reqwest::Error },

    // Transport and status
    #[error("Network error: could not reach {url}: {source}")]
    Network { url: String, source: reqwest::Error },

    #[error("HTTP {status} when fetching: {url}")]
    HttpStatus {
        status: u16,
        url: String,
        /// Optional context (e.g. "book page", "document intro") for programmatic use.
        context: Option<String>,
    },

    // Payload
    #[error("Embedded book data not found in page: {url}")]
    Extraction { url: String },

    #[error("Could not parse {context}: {reason}")]
    Parse { context: String, reason: String },
}

impl FetchError {
    /// Status code for [`FetchError::HttpStatus`], `None` for everything else.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Worth another attempt: timeouts, connection failures, 5xx, and 429.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Network { source, .. } => source.is_timeout() || source.is_connect(),
            FetchError::HttpStatus { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(429)
    }
}
