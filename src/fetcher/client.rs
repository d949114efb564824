//! Blocking HTTP client that attaches the session credential to every request.

use crate::fetcher::error::FetchError;
use reqwest::header::{HeaderValue, COOKIE};
use std::time::Duration;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; yuque-export/0.1)";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_REDIRECTS: usize = 10;

/// Blocking HTTP client carrying the session credential.
///
/// Every call is a single attempt; retrying is up to the caller.
#[derive(Debug)]
pub struct SessionClient {
    inner: reqwest::blocking::Client,
    credential: Option<HeaderValue>,
}

impl SessionClient {
    /// Build an unauthenticated client with default User-Agent and timeout.
    pub fn new() -> Result<Self, FetchError> {
        Self::builder().build()
    }

    pub fn builder() -> SessionClientBuilder {
        SessionClientBuilder::default()
    }

    /// Perform one GET request. Any status comes back as a response for the caller to inspect.
    pub fn get(&self, url: &str) -> Result<reqwest::blocking::Response, reqwest::Error> {
        let mut request = self.inner.get(url);
        if let Some(credential) = &self.credential {
            request = request.header(COOKIE, credential.clone());
        }
        request.send()
    }
}

/// Builder for SessionClient with optional credential, User-Agent, and timeout.
#[derive(Debug)]
pub struct SessionClientBuilder {
    credential: String,
    user_agent: Option<String>,
    timeout_secs: u64,
}

impl Default for SessionClientBuilder {
    fn default() -> Self {
        Self {
            credential: String::new(),
            user_agent: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl SessionClientBuilder {
    /// Session credential sent verbatim as the `Cookie` header. Empty means unauthenticated.
    pub fn credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = credential.into();
        self
    }

    /// Set a custom User-Agent. If not set, a browser-like default is used.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Set request timeout in seconds. Zero falls back to the default of 30.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = if secs == 0 { DEFAULT_TIMEOUT_SECS } else { secs };
        self
    }

    pub fn build(self) -> Result<SessionClient, FetchError> {
        let credential = if self.credential.is_empty() {
            None
        } else {
            let mut value = HeaderValue::from_str(&self.credential).map_err(|e| {
                FetchError::InvalidCredential {
                    reason: e.to_string(),
                }
            })?;
            value.set_sensitive(true);
            Some(value)
        };
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let inner = reqwest::blocking::Client::builder()
            .cookie_store(true)
            .user_agent(user_agent)
            .timeout(Duration::from_secs(self.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|source| FetchError::Client { source })?;
        Ok(SessionClient { inner, credential })
    }
}
