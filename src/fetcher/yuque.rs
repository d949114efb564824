//! Yuque implementation of [`RemoteSource`]: book page title, embedded book payload,
//! markdown content API, and raw asset downloads.

use crate::fetcher::{strip_title_site_suffix, FetchError, RemoteSource, SessionClient};
use crate::model::{Book, DocResponse, DocumentContent, PageData};
use crate::sanitize::sanitize_title;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;
use tracing::debug;

pub const DEFAULT_API_BASE: &str = "https://www.yuque.com";

const SITE_SUFFIXES: &[&str] = &[" · 语雀"];

static RE_PAYLOAD: OnceLock<Regex> = OnceLock::new();
static RE_USER_BOOK: OnceLock<Regex> = OnceLock::new();

fn re_payload() -> &'static Regex {
    RE_PAYLOAD.get_or_init(|| {
        Regex::new(r#"decodeURIComponent\("(.+?)"\)\);"#).expect("compile RE_PAYLOAD")
    })
}

fn re_user_book() -> &'static Regex {
    RE_USER_BOOK.get_or_init(|| Regex::new(r"u\d+/([\w-]+)").expect("compile RE_USER_BOOK"))
}

/// Fetcher bound to one session credential.
#[derive(Debug)]
pub struct YuqueFetcher {
    client: SessionClient,
    api_base: String,
}

impl YuqueFetcher {
    pub fn new(client: SessionClient) -> Self {
        Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Point the content API somewhere else (mirrors, local test servers).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn send(&self, url: &str) -> Result<reqwest::blocking::Response, FetchError> {
        debug!(url, "GET");
        self.client.get(url).map_err(|e| FetchError::Network {
            url: url.to_string(),
            source: e,
        })
    }

    fn get_text(&self, url: &str, context: &str) -> Result<String, FetchError> {
        let response = self.send(url)?;
        check_response(response, url, Some(context))
    }
}

/// Check response status and read body as UTF-8. Returns body or FetchError.
fn check_response(
    response: reqwest::blocking::Response,
    url: &str,
    context: Option<&str>,
) -> Result<String, FetchError> {
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
            context: context.map(String::from),
        });
    }
    response.text().map_err(|e| FetchError::Network {
        url: url.to_string(),
        source: e,
    })
}

/// Text of the page `<title>`, trimmed. Empty when the page has none.
fn parse_page_title(html: &str) -> Result<String, FetchError> {
    let selector = Selector::parse("title").map_err(|e| FetchError::Parse {
        context: "title selector".to_string(),
        reason: e.to_string(),
    })?;
    let doc = Html::parse_document(html);
    Ok(doc
        .select(&selector)
        .next()
        .map(|e| e.text().collect::<String>().trim().to_string())
        .unwrap_or_default())
}

/// Strip the site suffix, replace unsafe characters, and prefix the book slug found in
/// `/u<digits>/<slug>` URLs.
fn book_title_from_page(url: &str, page_title: &str) -> String {
    let title = sanitize_title(&strip_title_site_suffix(page_title, SITE_SUFFIXES));
    match re_user_book().captures(url).and_then(|c| c.get(1)) {
        Some(slug) => format!("{}-{}", slug.as_str(), title),
        None => title,
    }
}

/// Locate the percent-encoded JSON blob in the book page and decode it.
fn extract_book_data(html: &str, url: &str) -> Result<Book, FetchError> {
    let encoded = re_payload()
        .captures(html)
        .and_then(|c| c.get(1))
        .ok_or_else(|| FetchError::Extraction {
            url: url.to_string(),
        })?;
    let decoded = urlencoding::decode(encoded.as_str()).map_err(|e| FetchError::Parse {
        context: "embedded book data".to_string(),
        reason: e.to_string(),
    })?;
    let page: PageData = serde_json::from_str(&decoded).map_err(|e| FetchError::Parse {
        context: "embedded book data".to_string(),
        reason: e.to_string(),
    })?;
    Ok(page.book)
}

fn document_api_url(api_base: &str, book_id: u64, slug: &str) -> String {
    format!(
        "{}/api/docs/{}?book_id={}&merge_dynamic_data=false&mode=markdown",
        api_base,
        urlencoding::encode(slug),
        book_id
    )
}

impl RemoteSource for YuqueFetcher {
    fn fetch_book_title(&self, url: &str) -> Result<String, FetchError> {
        let html = self.get_text(url, "book page")?;
        let page_title = parse_page_title(&html)?;
        Ok(book_title_from_page(url, &page_title))
    }

    fn fetch_book_data(&self, url: &str) -> Result<Book, FetchError> {
        let html = self.get_text(url, "book page")?;
        extract_book_data(&html, url)
    }

    fn fetch_document(&self, book_id: u64, slug: &str) -> Result<DocumentContent, FetchError> {
        let api_url = document_api_url(&self.api_base, book_id, slug);
        let body = self.get_text(&api_url, &format!("document {}", slug))?;
        let resp: DocResponse = serde_json::from_str(&body).map_err(|e| FetchError::Parse {
            context: format!("document {}", slug),
            reason: e.to_string(),
        })?;
        Ok(resp.data)
    }

    fn download_asset(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.send(url)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
                context: Some("asset".to_string()),
            });
        }
        let bytes = response.bytes().map_err(|e| FetchError::Network {
            url: url.to_string(),
            source: e,
        })?;
        Ok(bytes.to_vec())
    }
}
