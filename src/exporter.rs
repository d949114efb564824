//! Single-document export: fetch markdown, localize remote images, write `<title>.md`.

use crate::error::ExportError;
use crate::fetcher::RemoteSource;
use crate::sanitize::sanitize_name;
use regex::{Captures, Regex};
use reqwest::Url;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Directory, next to each document, that receives its downloaded images.
pub const ASSETS_DIR: &str = "assets";
const DEFAULT_IMAGE_EXT: &str = ".png";

static RE_IMAGE: OnceLock<Regex> = OnceLock::new();

/// `![alt](url "optional title")`
fn re_image() -> &'static Regex {
    RE_IMAGE.get_or_init(|| {
        Regex::new(r#"!\[(.*?)\]\(\s*((?:[^()\s]|\([^()\s]*\))+)(\s+"[^"]*")?\s*\)"#)
            .expect("compile RE_IMAGE")
    })
}

/// Join a `/`-separated relative path onto `root`. Empty, `.` and `..` segments are dropped,
/// so the result never leaves `root`.
pub(crate) fn join_relative(root: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .filter(|segment| !matches!(*segment, "" | "." | ".."))
        .fold(root.to_path_buf(), |path, segment| path.join(segment))
}

/// File name a document title is written to.
pub fn document_file_name(title: &str) -> String {
    format!("{}.md", sanitize_name(title))
}

/// Extension (with dot) of the URL's last path segment; `.png` when there is no usable one.
/// Query and fragment never contribute.
pub fn image_extension(url: &str) -> String {
    let last_segment = Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .unwrap_or_default();
    match last_segment.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && (1..=5).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            format!(".{}", ext.to_ascii_lowercase())
        }
        _ => DEFAULT_IMAGE_EXT.to_string(),
    }
}

fn is_remote(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Writes documents below one book folder.
pub struct DocumentExporter<'a, S: RemoteSource + ?Sized> {
    source: &'a S,
    output_root: PathBuf,
}

impl<'a, S: RemoteSource + ?Sized> DocumentExporter<'a, S> {
    pub fn new(source: &'a S, output_root: impl Into<PathBuf>) -> Self {
        Self {
            source,
            output_root: output_root.into(),
        }
    }

    /// Fetch one document and write it to `<root>/<parent_path>/<title>.md`.
    ///
    /// Fetch and write failures are returned; individual image failures only keep the
    /// remote link. Returns the written path.
    pub fn export_document(
        &self,
        book_id: u64,
        content_id: &str,
        title: &str,
        parent_path: &str,
    ) -> Result<PathBuf, ExportError> {
        let content = self.source.fetch_document(book_id, content_id)?;

        let doc_dir = join_relative(&self.output_root, parent_path);
        std::fs::create_dir_all(&doc_dir).map_err(|e| ExportError::filesystem(&doc_dir, e))?;
        let file_path = doc_dir.join(document_file_name(title));

        let markdown = self.localize_images(&content.source, &doc_dir);

        std::fs::write(&file_path, markdown).map_err(|e| ExportError::filesystem(&file_path, e))?;
        debug!(path = %file_path.display(), "wrote document");
        Ok(file_path)
    }

    /// Download every remote image referenced in `markdown` into `<doc_dir>/assets` and
    /// point the references at the local copies.
    pub fn localize_images(&self, markdown: &str, doc_dir: &Path) -> String {
        let assets_dir = doc_dir.join(ASSETS_DIR);
        let mut used_names = HashSet::new();
        re_image()
            .replace_all(markdown, |caps: &Captures<'_>| {
                let original = caps[0].to_string();
                let url = &caps[2];
                if !is_remote(url) {
                    return original;
                }
                match self.store_image(url, &assets_dir, &mut used_names) {
                    Ok(name) => format!("![{}](./{}/{})", &caps[1], ASSETS_DIR, name),
                    Err(e) => {
                        warn!(url, error = %e, "image not stored; keeping remote link");
                        original
                    }
                }
            })
            .into_owned()
    }

    fn store_image(
        &self,
        url: &str,
        assets_dir: &Path,
        used_names: &mut HashSet<String>,
    ) -> Result<String, ExportError> {
        let url = url.split('#').next().unwrap_or(url);
        let bytes = self.source.download_asset(url)?;

        std::fs::create_dir_all(assets_dir).map_err(|e| ExportError::filesystem(assets_dir, e))?;
        let name = unique_asset_name(now_millis(), &image_extension(url), assets_dir, used_names);
        let path = assets_dir.join(&name);
        std::fs::write(&path, bytes).map_err(|e| ExportError::filesystem(&path, e))?;
        Ok(name)
    }
}

/// `image-<millis><ext>`, with a `-<n>` counter when the name is taken in this document
/// or already on disk.
fn unique_asset_name(
    millis: i64,
    ext: &str,
    assets_dir: &Path,
    used_names: &mut HashSet<String>,
) -> String {
    let mut counter = 0u32;
    loop {
        let candidate = if counter == 0 {
            sanitize_name(&format!("image-{}{}", millis, ext))
        } else {
            sanitize_name(&format!("image-{}-{}{}", millis, counter, ext))
        };
        if !used_names.contains(&candidate) && !assets_dir.join(&candidate).exists() {
            used_names.insert(candidate.clone());
            return candidate;
        }
        counter += 1;
    }
}
