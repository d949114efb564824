//! `SUMMARY.md` builder. Entries are appended in TOC order as the crawl progresses.

use crate::exporter::document_file_name;
use crate::hierarchy::path_depth;

pub const SUMMARY_FILE: &str = "SUMMARY.md";

const INDENT: &str = "  ";

#[derive(Debug, Default, Clone)]
pub struct Summary {
    text: String,
}

impl Summary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Heading for a top-level group, nested bullet below that.
    pub fn push_group(&mut self, dir: &str) {
        let trimmed = dir.trim_end_matches('/');
        let depth = path_depth(dir);
        if depth <= 1 {
            self.text.push_str(&format!("## {}\n", trimmed));
        } else {
            let name = trimmed.rsplit('/').next().unwrap_or(trimmed);
            self.text
                .push_str(&format!("{}* {}\n", INDENT.repeat(depth - 1), name));
        }
    }

    /// Link to a written document, indented one level per parent directory.
    pub fn push_document(&mut self, title: &str, parent_dir: &str) {
        let depth = path_depth(parent_dir);
        self.text.push_str(&format!(
            "{}* [{}]({})\n",
            INDENT.repeat(depth),
            title,
            document_link(title, parent_dir)
        ));
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

/// Relative link to a document file with every path segment percent-encoded.
pub fn document_link(title: &str, parent_dir: &str) -> String {
    let file_name = document_file_name(title);
    parent_dir
        .split('/')
        .filter(|s| !s.is_empty())
        .chain(std::iter::once(file_name.as_str()))
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_and_documents_follow_nesting() {
        let mut summary = Summary::new();
        summary.push_group("Guide/");
        summary.push_document("Install", "Guide/");
        summary.push_group("Guide/Advanced/");
        summary.push_document("Tuning", "Guide/Advanced/");
        summary.push_document("FAQ", "");
        assert_eq!(
            summary.as_str(),
            "## Guide\n  * [Install](Guide/Install.md)\n  * Advanced\n    * [Tuning](Guide/Advanced/Tuning.md)\n* [FAQ](FAQ.md)\n"
        );
    }

    #[test]
    fn link_segments_are_percent_encoded() {
        assert_eq!(
            document_link("Q&A: intro", "My Guide/"),
            "My%20Guide/Q%26A_%20intro.md"
        );
        assert_eq!(document_link("入门", ""), "%E5%85%A5%E9%97%A8.md");
    }

    #[test]
    fn empty_summary_is_empty_text() {
        assert_eq!(Summary::new().as_str(), "");
    }
}
