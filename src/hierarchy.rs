//! Rebuilds directory paths from the flat, parent-linked TOC.
//!
//! The TOC stays an ordered list; every tree operation is a lookup by node id.
//! Paths use `/` as separator and grouping paths always end with one.

use crate::model::TocNode;
use crate::sanitize::sanitize_name;
use std::collections::{HashMap, HashSet};

/// Resolved directory paths of the grouping nodes of one book, keyed by node id.
#[derive(Debug, Clone, Default)]
pub struct PathMap {
    dirs: HashMap<String, String>,
}

impl PathMap {
    /// Resolve every grouping node's path in one pass over `toc`.
    pub fn resolve(toc: &[TocNode]) -> Self {
        let index: HashMap<&str, &TocNode> = toc.iter().map(|n| (n.uuid.as_str(), n)).collect();
        let dirs = toc
            .iter()
            .filter(|node| node.is_grouping())
            .map(|node| (node.uuid.clone(), node_path(node, &index)))
            .collect();
        Self { dirs }
    }

    /// Directory of a grouping node, with trailing `/`. `None` for leaves and unknown ids.
    pub fn dir(&self, uuid: &str) -> Option<&str> {
        self.dirs.get(uuid).map(String::as_str)
    }

    /// Directory a node's own file lives in: its parent's path, or `""` (book root)
    /// when the parent is empty, unknown, or not a grouping node.
    pub fn parent_dir(&self, node: &TocNode) -> &str {
        if node.parent_uuid.is_empty() {
            return "";
        }
        self.dir(&node.parent_uuid).unwrap_or("")
    }
}

/// Number of segments in a resolved path (`"A/B/"` → 2, `""` → 0).
pub fn path_depth(path: &str) -> usize {
    path.split('/').filter(|s| !s.is_empty()).count()
}

/// Walk parent links up to a root. A missing parent ends the walk as if it were the root;
/// revisiting a node (self-parent or cycle) ends it too.
fn node_path(node: &TocNode, index: &HashMap<&str, &TocNode>) -> String {
    let mut parts = vec![sanitize_name(&node.title)];
    let mut seen: HashSet<&str> = HashSet::from([node.uuid.as_str()]);
    let mut current = node;
    while !current.parent_uuid.is_empty() {
        let Some(parent) = index.get(current.parent_uuid.as_str()) else {
            break;
        };
        if !seen.insert(parent.uuid.as_str()) {
            break;
        }
        parts.push(sanitize_name(&parent.title));
        current = parent;
    }
    parts.reverse();
    let mut path = parts.join("/");
    path.push('/');
    path
}
