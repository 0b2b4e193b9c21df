//! Path existence checking against the indexed commit
//!
//! Indexers routinely emit documents for generated files and uncommitted
//! dependencies. Before writing the bundle, every document path is checked
//! against the revision-control tree at the indexed commit: a minimal
//! directory tree is built from the dump's paths, each tree level is
//! resolved with one batched `list_directory` call, and membership lookups
//! afterwards are O(1).

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::convert::CancelFlag;
use crate::error::Result;

/// The narrow directory-listing contract the existence checker consumes.
/// Implementations resolve a batch of directory names to the entries that
/// actually exist at the given commit; entries are full paths relative to
/// the repository root, one level deep.
pub trait RevisionControl {
    fn list_directory(
        &self,
        commit: &str,
        dirnames: &[String],
    ) -> Result<BTreeMap<String, Vec<String>>>;
}

/// Answers whether a dump-relative path exists at the indexed commit.
pub struct ExistenceChecker {
    root: String,
    directory_contents: BTreeMap<String, BTreeSet<String>>,
}

impl ExistenceChecker {
    /// Build a checker for the given document paths. Performs one
    /// `list_directory` round-trip per level of the directory tree spanned
    /// by the paths.
    pub fn new(
        root: &str,
        paths: &[String],
        commit: &str,
        revision_control: &dyn RevisionControl,
        cancel: &CancelFlag,
    ) -> Result<ExistenceChecker> {
        let root = root.trim_end_matches('/').to_string();
        let tree = FileTree::new(&root, paths);

        let mut directory_contents: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut frontier: Vec<(String, &TreeNode)> = vec![(String::new(), &tree.root)];

        while !frontier.is_empty() {
            cancel.check()?;

            let dirnames: Vec<String> = frontier.iter().map(|(path, _)| path.clone()).collect();
            debug!(batch = dirnames.len(), "listing directories");

            let listings = revision_control.list_directory(commit, &dirnames)?;
            for (dirname, entries) in listings {
                directory_contents
                    .entry(dirname)
                    .or_default()
                    .extend(entries);
            }

            let mut next_frontier = Vec::new();
            for (path, node) in frontier {
                // Do not descend into directories the listing reported
                // missing or empty; none of their files can exist.
                let exists = directory_contents
                    .get(&path)
                    .is_some_and(|entries| !entries.is_empty());
                if !exists {
                    continue;
                }

                for (segment, child) in &node.children {
                    next_frontier.push((join(&path, segment), child));
                }
            }
            frontier = next_frontier;
        }

        Ok(ExistenceChecker {
            root,
            directory_contents,
        })
    }

    /// Whether the dump-relative `path` exists at the indexed commit. Paths
    /// escaping the dump root never exist.
    pub fn should_include(&self, path: &str) -> bool {
        let full = join(&self.root, path);
        if full.starts_with("..") {
            return false;
        }

        self.directory_contents
            .get(dirname(&full))
            .is_some_and(|entries| entries.contains(&full))
    }
}

/// A minimal directory tree whose nodes are path segments. Only directories
/// that (transitively) hold a document path appear in the tree.
struct FileTree {
    root: TreeNode,
}

#[derive(Default)]
struct TreeNode {
    children: BTreeMap<String, TreeNode>,
}

impl FileTree {
    fn new(root: &str, paths: &[String]) -> FileTree {
        let mut directories: BTreeSet<String> = BTreeSet::new();
        for path in paths {
            let full = join(root, path);
            if full.starts_with("..") {
                continue;
            }
            directories.insert(dirname(&full).to_string());
        }

        let mut root_node = TreeNode::default();
        for directory in directories {
            if directory.is_empty() {
                continue;
            }

            let mut node = &mut root_node;
            for segment in directory.split('/') {
                node = node.children.entry(segment.to_string()).or_default();
            }
        }

        FileTree { root: root_node }
    }
}

/// Join two relative paths with a separator, tolerating empty components.
fn join(base: &str, path: &str) -> String {
    if base.is_empty() {
        path.to_string()
    } else if path.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, path)
    }
}

/// The directory portion of a relative path; empty for top-level entries.
fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        Some(index) => &path[..index],
        None => "",
    }
}
