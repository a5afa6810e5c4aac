// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use docstore::{DocumentId, Fingerprint};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use wax::{Glob, Pattern};

/// Input-relative paths touched since the previous run.
///
/// Paths are normalized to `/` separators so they compare equal to
/// [`DocumentId`]s of source documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    paths: BTreeSet<String>,
}

impl ChangeSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut set = Self::new();
        for path in paths {
            set.insert(path);
        }
        set
    }

    /// Paths whose fingerprint differs between two snapshots, including
    /// additions and removals.
    #[must_use]
    pub fn between(
        previous: &BTreeMap<DocumentId, Fingerprint>,
        current: &BTreeMap<DocumentId, Fingerprint>,
    ) -> Self {
        let mut set = Self::new();
        for (id, fp) in current {
            if previous.get(id) != Some(fp) {
                set.paths.insert(id.as_str().to_string());
            }
        }
        for id in previous.keys() {
            if !current.contains_key(id) {
                set.paths.insert(id.as_str().to_string());
            }
        }
        set
    }

    pub fn insert<P: AsRef<Path>>(&mut self, path: P) {
        let id = DocumentId::from_relative_path(path);
        if !id.as_str().is_empty() {
            self.paths.insert(id.as_str().to_string());
        }
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    /// True when any path matches any of the glob patterns. Patterns that
    /// do not compile match nothing; the graph rejects them up front.
    #[must_use]
    pub fn touches(&self, patterns: &[String]) -> bool {
        let globs: Vec<Glob<'_>> = patterns
            .iter()
            .filter_map(|p| Glob::new(p).ok())
            .collect();
        self.paths
            .iter()
            .any(|path| globs.iter().any(|glob| glob.is_match(path.as_str())))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalizes_paths() {
        let set = ChangeSet::from_paths(["./posts/a.md", "images/logo.png"]);
        assert!(set.contains("posts/a.md"));
        assert!(set.contains("images/logo.png"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_touches_globs() {
        let set = ChangeSet::from_paths(["posts/a.md"]);
        assert!(set.touches(&["**/*.md".to_string()]));
        assert!(!set.touches(&["**/*.png".to_string()]));
        assert!(!set.touches(&[]));
    }

    #[test]
    fn test_between_snapshots() {
        let fp = |s: &str| Fingerprint::of_bytes(s.as_bytes());
        let previous = BTreeMap::from([
            (DocumentId::new("a.md"), fp("a")),
            (DocumentId::new("b.md"), fp("b")),
            (DocumentId::new("gone.md"), fp("g")),
        ]);
        let current = BTreeMap::from([
            (DocumentId::new("a.md"), fp("a")),
            (DocumentId::new("b.md"), fp("b2")),
            (DocumentId::new("new.md"), fp("n")),
        ]);
        let set = ChangeSet::between(&previous, &current);
        let changes: Vec<&str> = set.iter().collect();
        assert_eq!(changes, vec!["b.md", "gone.md", "new.md"]);
    }
}
