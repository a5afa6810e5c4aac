// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Materializes documents into the output tree.
//!
//! Every file is replaced atomically: bytes go to a temporary file in the
//! destination directory, which is synced and then renamed over the target.
//! A crash mid-write leaves either the old file or the new one, never a
//! truncated one.

use crate::error::{Error, Result};
use diagnostics::*;
use docstore::Document;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use wax::Glob;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteMode {
    /// Leave files from earlier runs alone.
    #[default]
    Preserve,
    /// Delete files under the root that this run did not produce.
    Clean,
}

#[derive(Debug, Default)]
pub struct WriteReport {
    /// Relative paths whose bytes were (re)written.
    pub written: Vec<PathBuf>,
    /// Files whose existing bytes already matched.
    pub unchanged: usize,
    /// Relative paths deleted in clean mode.
    pub removed: Vec<PathBuf>,
    /// Per-file failures; other files were still written.
    pub errors: Vec<Error>,
}

impl WriteReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

pub struct OutputWriter {
    root: PathBuf,
    mode: WriteMode,
    keep: Vec<PathBuf>,
}

impl OutputWriter {
    pub fn new<P: AsRef<Path>>(root: P, mode: WriteMode) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            mode,
            keep: Vec::new(),
        }
    }

    /// Exempt a relative path (file or directory) from clean-mode deletion.
    #[must_use]
    pub fn preserving<P: AsRef<Path>>(mut self, relative: P) -> Self {
        self.keep.push(relative.as_ref().to_path_buf());
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    /// Write every document that has a destination.
    ///
    /// Returns `Err` only when the root itself cannot be created. Failures
    /// of individual files are collected in the report.
    pub fn write(&self, documents: &[Arc<Document>]) -> Result<WriteReport> {
        std::fs::create_dir_all(&self.root).map_err(|e| Error::io(&self.root, e))?;

        let mut report = WriteReport::default();
        let mut planned: BTreeMap<PathBuf, &Document> = BTreeMap::new();

        for doc in documents {
            let Some(destination) = doc.destination() else {
                continue;
            };
            let Some(relative) = safe_relative(destination) else {
                let id = doc.id().to_string();
                let dest = destination.display().to_string();
                error!("Document {id} has destination {dest} outside the output root");
                report.errors.push(Error::io(
                    destination,
                    io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "destination escapes the output root",
                    ),
                ));
                continue;
            };
            if let Some(previous) = planned.insert(relative.clone(), doc) {
                let dest = relative.display().to_string();
                let replaced = previous.id().to_string();
                let kept = doc.id().to_string();
                warn!("Document {kept} replaces {replaced} at {dest}");
            }
        }

        for (relative, doc) in &planned {
            let path = self.root.join(relative);
            let bytes = doc.content().as_bytes();

            if std::fs::read(&path).is_ok_and(|existing| existing == bytes) {
                report.unchanged += 1;
                continue;
            }

            match write_file(&path, bytes) {
                Ok(()) => {
                    let dest = relative.display().to_string();
                    debug!("Wrote {dest}");
                    report.written.push(relative.clone());
                }
                Err(e) => {
                    let dest = path.display().to_string();
                    let err = e.to_string();
                    error!("Failed to write {dest}: {err: err.as_str()}");
                    report.errors.push(Error::io(&path, e));
                }
            }
        }

        if self.mode == WriteMode::Clean {
            let produced: BTreeSet<&PathBuf> = planned.keys().collect();
            self.sweep(&produced, &mut report)?;
        }

        let written = report.written.len();
        let unchanged = report.unchanged;
        let removed = report.removed.len();
        let root = self.root.display().to_string();
        info!("Output {root}: {written} written, {unchanged} unchanged, {removed} removed");

        Ok(report)
    }

    fn is_kept(&self, relative: &Path) -> bool {
        self.keep.iter().any(|keep| relative.starts_with(keep))
    }

    /// Delete files that were not produced this run, then any directories
    /// left empty.
    fn sweep(&self, produced: &BTreeSet<&PathBuf>, report: &mut WriteReport) -> Result<()> {
        let glob =
            Glob::new("**").map_err(|e| Error::io(&self.root, io::Error::other(e.to_string())))?;
        let mut directories = Vec::new();

        for entry in glob.walk(&self.root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    report
                        .errors
                        .push(Error::io(&self.root, io::Error::other(e.to_string())));
                    continue;
                }
            };
            let path = entry.path();
            let Ok(relative) = path.strip_prefix(&self.root) else {
                continue;
            };
            if relative.as_os_str().is_empty() || self.is_kept(relative) {
                continue;
            }
            let relative = relative.to_path_buf();

            if path.is_dir() {
                directories.push(path.to_path_buf());
                continue;
            }
            if produced.contains(&relative) {
                continue;
            }
            match std::fs::remove_file(path) {
                Ok(()) => {
                    let stale = relative.display().to_string();
                    debug!("Removed stale {stale}");
                    report.removed.push(relative);
                }
                Err(e) => report.errors.push(Error::io(path, e)),
            }
        }

        // Deepest first so parents empty out after their children.
        directories.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
        for dir in directories {
            let empty = std::fs::read_dir(&dir).is_ok_and(|mut entries| entries.next().is_none());
            if empty {
                if let Err(e) = std::fs::remove_dir(&dir) {
                    report.errors.push(Error::io(&dir, e));
                }
            }
        }
        Ok(())
    }
}

/// Relative destination confined to the output root, or `None` when it is
/// absolute or climbs out with `..`.
fn safe_relative(destination: &Path) -> Option<PathBuf> {
    let mut relative = PathBuf::new();
    for component in destination.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (!relative.as_os_str().is_empty()).then_some(relative)
}

fn write_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    write_atomic(path, |file| file.write_all(bytes))
}

/// Replace `path` with whatever `fill` writes. If `fill` fails the temporary
/// file is removed and the previous contents stay in place.
pub(crate) fn write_atomic<F>(path: &Path, fill: F) -> io::Result<()>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    fill(tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn doc(id: &str, dest: &str, body: &str) -> Arc<Document> {
        Arc::new(Document::new(id, body).with_destination(dest))
    }

    fn files_under(root: &Path) -> Vec<String> {
        let mut files: Vec<String> = Glob::new("**")
            .expect("glob")
            .walk(root)
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .filter_map(|e| {
                e.path()
                    .strip_prefix(root)
                    .ok()
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
            })
            .collect();
        files.sort();
        files
    }

    #[test]
    fn test_writes_nested_destinations() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let writer = OutputWriter::new(dir.path(), WriteMode::Preserve);
        let report = writer.write(&[
            doc("index.md", "index.html", "<h1>Home</h1>"),
            doc("posts/a.md", "posts/a.html", "<h1>A</h1>"),
            Arc::new(Document::new("drafts/x.md", "no destination")),
        ])?;

        assert!(report.is_success());
        assert_eq!(report.written.len(), 2);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("posts/a.html"))?,
            "<h1>A</h1>"
        );
        assert_eq!(files_under(dir.path()), vec!["index.html", "posts/a.html"]);
        Ok(())
    }

    #[test]
    fn test_unchanged_files_are_not_rewritten() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let writer = OutputWriter::new(dir.path(), WriteMode::Preserve);
        let docs = [doc("a", "a.html", "same")];
        writer.write(&docs)?;
        let report = writer.write(&docs)?;
        assert!(report.written.is_empty());
        assert_eq!(report.unchanged, 1);
        Ok(())
    }

    #[test]
    fn test_preserve_mode_keeps_stale_files() -> anyhow::Result<()> {
        let dir = tempdir()?;
        std::fs::write(dir.path().join("old.html"), "stale")?;
        let writer = OutputWriter::new(dir.path(), WriteMode::Preserve);
        let report = writer.write(&[doc("a", "a.html", "new")])?;
        assert!(report.removed.is_empty());
        assert_eq!(files_under(dir.path()), vec!["a.html", "old.html"]);
        Ok(())
    }

    #[test]
    fn test_clean_mode_removes_stale_files_and_empty_dirs() -> anyhow::Result<()> {
        let dir = tempdir()?;
        std::fs::create_dir_all(dir.path().join("old/deep"))?;
        std::fs::write(dir.path().join("old/deep/gone.html"), "stale")?;
        std::fs::create_dir_all(dir.path().join(".cache"))?;
        std::fs::write(dir.path().join(".cache/state.json"), "{}")?;

        let writer = OutputWriter::new(dir.path(), WriteMode::Clean).preserving(".cache");
        let report = writer.write(&[doc("a", "a.html", "new")])?;

        assert_eq!(report.removed, vec![PathBuf::from("old/deep/gone.html")]);
        assert!(!dir.path().join("old").exists());
        assert_eq!(files_under(dir.path()), vec![".cache/state.json", "a.html"]);
        Ok(())
    }

    #[test]
    fn test_escaping_destination_is_rejected() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let writer = OutputWriter::new(dir.path().join("site"), WriteMode::Preserve);
        let report = writer.write(&[
            doc("evil", "../outside.html", "x"),
            doc("abs", "/etc/passwd", "x"),
            doc("ok", "ok.html", "fine"),
        ])?;
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.written, vec![PathBuf::from("ok.html")]);
        assert!(!dir.path().join("outside.html").exists());
        Ok(())
    }

    #[test]
    fn test_duplicate_destination_last_wins() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let writer = OutputWriter::new(dir.path(), WriteMode::Preserve);
        writer.write(&[doc("first", "x.html", "one"), doc("second", "x.html", "two")])?;
        assert_eq!(std::fs::read_to_string(dir.path().join("x.html"))?, "two");
        Ok(())
    }

    #[test]
    fn test_failed_write_leaves_previous_file_intact() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("page.html");
        std::fs::write(&path, "previous contents")?;

        let result = write_atomic(&path, |file| {
            file.write_all(b"partial")?;
            Err(io::Error::other("disk full"))
        });

        assert!(result.is_err());
        assert_eq!(std::fs::read_to_string(&path)?, "previous contents");
        assert_eq!(files_under(dir.path()), vec!["page.html"]);
        Ok(())
    }
}
