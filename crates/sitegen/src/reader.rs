// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Discovery of source files under the input root.

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use diagnostics::*;
use docstore::{Document, DocumentId, Fingerprint};
use pipeline::{StageContext, StageOutput, Transform};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use wax::{Glob, Pattern};

/// Input-relative path (with `/` separators) of every visible file under
/// `root`, sorted. Names starting with `_` or `.` hide the file, or the whole
/// directory.
pub fn discover(root: &Path) -> anyhow::Result<Vec<String>> {
    if !root.is_dir() {
        return Err(anyhow!("input directory {} does not exist", root.display()));
    }

    let mut found = Vec::new();
    for entry in Glob::new("**")?.walk(root) {
        let entry = entry.with_context(|| format!("walking {}", root.display()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        if is_hidden(relative) {
            continue;
        }
        let id = DocumentId::from_relative_path(relative);
        if !id.as_str().is_empty() {
            found.push(id.as_str().to_string());
        }
    }
    found.sort();
    Ok(found)
}

fn is_hidden(relative: &Path) -> bool {
    relative.components().any(|c| {
        let name = c.as_os_str().to_string_lossy();
        name.starts_with('_') || name.starts_with('.')
    })
}

/// Content fingerprint of every visible file, used by the watch loop to
/// compute change-sets.
pub fn snapshot(root: &Path) -> anyhow::Result<BTreeMap<DocumentId, Fingerprint>> {
    let mut snapshot = BTreeMap::new();
    for relative in discover(root)? {
        let path = root.join(&relative);
        match std::fs::read(&path) {
            Ok(bytes) => {
                snapshot.insert(DocumentId::new(relative), Fingerprint::of_bytes(&bytes));
            }
            // Deleted between discovery and read; the next poll sees it gone.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }
    Ok(snapshot)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadKind {
    /// UTF-8 pages; no destination until rendered.
    Text,
    /// Raw bytes copied to the same relative path.
    Binary,
}

/// Source stage reading files from the input root.
///
/// A file is read when it matches one of `include` and none of `exclude`.
/// Unreadable files fail individually.
#[derive(Debug, Clone)]
pub struct ReadFiles {
    root: PathBuf,
    include: Vec<String>,
    exclude: Vec<String>,
    kind: ReadKind,
}

impl ReadFiles {
    pub fn new<P: Into<PathBuf>>(root: P, kind: ReadKind) -> Self {
        Self {
            root: root.into(),
            include: vec!["**".to_string()],
            exclude: Vec::new(),
            kind,
        }
    }

    #[must_use]
    pub fn including(mut self, patterns: &[String]) -> Self {
        self.include = patterns.to_vec();
        self
    }

    #[must_use]
    pub fn excluding(mut self, patterns: &[String]) -> Self {
        self.exclude = patterns.to_vec();
        self
    }

    fn read_all(&self) -> anyhow::Result<StageOutput> {
        let include = compile(&self.include)?;
        let exclude = compile(&self.exclude)?;
        let mut output = StageOutput::default();

        for relative in discover(&self.root)? {
            let wanted = include.iter().any(|g| g.is_match(relative.as_str()))
                && !exclude.iter().any(|g| g.is_match(relative.as_str()));
            if !wanted {
                continue;
            }

            let path = self.root.join(&relative);
            let id = DocumentId::new(relative.as_str());
            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    output.fail(id, format!("cannot read {}: {}", path.display(), e));
                    continue;
                }
            };

            let doc = match self.kind {
                ReadKind::Text => match String::from_utf8(bytes) {
                    Ok(text) => Document::new(id, text),
                    Err(_) => {
                        output.fail(id, format!("{} is not valid UTF-8", path.display()));
                        continue;
                    }
                },
                ReadKind::Binary => Document::new(id, bytes).with_destination(&relative),
            };
            output.push(doc.with_source(path));
        }
        Ok(output)
    }
}

fn compile(patterns: &[String]) -> anyhow::Result<Vec<Glob<'_>>> {
    patterns
        .iter()
        .map(|p| Glob::new(p).map_err(|e| anyhow!("invalid glob '{p}': {e}")))
        .collect()
}

#[async_trait]
impl Transform for ReadFiles {
    async fn apply(&self, ctx: StageContext) -> anyhow::Result<StageOutput> {
        let reader = self.clone();
        let output = tokio::task::spawn_blocking(move || reader.read_all()).await??;

        let stage = ctx.stage();
        let count = output.documents.len();
        let root = self.root.display().to_string();
        debug!("Stage {stage} read {count} files from {root}");
        Ok(output)
    }

    fn cache_key(&self) -> String {
        format!(
            "read:{:?}:{}:{}",
            self.kind,
            self.include.join(","),
            self.exclude.join(",")
        )
    }
}
