// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Persisted build cache for incremental rebuilds.
//!
//! ```json
//! {
//!   "schema_version": 1,
//!   "documents": { "about.md": "3f2a…" },
//!   "stages": {
//!     "markdown": { "input_fingerprint": "9c1e…", "documents": [ … ], "failures": [ … ] }
//!   }
//! }
//! ```
//!
//! A file written with another schema version is never interpreted; it is
//! treated as absent and the next run rebuilds everything.

use crate::error::{Error, Result};
use crate::stage::DocumentFailure;
use diagnostics::*;
use docstore::{Document, DocumentId, Fingerprint};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

/// Bump whenever the layout of [`BuildCache`] or [`Document`] serialization
/// changes.
pub const CACHE_SCHEMA_VERSION: u32 = 1;

/// Recorded output of one cacheable stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub input_fingerprint: Fingerprint,
    pub documents: Vec<Document>,
    /// Documents the stage could not process; reported again on reuse.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<DocumentFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildCache {
    schema_version: u32,
    #[serde(default)]
    documents: BTreeMap<DocumentId, Fingerprint>,
    #[serde(default)]
    stages: BTreeMap<String, StageRecord>,
}

impl Default for BuildCache {
    fn default() -> Self {
        Self {
            schema_version: CACHE_SCHEMA_VERSION,
            documents: BTreeMap::new(),
            stages: BTreeMap::new(),
        }
    }
}

#[derive(Deserialize)]
struct VersionProbe {
    schema_version: Option<u32>,
}

impl BuildCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a cache file. Missing, unreadable or mismatched files yield an
    /// empty cache, which forces a full rebuild.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        let display = path.display().to_string();
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No build cache at {display}, full rebuild");
                return Self::new();
            }
            Err(e) => {
                let err = e.to_string();
                warn!("Cannot read build cache {display}: {err: err.as_str()}; full rebuild");
                return Self::new();
            }
        };

        match serde_json::from_slice::<VersionProbe>(&bytes) {
            Ok(VersionProbe {
                schema_version: Some(found),
            }) if found == CACHE_SCHEMA_VERSION => {}
            Ok(probe) => {
                let found = probe
                    .schema_version
                    .map_or_else(|| "none".to_string(), |v| v.to_string());
                let expected = CACHE_SCHEMA_VERSION;
                warn!("Build cache {display} has schema version {found}, expected {expected}; full rebuild");
                return Self::new();
            }
            Err(e) => {
                let err = e.to_string();
                warn!("Build cache {display} is corrupt: {err: err.as_str()}; full rebuild");
                return Self::new();
            }
        }

        match serde_json::from_slice::<BuildCache>(&bytes) {
            Ok(cache) => cache,
            Err(e) => {
                let err = e.to_string();
                warn!("Build cache {display} is corrupt: {err: err.as_str()}; full rebuild");
                Self::new()
            }
        }
    }

    /// Write the cache atomically (temp file in the same directory, then
    /// rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;

        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| Error::Cache(format!("serialize {}: {}", path.display(), e)))?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| Error::io(parent, e))?;
        tmp.write_all(&json).map_err(|e| Error::io(path, e))?;
        tmp.as_file().sync_all().map_err(|e| Error::io(path, e))?;
        tmp.persist(path).map_err(|e| Error::io(path, e.error))?;
        Ok(())
    }

    #[must_use]
    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageRecord> {
        self.stages.get(name)
    }

    pub fn record_stage<S: Into<String>>(&mut self, name: S, record: StageRecord) {
        self.stages.insert(name.into(), record);
    }

    pub fn record_document(&mut self, id: DocumentId, fingerprint: Fingerprint) {
        self.documents.insert(id, fingerprint);
    }

    /// Identity → fingerprint of every source document seen by the run.
    #[must_use]
    pub fn documents(&self) -> &BTreeMap<DocumentId, Fingerprint> {
        &self.documents
    }

    #[must_use]
    pub fn fingerprint(&self, id: &DocumentId) -> Option<&Fingerprint> {
        self.documents.get(id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.stages.is_empty()
    }
}
