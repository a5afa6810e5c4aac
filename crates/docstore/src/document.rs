// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use crate::fingerprint::{Fingerprint, Fingerprinter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// Ordered metadata map. Ordering keeps fingerprints and serialized caches
/// stable across runs.
pub type Metadata = BTreeMap<String, Value>;

/// Stable identity of a document across stages and runs.
///
/// Source documents use their input-relative path with `/` separators;
/// generated documents use a synthetic name such as `sitemap.xml`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        DocumentId(id.into())
    }

    /// Build an identity from a relative path, normalizing separators.
    pub fn from_relative_path<P: AsRef<Path>>(path: P) -> Self {
        let parts: Vec<String> = path
            .as_ref()
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        DocumentId(parts.join("/"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        DocumentId::new(id)
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        DocumentId(id)
    }
}

/// Document payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Content {
    Text(String),
    /// Binary payloads are hex-encoded when serialized.
    Binary(#[serde(with = "hex_bytes")] Vec<u8>),
}

impl Content {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Content::Text(text) => text.as_bytes(),
            Content::Binary(bytes) => bytes,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(text) => Some(text),
            Content::Binary(_) => None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn tag(&self) -> &'static str {
        match self {
            Content::Text(_) => "text",
            Content::Binary(_) => "binary",
        }
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Content {
    fn from(bytes: Vec<u8>) -> Self {
        Content::Binary(bytes)
    }
}

/// One unit of content flowing through the pipeline.
///
/// The fingerprint covers identity, destination, metadata and payload and is
/// recomputed by every `with_*` derivation. The source path is provenance
/// only and does not contribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "DocumentParts", into = "DocumentParts")]
pub struct Document {
    id: DocumentId,
    source: Option<PathBuf>,
    destination: Option<PathBuf>,
    metadata: Metadata,
    content: Content,
    fingerprint: Fingerprint,
}

impl Document {
    pub fn new<I: Into<DocumentId>, C: Into<Content>>(id: I, content: C) -> Self {
        Self::assemble(DocumentParts {
            id: id.into(),
            source: None,
            destination: None,
            metadata: Metadata::new(),
            content: content.into(),
        })
    }

    fn assemble(parts: DocumentParts) -> Self {
        let fingerprint = parts.fingerprint();
        Document {
            id: parts.id,
            source: parts.source,
            destination: parts.destination,
            metadata: parts.metadata,
            content: parts.content,
            fingerprint,
        }
    }

    fn into_parts(self) -> DocumentParts {
        DocumentParts {
            id: self.id,
            source: self.source,
            destination: self.destination,
            metadata: self.metadata,
            content: self.content,
        }
    }

    #[must_use]
    pub fn with_source<P: Into<PathBuf>>(self, source: P) -> Self {
        let mut parts = self.into_parts();
        parts.source = Some(source.into());
        Self::assemble(parts)
    }

    #[must_use]
    pub fn with_destination<P: Into<PathBuf>>(self, destination: P) -> Self {
        let mut parts = self.into_parts();
        parts.destination = Some(destination.into());
        Self::assemble(parts)
    }

    #[must_use]
    pub fn without_destination(self) -> Self {
        let mut parts = self.into_parts();
        parts.destination = None;
        Self::assemble(parts)
    }

    #[must_use]
    pub fn with_content<C: Into<Content>>(self, content: C) -> Self {
        let mut parts = self.into_parts();
        parts.content = content.into();
        Self::assemble(parts)
    }

    #[must_use]
    pub fn with_metadata<K: Into<String>, V: Into<Value>>(self, key: K, value: V) -> Self {
        let mut parts = self.into_parts();
        parts.metadata.insert(key.into(), value.into());
        Self::assemble(parts)
    }

    /// Merge a whole map; later keys win.
    #[must_use]
    pub fn with_metadata_map(self, metadata: Metadata) -> Self {
        let mut parts = self.into_parts();
        parts.metadata.extend(metadata);
        Self::assemble(parts)
    }

    #[must_use]
    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    #[must_use]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    #[must_use]
    pub fn destination(&self) -> Option<&Path> {
        self.destination.as_deref()
    }

    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.metadata.get(key).and_then(Value::as_bool)
    }

    #[must_use]
    pub fn content(&self) -> &Content {
        &self.content
    }

    #[must_use]
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }
}

/// Serialized form; the fingerprint is always recomputed on load so a
/// tampered cache entry cannot carry a stale digest.
#[derive(Clone, Serialize, Deserialize)]
struct DocumentParts {
    id: DocumentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    destination: Option<PathBuf>,
    #[serde(default)]
    metadata: Metadata,
    content: Content,
}

impl DocumentParts {
    fn fingerprint(&self) -> Fingerprint {
        let destination = self
            .destination
            .as_ref()
            .map(|d| d.to_string_lossy().into_owned())
            .unwrap_or_default();
        let metadata = serde_json::to_vec(&self.metadata).unwrap_or_default();

        let mut fp = Fingerprinter::new();
        fp.field("id", self.id.as_str().as_bytes())
            .field("destination", destination.as_bytes())
            .field("metadata", &metadata)
            .field(self.content.tag(), self.content.as_bytes());
        fp.finish()
    }
}

impl From<DocumentParts> for Document {
    fn from(parts: DocumentParts) -> Self {
        Document::assemble(parts)
    }
}

impl From<Document> for DocumentParts {
    fn from(doc: Document) -> Self {
        doc.into_parts()
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(text).map_err(serde::de::Error::custom)
    }
}
