// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! # Docstore: in-memory documents for the siteforge pipeline
//!
//! Every source file becomes a [`Document`]: an identity, optional source and
//! destination paths, ordered metadata and a text or binary payload. Documents
//! are immutable once built; stages derive new documents instead of editing
//! old ones, and the [`DocumentStore`] keeps every revision so references
//! handed out during a run stay valid.

mod document;
mod error;
mod fingerprint;
mod store;

pub use document::{Content, Document, DocumentId, Metadata};
pub use error::{Result, StoreError};
pub use fingerprint::{Fingerprint, Fingerprinter};
pub use store::{DocumentRef, DocumentStore};
