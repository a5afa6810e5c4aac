// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use crate::DocumentId;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by [`crate::DocumentStore`] lookups.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Document not found: {0}")]
    NotFound(DocumentId),

    #[error("Document {id} has no revision {revision}")]
    UnknownRevision { id: DocumentId, revision: usize },
}
