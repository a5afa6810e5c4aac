// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Arena of document revisions indexed by identity.
//!
//! The identity index is locked only long enough to find or create a slot.
//! Each slot carries its own lock, so writers to different identities never
//! contend and readers never wait on an unrelated writer.

use crate::error::{Result, StoreError};
use crate::{Document, DocumentId};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Reference to one exact revision of a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentRef {
    id: DocumentId,
    revision: usize,
}

impl DocumentRef {
    #[must_use]
    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    #[must_use]
    pub fn revision(&self) -> usize {
        self.revision
    }
}

#[derive(Default)]
struct Slot {
    revisions: RwLock<Vec<Arc<Document>>>,
}

impl Slot {
    fn latest(&self) -> Option<Arc<Document>> {
        self.revisions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

/// Shared in-memory document store.
#[derive(Default)]
pub struct DocumentStore {
    index: RwLock<BTreeMap<DocumentId, Arc<Slot>>>,
}

impl DocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: &DocumentId) -> Option<Arc<Slot>> {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn slot_or_insert(&self, id: &DocumentId) -> Arc<Slot> {
        if let Some(slot) = self.slot(id) {
            return slot;
        }
        self.index
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id.clone())
            .or_default()
            .clone()
    }

    /// Store a new revision of a document.
    pub fn put(&self, document: Document) -> DocumentRef {
        self.put_shared(Arc::new(document))
    }

    /// Store an already shared document as a new revision.
    pub fn put_shared(&self, document: Arc<Document>) -> DocumentRef {
        let id = document.id().clone();
        let slot = self.slot_or_insert(&id);
        let mut revisions = slot
            .revisions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        revisions.push(document);
        DocumentRef {
            id,
            revision: revisions.len() - 1,
        }
    }

    /// Latest revision of a document.
    pub fn get(&self, id: &DocumentId) -> Result<Arc<Document>> {
        self.slot(id)
            .and_then(|slot| slot.latest())
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    /// The exact revision a reference points at.
    pub fn resolve(&self, reference: &DocumentRef) -> Result<Arc<Document>> {
        let slot = self
            .slot(&reference.id)
            .ok_or_else(|| StoreError::NotFound(reference.id.clone()))?;
        let revisions = slot
            .revisions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        revisions
            .get(reference.revision)
            .cloned()
            .ok_or_else(|| StoreError::UnknownRevision {
                id: reference.id.clone(),
                revision: reference.revision,
            })
    }

    /// Number of revisions stored for an identity.
    #[must_use]
    pub fn revisions(&self, id: &DocumentId) -> usize {
        self.slot(id).map_or(0, |slot| {
            slot.revisions
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .len()
        })
    }

    /// Lazily iterate the latest revision of every document matching the
    /// predicate, in identity order.
    ///
    /// The set of identities is captured when the query is created; each
    /// document is read (and filtered) only as the iterator advances.
    pub fn query<P>(&self, mut predicate: P) -> impl Iterator<Item = Arc<Document>> + use<P>
    where
        P: FnMut(&Document) -> bool,
    {
        let slots: Vec<Arc<Slot>> = self
            .index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        slots
            .into_iter()
            .filter_map(|slot| slot.latest())
            .filter(move |doc| predicate(doc))
    }

    /// All identities, in order.
    #[must_use]
    pub fn ids(&self) -> Vec<DocumentId> {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_put_get_and_not_found() {
        let store = DocumentStore::new();
        store.put(Document::new("a.md", "alpha"));

        let doc = store.get(&"a.md".into()).expect("present");
        assert_eq!(doc.content().as_text(), Some("alpha"));

        let missing = store.get(&"b.md".into());
        assert_eq!(missing.unwrap_err(), StoreError::NotFound("b.md".into()));
    }

    #[test]
    fn test_references_are_stable_across_revisions() {
        let store = DocumentStore::new();
        let first = store.put(Document::new("a.md", "one"));
        let second = store.put(Document::new("a.md", "two"));

        assert_eq!(first.revision(), 0);
        assert_eq!(second.revision(), 1);
        assert_eq!(store.revisions(&"a.md".into()), 2);

        let old = store.resolve(&first).expect("first revision");
        assert_eq!(old.content().as_text(), Some("one"));
        let latest = store.get(&"a.md".into()).expect("latest");
        assert_eq!(latest.content().as_text(), Some("two"));
    }

    #[test]
    fn test_query_filters_in_id_order() {
        let store = DocumentStore::new();
        store.put(Document::new("c.md", "c"));
        store.put(Document::new("a.png", vec![1u8]));
        store.put(Document::new("b.md", "b"));

        let ids: Vec<String> = store
            .query(|doc| doc.id().as_str().ends_with(".md"))
            .map(|doc| doc.id().to_string())
            .collect();
        assert_eq!(ids, vec!["b.md", "c.md"]);
    }

    #[test]
    fn test_concurrent_puts_to_distinct_identities() {
        let store = Arc::new(DocumentStore::new());
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let store = store.clone();
                thread::spawn(move || {
                    for rev in 0..50 {
                        store.put(Document::new(format!("doc-{n}"), format!("{rev}")));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("writer thread");
        }

        assert_eq!(store.len(), 8);
        for n in 0..8 {
            let id = DocumentId::new(format!("doc-{n}"));
            assert_eq!(store.revisions(&id), 50);
            let latest = store.get(&id).expect("latest");
            assert_eq!(latest.content().as_text(), Some("49"));
        }
    }
}
