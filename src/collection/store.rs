//! In-memory document store of one collection.
//!
//! The store is the authoritative ID → document map. Writers take the
//! exclusive lock only for the commit itself; readers take the shared lock
//! only long enough to clone `Arc` references.

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::collection::document::Document;
use crate::collection::filter::QueryFilter;
use crate::error::{QuiverError, Result};

#[derive(Debug, Default)]
struct StoreInner {
    documents: AHashMap<String, Arc<Document>>,
    dimension: Option<usize>,
}

/// Concurrent document map with a fixed embedding dimension.
#[derive(Debug, Default)]
pub(crate) struct DocumentStore {
    inner: RwLock<StoreInner>,
}

impl DocumentStore {
    /// Rebuild a store from persisted documents. The dimension is taken from
    /// the loaded documents, which must agree with one another.
    pub(crate) fn from_documents(documents: Vec<Document>) -> Result<Self> {
        let store = Self::default();
        if !documents.is_empty() {
            store.commit(documents)?;
        }
        Ok(store)
    }

    /// Insert or overwrite a single document.
    pub(crate) fn add_or_replace(&self, document: Document) -> Result<Arc<Document>> {
        let mut committed = self.commit(vec![document])?;
        committed
            .pop()
            .ok_or_else(|| QuiverError::invariant("single-document commit returned nothing"))
    }

    /// Insert or overwrite a batch atomically.
    ///
    /// All vectors are checked against the established dimension (or against
    /// the first vector of the batch when none is established yet) before
    /// anything is inserted; on mismatch the store is left untouched.
    pub(crate) fn commit(&self, documents: Vec<Document>) -> Result<Vec<Arc<Document>>> {
        let mut inner = self.inner.write();

        let expected = match inner.dimension {
            Some(dimension) => dimension,
            None => match documents.first() {
                Some(first) => first.dimension(),
                None => return Ok(Vec::new()),
            },
        };
        if expected == 0 {
            return Err(QuiverError::invalid_argument("embedding must not be empty"));
        }
        if let Some(bad) = documents.iter().find(|d| d.dimension() != expected) {
            return Err(QuiverError::dimension_mismatch(expected, bad.dimension()));
        }

        inner.dimension = Some(expected);
        let mut committed = Vec::with_capacity(documents.len());
        for document in documents {
            let document = Arc::new(document);
            inner
                .documents
                .insert(document.id.clone(), Arc::clone(&document));
            committed.push(document);
        }
        Ok(committed)
    }

    pub(crate) fn get(&self, id: &str) -> Option<Arc<Document>> {
        self.inner.read().documents.get(id).cloned()
    }

    /// Remove a document; `None` when it was absent.
    pub(crate) fn delete(&self, id: &str) -> Option<Arc<Document>> {
        self.inner.write().documents.remove(id)
    }

    /// Remove every document passing `filter`, returning their IDs.
    pub(crate) fn remove_matching(&self, filter: &QueryFilter) -> Vec<String> {
        let mut inner = self.inner.write();
        let doomed: Vec<String> = inner
            .documents
            .values()
            .filter(|document| filter.matches(document))
            .map(|document| document.id.clone())
            .collect();
        for id in &doomed {
            inner.documents.remove(id);
        }
        doomed
    }

    /// Point-in-time view; later writes are not reflected in it.
    pub(crate) fn snapshot(&self) -> Vec<Arc<Document>> {
        self.inner.read().documents.values().cloned().collect()
    }

    pub(crate) fn count(&self) -> usize {
        self.inner.read().documents.len()
    }

    pub(crate) fn dimension(&self) -> Option<usize> {
        self.inner.read().dimension
    }
}
