//! Collections: named sets of documents with a shared embedding dimension.
//!
//! A [`Collection`] ties together the in-memory [`DocumentStore`], the
//! embedding pipeline used by `add`, the brute-force query executor and,
//! when persistent, the collection's directory on disk.
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! use quiver::collection::Collection;
//! use quiver::collection::document::AddDocuments;
//! use quiver::collection::query::QueryRequest;
//! use quiver::embedding::embedder::EmbedderRef;
//! use quiver::embedding::function::FnEmbedder;
//! use tokio_util::sync::CancellationToken;
//!
//! # tokio_test::block_on(async {
//! let embedder: EmbedderRef = Arc::new(FnEmbedder::new("letters", |text: &str| {
//!     Ok(vec![text.matches('a').count() as f32, text.matches('b').count() as f32])
//! }));
//! let collection = Collection::new("letters", HashMap::new(), Some(embedder), None)?;
//!
//! let cancel = CancellationToken::new();
//! collection
//!     .add(
//!         AddDocuments::new(vec!["a".into(), "b".into()]).contents(vec!["aaa".into(), "bbb".into()]),
//!         &cancel,
//!     )
//!     .await?;
//!
//! let results = collection.query(QueryRequest::text("aab").n_results(1), &cancel).await?;
//! assert_eq!(results[0].id, "a");
//! # Ok::<(), quiver::error::QuiverError>(())
//! # }).unwrap();
//! ```

pub mod collector;
pub mod document;
pub mod filter;
pub mod ingest;
pub mod query;
pub mod store;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use self::document::{AddDocuments, Document, DocumentInput, validate_ids};
use self::filter::QueryFilter;
use self::query::{QueryInput, QueryRequest, QueryResult};
use self::store::DocumentStore;
use crate::config::CollectionSettings;
use crate::embedding::default_embedder;
use crate::embedding::embedder::EmbedderRef;
use crate::error::{QuiverError, Result};
use crate::persist::CollectionSnapshot;
use crate::persist::layout::{CollectionDir, CollectionRecord, LoadedCollection};
use crate::vector::similarity::is_finite;

/// A named set of documents.
pub struct Collection {
    inner: Arc<CollectionInner>,
    embedder: RwLock<Option<EmbedderRef>>,
    settings: Arc<CollectionSettings>,
}

/// The part of a collection handed to blocking tasks.
struct CollectionInner {
    name: String,
    metadata: HashMap<String, String>,
    store: DocumentStore,
    persist: Option<CollectionDir>,
    // Serializes "commit in memory, then write files" so the on-disk order of
    // writes to one record matches the in-memory order. Readers never take it.
    persist_lock: Mutex<()>,
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.inner.name)
            .field("metadata", &self.inner.metadata)
            .field("count", &self.count())
            .field("dimension", &self.dimension())
            .field("persist_directory", &self.persist_directory())
            .finish()
    }
}

impl Collection {
    /// Create a collection with default settings.
    ///
    /// With a `persist_root`, the collection's directory is created under it
    /// and its record written before this returns. Without an embedder the
    /// library default is used.
    pub fn new(
        name: impl Into<String>,
        metadata: HashMap<String, String>,
        embedder: Option<EmbedderRef>,
        persist_root: Option<&Path>,
    ) -> Result<Self> {
        Self::create(
            name.into(),
            metadata,
            Some(embedder.unwrap_or_else(default_embedder)),
            persist_root,
            Arc::new(CollectionSettings::default()),
        )
    }

    /// Create a collection sharing a database's settings. A `None` embedder
    /// is resolved to the default on first use.
    pub(crate) fn create(
        name: String,
        metadata: HashMap<String, String>,
        embedder: Option<EmbedderRef>,
        persist_root: Option<&Path>,
        settings: Arc<CollectionSettings>,
    ) -> Result<Self> {
        if name.is_empty() {
            return Err(QuiverError::invalid_argument("collection name is empty"));
        }

        let persist = match persist_root {
            Some(root) => {
                let dir = CollectionDir::create(root, &name, settings.sync_writes)?;
                dir.write_metadata(&CollectionRecord {
                    name: name.clone(),
                    metadata: metadata.clone(),
                })?;
                Some(dir)
            }
            None => None,
        };

        Ok(Self::assemble(
            name,
            metadata,
            DocumentStore::default(),
            persist,
            embedder,
            settings,
        ))
    }

    /// Rebuild a collection read from disk. It has no embedder until one is
    /// installed through the database.
    pub(crate) fn from_loaded(
        loaded: LoadedCollection,
        settings: Arc<CollectionSettings>,
    ) -> Result<Self> {
        let LoadedCollection {
            record,
            documents,
            dir,
        } = loaded;
        let store = DocumentStore::from_documents(documents).map_err(|e| {
            QuiverError::persistence(format!(
                "collection '{}' in '{}' is inconsistent: {e}",
                record.name,
                dir.path().display()
            ))
        })?;

        Ok(Self::assemble(
            record.name,
            record.metadata,
            store,
            Some(dir),
            None,
            settings,
        ))
    }

    /// Build a collection from an imported snapshot, persisting every
    /// document when `persist_root` is given. Like a reloaded collection it
    /// has no embedder yet.
    pub(crate) fn from_snapshot(
        snapshot: CollectionSnapshot,
        persist_root: Option<&Path>,
        settings: Arc<CollectionSettings>,
    ) -> Result<Self> {
        let CollectionSnapshot {
            name,
            metadata,
            documents,
        } = snapshot;
        if !documents.is_empty() {
            validate_ids(documents.iter().map(|d| d.id.as_str()))?;
        }
        if let Some(bad) = documents.iter().find(|d| !is_finite(&d.embedding)) {
            return Err(QuiverError::invalid_argument(format!(
                "embedding of document '{}' contains NaN or infinite values",
                bad.id
            )));
        }

        let collection = Self::create(name, metadata, None, persist_root, settings)?;
        if !documents.is_empty() {
            collection.inner.commit(documents)?;
        }
        Ok(collection)
    }

    fn assemble(
        name: String,
        metadata: HashMap<String, String>,
        store: DocumentStore,
        persist: Option<CollectionDir>,
        embedder: Option<EmbedderRef>,
        settings: Arc<CollectionSettings>,
    ) -> Self {
        Self {
            inner: Arc::new(CollectionInner {
                name,
                metadata,
                store,
                persist,
                persist_lock: Mutex::new(()),
            }),
            embedder: RwLock::new(embedder),
            settings,
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.inner.metadata
    }

    /// Number of documents.
    pub fn count(&self) -> usize {
        self.inner.store.count()
    }

    /// Embedding dimension, fixed by the first document ever added.
    pub fn dimension(&self) -> Option<usize> {
        self.inner.store.dimension()
    }

    /// The directory holding this collection's records, if persistent.
    pub fn persist_directory(&self) -> Option<&Path> {
        self.inner.persist.as_ref().map(CollectionDir::path)
    }

    /// Copy of the document stored under `id`.
    pub fn get(&self, id: &str) -> Option<Document> {
        self.inner.store.get(id).map(|document| (*document).clone())
    }

    /// Add a column-oriented batch.
    ///
    /// Documents without an embedding get one from the collection's provider.
    /// The call is all-or-nothing: invalid input, a provider failure or
    /// cancellation leave the collection unchanged.
    pub async fn add(&self, batch: AddDocuments, cancel: &CancellationToken) -> Result<()> {
        validate_ids(batch.ids.iter().map(String::as_str))?;
        let inputs = batch.into_inputs()?;
        self.ingest(inputs, cancel).await
    }

    /// Add row-oriented inputs; only those without a vector are embedded.
    pub async fn add_documents(
        &self,
        inputs: Vec<DocumentInput>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        validate_ids(inputs.iter().map(|input| input.id.as_str()))?;
        self.ingest(inputs, cancel).await
    }

    pub async fn add_document(&self, input: DocumentInput, cancel: &CancellationToken) -> Result<()> {
        self.add_documents(vec![input], cancel).await
    }

    async fn ingest(&self, inputs: Vec<DocumentInput>, cancel: &CancellationToken) -> Result<()> {
        let embedder = self.embedder();
        let documents = ingest::embed_inputs(
            embedder.as_ref(),
            inputs,
            self.settings.embedding_concurrency,
            cancel,
        )
        .await?;
        if cancel.is_cancelled() {
            return Err(QuiverError::cancelled("add cancelled before commit"));
        }
        if self.inner.persist.is_none() {
            return self.inner.commit(documents);
        }
        // File writes (and their fsyncs) stay off the async workers.
        let inner = Arc::clone(&self.inner);
        run_blocking(move || inner.commit(documents)).await
    }

    /// Delete one document; deleting an absent ID succeeds.
    pub fn delete(&self, id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(QuiverError::invalid_argument("document id is empty"));
        }
        let inner = &self.inner;
        match &inner.persist {
            None => {
                inner.store.delete(id);
            }
            Some(dir) => {
                let _guard = inner.persist_lock.lock();
                if inner.store.delete(id).is_some() {
                    dir.remove_document(id)?;
                }
            }
        }
        Ok(())
    }

    /// Delete every document passing `filter`; returns how many were removed.
    pub fn delete_where(&self, filter: &QueryFilter) -> Result<usize> {
        if filter.is_empty() {
            return Err(QuiverError::invalid_argument(
                "delete_where needs a metadata or document filter",
            ));
        }
        let inner = &self.inner;
        let removed = match &inner.persist {
            None => inner.store.remove_matching(filter),
            Some(dir) => {
                let _guard = inner.persist_lock.lock();
                let removed = inner.store.remove_matching(filter);
                for id in &removed {
                    dir.remove_document(id)?;
                }
                removed
            }
        };
        log::debug!(
            "collection '{}': deleted {} documents by filter",
            inner.name,
            removed.len()
        );
        Ok(removed.len())
    }

    /// Run a query, embedding its text first when needed.
    ///
    /// Scoring runs on tokio's blocking pool when called inside a runtime.
    pub async fn query(
        &self,
        request: QueryRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<QueryResult>> {
        if request.n_results == 0 {
            return Err(QuiverError::invalid_argument("n_results must be at least 1"));
        }
        let vector = match request.input {
            QueryInput::Embedding(vector) => vector,
            QueryInput::Text(text) => {
                if text.is_empty() {
                    return Err(QuiverError::invalid_argument("query text is empty"));
                }
                if self.count() == 0 {
                    return Ok(Vec::new());
                }
                let embedder = self.embedder();
                ingest::embed_text(embedder.as_ref(), &text, cancel).await?
            }
        };

        let Some(snapshot) = self.prepare_query(&vector, request.n_results, cancel)? else {
            return Ok(Vec::new());
        };
        let settings = Arc::clone(&self.settings);
        let n_results = request.n_results;
        let filter = request.filter;
        let cancel = cancel.clone();
        run_blocking(move || {
            query::execute(&settings, snapshot, &vector, n_results, &filter, &cancel)
        })
        .await
    }

    /// Run a query with a ready-made vector on the calling thread.
    ///
    /// Results are ordered by descending similarity, ties by ascending ID,
    /// and hold at most `n_results` rows.
    pub fn query_embedding(
        &self,
        vector: &[f32],
        n_results: usize,
        filter: &QueryFilter,
        cancel: &CancellationToken,
    ) -> Result<Vec<QueryResult>> {
        match self.prepare_query(vector, n_results, cancel)? {
            Some(snapshot) => {
                query::execute(&self.settings, snapshot, vector, n_results, filter, cancel)
            }
            None => Ok(Vec::new()),
        }
    }

    /// Validate a query vector and take the snapshot to score; `None` when
    /// the collection is empty.
    fn prepare_query(
        &self,
        vector: &[f32],
        n_results: usize,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<Arc<Document>>>> {
        if n_results == 0 {
            return Err(QuiverError::invalid_argument("n_results must be at least 1"));
        }
        if vector.is_empty() {
            return Err(QuiverError::invalid_argument("query embedding is empty"));
        }
        if !is_finite(vector) {
            return Err(QuiverError::invalid_argument(
                "query embedding contains NaN or infinite values",
            ));
        }
        if cancel.is_cancelled() {
            return Err(QuiverError::cancelled("query cancelled"));
        }

        let snapshot = self.inner.store.snapshot();
        if snapshot.is_empty() {
            return Ok(None);
        }
        if let Some(expected) = self.inner.store.dimension()
            && expected != vector.len()
        {
            return Err(QuiverError::dimension_mismatch(expected, vector.len()));
        }
        Ok(Some(snapshot))
    }

    pub(crate) fn embedder(&self) -> EmbedderRef {
        if let Some(embedder) = self.embedder.read().clone() {
            return embedder;
        }
        let mut slot = self.embedder.write();
        Arc::clone(slot.get_or_insert_with(default_embedder))
    }

    /// Install `embedder` (or the default) on a collection reloaded from disk.
    pub(crate) fn set_embedder_if_missing(&self, embedder: Option<EmbedderRef>) {
        let mut slot = self.embedder.write();
        if slot.is_none() {
            *slot = Some(embedder.unwrap_or_else(default_embedder));
        }
    }

    pub(crate) fn persist_dir(&self) -> Option<&CollectionDir> {
        self.inner.persist.as_ref()
    }

    /// Copy of the collection's contents, documents ordered by ID.
    pub(crate) fn to_snapshot(&self) -> CollectionSnapshot {
        let mut documents: Vec<Document> = self
            .inner
            .store
            .snapshot()
            .into_iter()
            .map(|document| (*document).clone())
            .collect();
        documents.sort_by(|a, b| a.id.cmp(&b.id));
        CollectionSnapshot {
            name: self.inner.name.clone(),
            metadata: self.inner.metadata.clone(),
            documents,
        }
    }
}

impl CollectionInner {
    fn commit(&self, documents: Vec<Document>) -> Result<()> {
        let count = documents.len();
        match &self.persist {
            None => {
                self.insert(documents)?;
            }
            Some(dir) => {
                let _guard = self.persist_lock.lock();
                let committed = self.insert(documents)?;
                if !dir.has_metadata() {
                    dir.write_metadata(&self.record())?;
                }
                for document in &committed {
                    dir.write_document(document)?;
                }
            }
        }
        log::debug!("collection '{}': committed {} documents", self.name, count);
        Ok(())
    }

    fn insert(&self, documents: Vec<Document>) -> Result<Vec<Arc<Document>>> {
        match <[Document; 1]>::try_from(documents) {
            Ok([document]) => Ok(vec![self.store.add_or_replace(document)?]),
            Err(documents) => self.store.commit(documents),
        }
    }

    fn record(&self) -> CollectionRecord {
        CollectionRecord {
            name: self.name.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// Run `work` on tokio's blocking pool when inside a runtime, inline
/// otherwise.
async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle
            .spawn_blocking(work)
            .await
            .map_err(|e| QuiverError::invariant(format!("blocking task failed: {e}")))?,
        Err(_) => work(),
    }
}
