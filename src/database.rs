//! The collection registry.
//!
//! A [`Database`] maps collection names to [`Collection`]s behind its own
//! lock, independent of the collections' internal locks, so operations on
//! different collections never contend. A persistent database loads every
//! collection found under its root directory when opened.
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//!
//! use quiver::collection::document::DocumentInput;
//! use quiver::database::Database;
//! use tokio_util::sync::CancellationToken;
//!
//! # tokio_test::block_on(async {
//! let db = Database::new();
//! let collection = db.create_collection("notes", HashMap::new(), None)?;
//! collection
//!     .add_document(
//!         DocumentInput::new("n1").embedding(vec![0.1, 0.9]),
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//!
//! assert!(db.get_collection("notes", None).is_some());
//! db.delete_collection("notes")?;
//! assert!(db.list_collections().is_empty());
//! # Ok::<(), quiver::error::QuiverError>(())
//! # }).unwrap();
//! ```

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::collection::Collection;
use crate::config::{CollectionSettings, DEFAULT_PERSIST_DIRECTORY, DatabaseConfig};
use crate::embedding::default_embedder;
use crate::embedding::embedder::EmbedderRef;
use crate::error::{QuiverError, Result};
use crate::persist::layout::load_collections;
use crate::persist::record::{read_from, read_record, write_record_atomic, write_to};
use crate::persist::{CollectionSnapshot, DatabaseSnapshot};

/// A set of named collections, optionally persisted under one directory.
#[derive(Debug)]
pub struct Database {
    collections: RwLock<HashMap<String, Arc<Collection>>>,
    config: DatabaseConfig,
    settings: Arc<CollectionSettings>,
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    /// An empty in-memory database.
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            config: DatabaseConfig::default(),
            settings: Arc::new(CollectionSettings::default()),
        }
    }

    /// Open (or create) a persistent database rooted at `path`.
    ///
    /// An empty path means [`DEFAULT_PERSIST_DIRECTORY`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let config = DatabaseConfig::builder()
            .persist_directory(path.as_ref())
            .build()?;
        Self::with_config(config)
    }

    /// Build a database from a full configuration, loading persisted
    /// collections when a directory is configured.
    pub fn with_config(mut config: DatabaseConfig) -> Result<Self> {
        let settings = config.settings()?;
        config.persist_directory = config.persist_directory.as_deref().map(normalize_root);

        let mut collections = HashMap::new();
        if let Some(root) = &config.persist_directory {
            for loaded in load_collections(root, settings.sync_writes)? {
                let collection = Collection::from_loaded(loaded, Arc::clone(&settings))?;
                collections.insert(collection.name().to_string(), Arc::new(collection));
            }
            log::info!(
                "opened database at '{}' with {} collections",
                root.display(),
                collections.len()
            );
        }

        Ok(Self {
            collections: RwLock::new(collections),
            config,
            settings,
        })
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Root directory, if persistent.
    pub fn persist_directory(&self) -> Option<&Path> {
        self.config.persist_directory.as_deref()
    }

    /// Create a new collection. Fails if the name is empty.
    ///
    /// A collection already registered under `name` is replaced: its
    /// documents and directory are discarded, and handles to it still held
    /// elsewhere are detached from the database.
    pub fn create_collection(
        &self,
        name: &str,
        metadata: HashMap<String, String>,
        embedder: Option<EmbedderRef>,
    ) -> Result<Arc<Collection>> {
        let mut collections = self.collections.write();
        if let Some(previous) = collections.remove(name) {
            log::info!("replacing collection '{name}'");
            if let Some(dir) = previous.persist_dir() {
                dir.remove_all()?;
            }
        }
        let collection = self.build_collection(name, metadata, embedder)?;
        collections.insert(name.to_string(), Arc::clone(&collection));
        Ok(collection)
    }

    /// Look up a collection. A collection loaded from disk gets `embedder`
    /// (or the default) installed the first time it is fetched.
    pub fn get_collection(&self, name: &str, embedder: Option<EmbedderRef>) -> Option<Arc<Collection>> {
        let collection = self.collections.read().get(name).cloned()?;
        collection.set_embedder_if_missing(embedder);
        Some(collection)
    }

    /// Fetch `name`, creating it when absent. Atomic with respect to other
    /// registry calls.
    pub fn get_or_create_collection(
        &self,
        name: &str,
        metadata: HashMap<String, String>,
        embedder: Option<EmbedderRef>,
    ) -> Result<Arc<Collection>> {
        let mut collections = self.collections.write();
        if let Some(existing) = collections.get(name) {
            existing.set_embedder_if_missing(embedder);
            return Ok(Arc::clone(existing));
        }
        let collection = self.build_collection(name, metadata, embedder)?;
        collections.insert(name.to_string(), Arc::clone(&collection));
        Ok(collection)
    }

    /// Copy of the name → collection map.
    pub fn list_collections(&self) -> HashMap<String, Arc<Collection>> {
        self.collections.read().clone()
    }

    /// Remove a collection and its directory. Absent names are a no-op.
    ///
    /// The in-memory entry is removed first; a failure removing the
    /// directory is returned but does not restore it.
    pub fn delete_collection(&self, name: &str) -> Result<()> {
        let removed = self.collections.write().remove(name);
        let Some(collection) = removed else {
            return Ok(());
        };
        log::info!("deleted collection '{name}'");
        match collection.persist_dir() {
            Some(dir) => dir.remove_all(),
            None => Ok(()),
        }
    }

    /// Remove every collection; a persistent root is wiped and recreated.
    pub fn reset(&self) -> Result<()> {
        let mut collections = self.collections.write();
        collections.clear();
        log::info!("reset database");

        if let Some(root) = self.persist_directory() {
            match fs::remove_dir_all(root) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(QuiverError::persistence_io("couldn't remove", root, e)),
            }
            fs::create_dir_all(root)
                .map_err(|e| QuiverError::persistence_io("couldn't recreate", root, e))?;
        }
        Ok(())
    }

    /// Write every collection to `path` as a single record.
    pub fn export_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let snapshot = self.snapshot();
        write_record_atomic(path, &snapshot, self.settings.sync_writes)?;
        log::info!(
            "exported {} collections to '{}'",
            snapshot.collections.len(),
            path.display()
        );
        Ok(())
    }

    /// Write every collection to `writer` as a single record.
    pub fn export_to_writer<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_to(writer, &self.snapshot())
    }

    /// Load an export written by [`export_to_path`](Self::export_to_path).
    pub fn import_from_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let snapshot: DatabaseSnapshot = read_record(path.as_ref())?;
        self.import(snapshot)
    }

    /// Load an export read from `reader`.
    pub fn import_from_reader<R: Read>(&self, reader: &mut R) -> Result<()> {
        let snapshot: DatabaseSnapshot = read_from(reader)?;
        self.import(snapshot)
    }

    fn build_collection(
        &self,
        name: &str,
        metadata: HashMap<String, String>,
        embedder: Option<EmbedderRef>,
    ) -> Result<Arc<Collection>> {
        let collection = Collection::create(
            name.to_string(),
            metadata,
            Some(embedder.unwrap_or_else(default_embedder)),
            self.persist_directory(),
            Arc::clone(&self.settings),
        )?;
        log::info!("created collection '{name}'");
        Ok(Arc::new(collection))
    }

    fn snapshot(&self) -> DatabaseSnapshot {
        let collections: Vec<Arc<Collection>> = self.collections.read().values().cloned().collect();
        let mut collections: Vec<CollectionSnapshot> =
            collections.iter().map(|c| c.to_snapshot()).collect();
        collections.sort_by(|a, b| a.name.cmp(&b.name));
        DatabaseSnapshot { collections }
    }

    /// Replace same-named collections with the snapshot's contents.
    fn import(&self, snapshot: DatabaseSnapshot) -> Result<()> {
        let mut names = HashSet::new();
        for collection in &snapshot.collections {
            if collection.name.is_empty() {
                return Err(QuiverError::invalid_argument("imported collection name is empty"));
            }
            if !names.insert(collection.name.as_str()) {
                return Err(QuiverError::invalid_argument(format!(
                    "collection '{}' appears twice in the import",
                    collection.name
                )));
            }
        }

        let count = snapshot.collections.len();
        let mut collections = self.collections.write();
        for imported in snapshot.collections {
            if let Some(previous) = collections.remove(&imported.name)
                && let Some(dir) = previous.persist_dir()
            {
                dir.remove_all()?;
            }
            let name = imported.name.clone();
            let collection = Collection::from_snapshot(
                imported,
                self.persist_directory(),
                Arc::clone(&self.settings),
            )?;
            collections.insert(name, Arc::new(collection));
        }
        log::info!("imported {count} collections");
        Ok(())
    }
}

/// Lexically normalize a root path; empty means the default directory.
fn normalize_root(path: &Path) -> PathBuf {
    if path.as_os_str().is_empty() {
        return PathBuf::from(DEFAULT_PERSIST_DIRECTORY);
    }
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    if normalized.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        normalized
    }
}
