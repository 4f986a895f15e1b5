//! On-disk layout of a persistent database.
//!
//! ```text
//! <root>/
//!   <hash(collection name)>/
//!     00000000.qvr           collection record: name + metadata
//!     <hash(document id)>.qvr one record per document
//! ```
//!
//! Hashes are the first 16 bytes of SHA-256, hex encoded. Anything else found
//! while scanning (stray files, nested directories, `*.tmp` leftovers of
//! interrupted writes) is ignored.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::collection::document::Document;
use crate::error::{QuiverError, Result};
use crate::persist::record::{read_record, write_record_atomic};

/// Reserved file name of a collection's own record.
pub const METADATA_FILE_NAME: &str = "00000000.qvr";

/// Extension of every record file.
pub const RECORD_EXTENSION: &str = "qvr";

const HASH_HEX_LEN: usize = 32;

/// Hex of the first 16 bytes of the SHA-256 of `value`.
pub fn hash_hex(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    hex::encode(&digest[..HASH_HEX_LEN / 2])
}

/// Persisted identity of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionRecord {
    pub name: String,
    pub metadata: HashMap<String, String>,
}

/// The directory holding one collection's records.
#[derive(Debug, Clone)]
pub(crate) struct CollectionDir {
    path: PathBuf,
    sync_writes: bool,
}

impl CollectionDir {
    /// Directory for a new collection `name` under `root`, created if
    /// missing. Document records left in an existing directory are removed
    /// so they cannot reappear on the next load.
    pub(crate) fn create(root: &Path, name: &str, sync_writes: bool) -> Result<Self> {
        let path = root.join(hash_hex(name));
        fs::create_dir_all(&path)
            .map_err(|e| QuiverError::persistence_io("couldn't create directory", &path, e))?;
        let dir = Self { path, sync_writes };
        let cleared = dir.clear_documents()?;
        if cleared > 0 {
            log::warn!(
                "removed {cleared} stale document records from '{}'",
                dir.path.display()
            );
        }
        Ok(dir)
    }

    fn clear_documents(&self) -> Result<usize> {
        let mut cleared = 0;
        for entry in read_dir(&self.path)? {
            let entry =
                entry.map_err(|e| QuiverError::persistence_io("couldn't scan", &self.path, e))?;
            let path = entry.path();
            if !path.is_file() || !is_document_file(&path) {
                continue;
            }
            fs::remove_file(&path)
                .map_err(|e| QuiverError::persistence_io("couldn't remove", &path, e))?;
            cleared += 1;
        }
        Ok(cleared)
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    fn metadata_path(&self) -> PathBuf {
        self.path.join(METADATA_FILE_NAME)
    }

    fn document_path(&self, id: &str) -> PathBuf {
        self.path
            .join(format!("{}.{RECORD_EXTENSION}", hash_hex(id)))
    }

    pub(crate) fn has_metadata(&self) -> bool {
        self.metadata_path().is_file()
    }

    pub(crate) fn write_metadata(&self, record: &CollectionRecord) -> Result<()> {
        write_record_atomic(&self.metadata_path(), record, self.sync_writes)
    }

    pub(crate) fn write_document(&self, document: &Document) -> Result<()> {
        write_record_atomic(&self.document_path(&document.id), document, self.sync_writes)
    }

    /// Remove a document's record; a missing file is not an error.
    pub(crate) fn remove_document(&self, id: &str) -> Result<()> {
        let path = self.document_path(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(QuiverError::persistence_io("couldn't remove", &path, e)),
        }
    }

    /// Remove the whole directory; a missing directory is not an error.
    pub(crate) fn remove_all(&self) -> Result<()> {
        match fs::remove_dir_all(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(QuiverError::persistence_io(
                "couldn't remove directory",
                &self.path,
                e,
            )),
        }
    }
}

/// A collection read back from disk.
#[derive(Debug)]
pub(crate) struct LoadedCollection {
    pub(crate) record: CollectionRecord,
    pub(crate) documents: Vec<Document>,
    pub(crate) dir: CollectionDir,
}

/// Create `root` if needed and load every collection stored under it.
///
/// Collections are keyed by their recorded name; two directories recording
/// the same name fail the load.
pub(crate) fn load_collections(root: &Path, sync_writes: bool) -> Result<Vec<LoadedCollection>> {
    fs::create_dir_all(root)
        .map_err(|e| QuiverError::persistence_io("couldn't create directory", root, e))?;

    let mut dirs = Vec::new();
    for entry in read_dir(root)? {
        let entry = entry.map_err(|e| QuiverError::persistence_io("couldn't scan", root, e))?;
        let path = entry.path();
        if path.is_dir() {
            dirs.push(path);
        } else {
            log::debug!("ignoring non-directory entry '{}'", path.display());
        }
    }
    dirs.sort();

    let mut by_name: HashMap<String, PathBuf> = HashMap::new();
    let mut loaded = Vec::new();
    for path in dirs {
        let dir = CollectionDir { path, sync_writes };
        if !dir.has_metadata() {
            log::warn!(
                "skipping '{}': no {METADATA_FILE_NAME} collection record",
                dir.path.display()
            );
            continue;
        }
        let record: CollectionRecord = read_record(&dir.metadata_path())?;
        if let Some(previous) = by_name.get(&record.name) {
            return Err(QuiverError::persistence(format!(
                "collection '{}' is recorded in both '{}' and '{}'",
                record.name,
                previous.display(),
                dir.path.display()
            )));
        }
        by_name.insert(record.name.clone(), dir.path.clone());

        let documents = load_documents(&dir.path)?;
        log::debug!(
            "read collection '{}' ({} documents) from '{}'",
            record.name,
            documents.len(),
            dir.path.display()
        );
        loaded.push(LoadedCollection {
            record,
            documents,
            dir,
        });
    }
    Ok(loaded)
}

fn load_documents(dir: &Path) -> Result<Vec<Document>> {
    let mut documents = Vec::new();
    for entry in read_dir(dir)? {
        let entry = entry.map_err(|e| QuiverError::persistence_io("couldn't scan", dir, e))?;
        let path = entry.path();
        if !path.is_file() || !is_document_file(&path) {
            continue;
        }
        documents.push(read_record(&path)?);
    }
    Ok(documents)
}

fn is_document_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if name == METADATA_FILE_NAME {
        return false;
    }
    match name.strip_suffix(RECORD_EXTENSION).and_then(|s| s.strip_suffix('.')) {
        Some(stem) => stem.len() == HASH_HEX_LEN && stem.bytes().all(|b| b.is_ascii_hexdigit()),
        None => false,
    }
}

fn read_dir(path: &Path) -> Result<fs::ReadDir> {
    fs::read_dir(path).map_err(|e| QuiverError::persistence_io("couldn't read directory", path, e))
}
