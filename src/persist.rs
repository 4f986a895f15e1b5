//! Persistence layer.
//!
//! - [`record`]: checksummed record codec and atomic file writes
//! - [`layout`]: directory layout, collection directories and the startup scan
//!
//! Snapshot types used by database export/import also live here.

pub mod layout;
pub mod record;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::collection::document::Document;

/// One collection inside an export snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSnapshot {
    pub name: String,
    pub metadata: HashMap<String, String>,
    pub documents: Vec<Document>,
}

/// Every collection of a database, written as a single record by export.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSnapshot {
    pub collections: Vec<CollectionSnapshot>,
}
