//! # Quiver
//!
//! An embeddable vector database: named collections of documents, exact
//! cosine-similarity search and optional on-disk persistence.
//!
//! ## Features
//!
//! - Exact brute-force nearest-neighbor search, parallelized with rayon
//! - Metadata equality and content substring filters
//! - Pluggable async embedding providers
//! - Crash-tolerant persistence with checksummed records
//! - Export and import of whole databases

pub mod collection;
pub mod config;
pub mod database;
pub mod embedding;
pub mod error;
pub mod persist;
pub mod vector;

pub mod prelude {
    pub use crate::collection::Collection;
    pub use crate::collection::document::{AddDocuments, Document, DocumentInput};
    pub use crate::collection::filter::{DocumentFilter, MetadataFilter, QueryFilter};
    pub use crate::collection::query::{QueryRequest, QueryResult};
    pub use crate::config::DatabaseConfig;
    pub use crate::database::Database;
    pub use crate::embedding::embedder::{Embedder, EmbedderRef};
    pub use crate::error::{QuiverError, Result};
    pub use tokio_util::sync::CancellationToken;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
