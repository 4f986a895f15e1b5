//! Database configuration.
//!
//! [`DatabaseConfig`] carries the knobs shared by every collection of a
//! [`Database`](crate::database::Database): where (and whether) to persist,
//! how many embedding calls may be in flight during an add, how many threads
//! score candidates during a query, and whether record writes are fsynced.
//!
//! The config is `serde`-compatible so hosts can embed it in their own
//! configuration files; missing fields take their defaults.
//!
//! ```
//! use quiver::config::DatabaseConfig;
//!
//! # fn example() -> quiver::error::Result<()> {
//! let config = DatabaseConfig::builder()
//!     .persist_directory("./my-db")
//!     .embedding_concurrency(4)
//!     .build()?;
//! assert_eq!(config.embedding_concurrency, 4);
//!
//! let parsed = DatabaseConfig::from_json_str(r#"{"scoring_threads": 2}"#)?;
//! assert!(parsed.persist_directory.is_none());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use rayon::ThreadPool;
use serde::{Deserialize, Serialize};

use crate::error::{QuiverError, Result};

/// Directory used by [`Database::open`](crate::database::Database::open) when given an empty path.
pub const DEFAULT_PERSIST_DIRECTORY: &str = "./quiver-db";

fn default_embedding_concurrency() -> usize {
    num_cpus::get().max(1)
}

fn default_sync_writes() -> bool {
    true
}

/// Configuration for a database and the collections it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Root directory for persisted collections. `None` keeps everything in memory.
    #[serde(default)]
    pub persist_directory: Option<PathBuf>,

    /// Maximum number of concurrent embedding calls per `add`.
    #[serde(default = "default_embedding_concurrency")]
    pub embedding_concurrency: usize,

    /// Worker threads for query scoring. `0` uses rayon's global pool.
    #[serde(default)]
    pub scoring_threads: usize,

    /// Fsync each record file before it is renamed into place.
    #[serde(default = "default_sync_writes")]
    pub sync_writes: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            persist_directory: None,
            embedding_concurrency: default_embedding_concurrency(),
            scoring_threads: 0,
            sync_writes: default_sync_writes(),
        }
    }
}

impl DatabaseConfig {
    /// Create a new builder for DatabaseConfig.
    pub fn builder() -> DatabaseConfigBuilder {
        DatabaseConfigBuilder::new()
    }

    /// Parse a JSON document; absent fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: DatabaseConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.embedding_concurrency == 0 {
            return Err(QuiverError::invalid_config(
                "embedding_concurrency must be at least 1",
            ));
        }
        Ok(())
    }

    pub(crate) fn settings(&self) -> Result<Arc<CollectionSettings>> {
        self.validate()?;
        let scoring_pool = if self.scoring_threads == 0 {
            None
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.scoring_threads)
                .thread_name(|i| format!("quiver-scoring-{i}"))
                .build()
                .map_err(|e| {
                    QuiverError::invalid_config(format!("failed to create scoring pool: {e}"))
                })?;
            Some(Arc::new(pool))
        };

        Ok(Arc::new(CollectionSettings {
            embedding_concurrency: self.embedding_concurrency,
            scoring_pool,
            sync_writes: self.sync_writes,
        }))
    }
}

/// Builder for DatabaseConfig.
#[derive(Debug, Default)]
pub struct DatabaseConfigBuilder {
    config: DatabaseConfig,
}

impl DatabaseConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist collections under `path`.
    pub fn persist_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.persist_directory = Some(path.into());
        self
    }

    /// Keep everything in memory.
    pub fn in_memory(mut self) -> Self {
        self.config.persist_directory = None;
        self
    }

    /// Set the maximum number of concurrent embedding calls.
    pub fn embedding_concurrency(mut self, concurrency: usize) -> Self {
        self.config.embedding_concurrency = concurrency;
        self
    }

    /// Set the number of scoring threads.
    pub fn scoring_threads(mut self, threads: usize) -> Self {
        self.config.scoring_threads = threads;
        self
    }

    /// Enable or disable fsync on record writes.
    pub fn sync_writes(mut self, sync: bool) -> Self {
        self.config.sync_writes = sync;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<DatabaseConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Runtime form of the config shared by every collection of one database.
#[derive(Debug)]
pub(crate) struct CollectionSettings {
    pub(crate) embedding_concurrency: usize,
    pub(crate) scoring_pool: Option<Arc<ThreadPool>>,
    pub(crate) sync_writes: bool,
}

impl Default for CollectionSettings {
    fn default() -> Self {
        Self {
            embedding_concurrency: default_embedding_concurrency(),
            scoring_pool: None,
            sync_writes: default_sync_writes(),
        }
    }
}

impl CollectionSettings {
    /// Number of disjoint candidate slices a query is split into.
    pub(crate) fn scoring_workers(&self) -> usize {
        match &self.scoring_pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
        .max(1)
    }

    /// Run `op` on the configured scoring pool.
    pub(crate) fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        match &self.scoring_pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }
}
