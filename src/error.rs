//! Error types for the Quiver library.
//!
//! All fallible operations return [`Result`], whose error is the
//! [`QuiverError`] enum. The variants follow the failure classes of the
//! collection engine: bad caller input is rejected before any mutation,
//! provider and persistence failures are wrapped, and internal consistency
//! failures are reported as invariant violations.
//!
//! # Examples
//!
//! ```
//! use quiver::error::{QuiverError, Result};
//!
//! fn example_operation() -> Result<()> {
//!     Err(QuiverError::invalid_argument("collection name is empty"))
//! }
//!
//! match example_operation() {
//!     Ok(_) => println!("Success"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::io;
use std::path::Path;

use thiserror::Error;

/// The main error type for Quiver operations.
#[derive(Error, Debug)]
pub enum QuiverError {
    /// Rejected caller input (empty names, mismatched lengths, bad filters).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A vector's length disagrees with the collection's established dimension.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Failure reported by an embedding provider.
    #[error("Embedding provider error: {0}")]
    EmbeddingProvider(String),

    /// Filesystem or record decoding failure in the persistence layer.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The caller's cancellation token fired.
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Internal consistency failure; indicates a bug rather than bad input.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// I/O errors on caller-supplied streams (export/import).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic anyhow error
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with QuiverError.
pub type Result<T> = std::result::Result<T, QuiverError>;

impl QuiverError {
    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        QuiverError::InvalidArgument(msg.into())
    }

    /// Create a new dimension mismatch error.
    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        QuiverError::DimensionMismatch { expected, actual }
    }

    /// Create a new embedding provider error.
    pub fn embedding_provider<S: Into<String>>(msg: S) -> Self {
        QuiverError::EmbeddingProvider(msg.into())
    }

    /// Create a new persistence error.
    pub fn persistence<S: Into<String>>(msg: S) -> Self {
        QuiverError::Persistence(msg.into())
    }

    /// Wrap an I/O failure on `path` as a persistence error.
    pub fn persistence_io(action: &str, path: &Path, err: io::Error) -> Self {
        QuiverError::Persistence(format!("{action} '{}': {err}", path.display()))
    }

    /// Create a new cancelled error.
    pub fn cancelled<S: Into<String>>(msg: S) -> Self {
        QuiverError::Cancelled(msg.into())
    }

    /// Create a new invariant violation error.
    pub fn invariant<S: Into<String>>(msg: S) -> Self {
        QuiverError::InvariantViolation(msg.into())
    }

    /// Create a new invalid config error.
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        QuiverError::InvalidArgument(format!("invalid configuration: {}", msg.into()))
    }

    /// Whether this error was caused by cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, QuiverError::Cancelled(_))
    }
}
