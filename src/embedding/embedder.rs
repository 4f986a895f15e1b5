//! Embedding provider trait.
//!
//! An [`Embedder`] turns a piece of text into a fixed-length vector. The
//! collection engine calls it once per document whose vector was not supplied
//! and once per text query. Providers may be slow (network calls) and may
//! fail; the engine never retries, and it applies the caller's cancellation
//! by dropping the in-flight future.
//!
//! # Example
//!
//! ```
//! use async_trait::async_trait;
//! use quiver::embedding::embedder::Embedder;
//! use quiver::error::Result;
//!
//! #[derive(Debug)]
//! struct LengthEmbedder;
//!
//! #[async_trait]
//! impl Embedder for LengthEmbedder {
//!     async fn embed(&self, text: &str) -> Result<Vec<f32>> {
//!         Ok(vec![text.len() as f32, 1.0])
//!     }
//!
//!     fn name(&self) -> &str {
//!         "length"
//!     }
//! }
//! ```

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// Trait for converting text to embedding vectors.
///
/// Implementations must be `Send + Sync`: the ingestion pipeline keeps several
/// `embed` calls in flight at once against the same provider.
#[async_trait]
pub trait Embedder: Send + Sync + Debug {
    /// Generate an embedding vector for the given text.
    ///
    /// # Errors
    ///
    /// Any failure is surfaced to the caller of `add`/`query` as
    /// [`QuiverError::EmbeddingProvider`](crate::error::QuiverError::EmbeddingProvider).
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Get the name/identifier of this embedder, used in log output.
    fn name(&self) -> &str {
        "unknown"
    }
}

/// Shared handle to an embedding provider, as held by a collection.
pub type EmbedderRef = Arc<dyn Embedder>;
