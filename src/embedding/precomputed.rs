//! Embedder for pre-computed vectors.
//!
//! [`PrecomputedEmbedder`] performs no embedding at all. It is the provider of
//! a collection that is only ever fed with vectors (and queried with vectors),
//! and the library default when no HTTP provider is compiled in.
//!
//! Any attempt to embed text returns an error, which the engine reports as an
//! embedding provider failure.

use async_trait::async_trait;

use crate::embedding::embedder::Embedder;
use crate::error::{QuiverError, Result};

/// An embedder that rejects every text, used for pre-computed vectors.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use quiver::embedding::embedder::Embedder;
/// use quiver::embedding::precomputed::PrecomputedEmbedder;
///
/// let embedder: Arc<dyn Embedder> = Arc::new(PrecomputedEmbedder::new());
/// assert_eq!(embedder.name(), "precomputed");
/// ```
#[derive(Debug, Clone, Default)]
pub struct PrecomputedEmbedder;

impl PrecomputedEmbedder {
    /// Creates a new `PrecomputedEmbedder`.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Embedder for PrecomputedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(QuiverError::embedding_provider(
            "no embedding provider configured; supply pre-computed vectors",
        ))
    }

    fn name(&self) -> &str {
        "precomputed"
    }
}
