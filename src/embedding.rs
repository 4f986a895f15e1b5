//! Embedding providers.
//!
//! - [`embedder`]: the [`Embedder`](embedder::Embedder) trait
//! - [`function`]: closure-backed provider
//! - [`precomputed`]: provider for collections fed only with vectors
//! - `openai_embedder`: OpenAI-compatible HTTP provider (feature `embeddings-openai`)

pub mod embedder;
pub mod function;
#[cfg(feature = "embeddings-openai")]
pub mod openai_embedder;
pub mod precomputed;

use std::sync::Arc;

use self::embedder::EmbedderRef;

/// The provider used when a collection is created or reopened without one.
///
/// With the `embeddings-openai` feature this is the OpenAI API configured
/// from `OPENAI_API_KEY`; without it, text embedding is unavailable and only
/// pre-computed vectors are accepted.
pub fn default_embedder() -> EmbedderRef {
    #[cfg(feature = "embeddings-openai")]
    {
        Arc::new(openai_embedder::OpenAiEmbedder::from_env())
    }
    #[cfg(not(feature = "embeddings-openai"))]
    {
        Arc::new(precomputed::PrecomputedEmbedder::new())
    }
}
