//! Closure-backed embedder.
//!
//! [`FnEmbedder`] adapts a plain synchronous function into an [`Embedder`].
//! It is the simplest way to plug in a local model, a lookup table, or a
//! literal passthrough in tests.

use std::fmt;

use async_trait::async_trait;

use crate::embedding::embedder::Embedder;
use crate::error::Result;

type EmbedFn = dyn Fn(&str) -> Result<Vec<f32>> + Send + Sync;

/// An embedder that calls a user-supplied function.
///
/// # Example
///
/// ```
/// use quiver::embedding::function::FnEmbedder;
///
/// let embedder = FnEmbedder::new("bytes", |text: &str| {
///     Ok(vec![text.len() as f32, text.bytes().filter(|b| *b == b' ').count() as f32])
/// });
/// ```
pub struct FnEmbedder {
    name: String,
    func: Box<EmbedFn>,
}

impl FnEmbedder {
    /// Wrap `func` under the given provider name.
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&str) -> Result<Vec<f32>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }
}

impl fmt::Debug for FnEmbedder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnEmbedder")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl Embedder for FnEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        (self.func)(text)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
