//! Embedding pipeline for `add`.
//!
//! Inputs that already carry a vector pass through; the rest have their
//! content embedded with at most `embedding_concurrency` provider calls in
//! flight. Results keep input order, and the first failure aborts the whole
//! batch so nothing computed so far is ever committed.

use futures::stream::{self, StreamExt, TryStreamExt};
use tokio_util::sync::CancellationToken;

use crate::collection::document::{Document, DocumentInput};
use crate::embedding::embedder::Embedder;
use crate::error::{QuiverError, Result};
use crate::vector::similarity::is_finite;

/// Resolve every input into a storable document.
pub(crate) async fn embed_inputs(
    embedder: &dyn Embedder,
    inputs: Vec<DocumentInput>,
    concurrency: usize,
    cancel: &CancellationToken,
) -> Result<Vec<Document>> {
    if cancel.is_cancelled() {
        return Err(QuiverError::cancelled("add cancelled before embedding"));
    }

    let pending = inputs.iter().filter(|i| i.embedding.is_none()).count();
    if pending > 0 {
        log::debug!(
            "embedding {} of {} documents with '{}' (concurrency {})",
            pending,
            inputs.len(),
            embedder.name(),
            concurrency
        );
    }

    stream::iter(inputs)
        .map(|input| resolve(embedder, input, cancel))
        .buffered(concurrency.max(1))
        .try_collect()
        .await
}

async fn resolve(
    embedder: &dyn Embedder,
    input: DocumentInput,
    cancel: &CancellationToken,
) -> Result<Document> {
    let DocumentInput {
        id,
        embedding,
        content,
        metadata,
    } = input;

    let embedding = match embedding {
        Some(embedding) => embedding,
        None => {
            let text = content.as_deref().ok_or_else(|| {
                QuiverError::invalid_argument(format!(
                    "document '{id}' has neither an embedding nor content"
                ))
            })?;
            embed_text(embedder, text, cancel).await?
        }
    };
    if !is_finite(&embedding) {
        return Err(QuiverError::invalid_argument(format!(
            "embedding of document '{id}' contains NaN or infinite values"
        )));
    }

    Ok(Document {
        id,
        embedding,
        content,
        metadata,
    })
}

/// One provider call raced against `cancel`. Dropping the losing future
/// abandons the provider request.
pub(crate) async fn embed_text(
    embedder: &dyn Embedder,
    text: &str,
    cancel: &CancellationToken,
) -> Result<Vec<f32>> {
    if cancel.is_cancelled() {
        return Err(QuiverError::cancelled("embedding cancelled"));
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(QuiverError::cancelled("embedding cancelled")),
        result = embedder.embed(text) => result.map_err(wrap_provider_error),
    }
}

fn wrap_provider_error(err: QuiverError) -> QuiverError {
    match err {
        QuiverError::EmbeddingProvider(_) | QuiverError::Cancelled(_) => err,
        other => QuiverError::embedding_provider(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::embedding::function::FnEmbedder;

    #[derive(Debug, Default)]
    struct CountingEmbedder {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![text.len() as f32, 1.0])
        }
    }

    #[tokio::test]
    async fn test_order_and_bounded_concurrency() {
        let embedder = CountingEmbedder::default();
        let inputs: Vec<DocumentInput> = (0..12)
            .map(|i| DocumentInput::new(format!("d{i}")).content("x".repeat(i + 1)))
            .collect();

        let docs = embed_inputs(&embedder, inputs, 3, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(docs.len(), 12);
        for (i, doc) in docs.iter().enumerate() {
            assert_eq!(doc.id, format!("d{i}"));
            assert_eq!(doc.embedding[0], (i + 1) as f32);
        }
        assert!(embedder.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_supplied_vectors_skip_provider() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let embedder = FnEmbedder::new("counting", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(vec![0.0, 1.0])
        });
        let inputs = vec![
            DocumentInput::new("a").embedding(vec![1.0, 0.0]).content("a"),
            DocumentInput::new("b").content("b"),
        ];

        let docs = embed_inputs(&embedder, inputs, 2, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(docs[0].embedding, vec![1.0, 0.0]);
        assert_eq!(docs[1].embedding, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_provider_failure_is_wrapped() {
        let embedder = FnEmbedder::new("flaky", |text: &str| {
            if text == "bad" {
                Err(anyhow::anyhow!("upstream 500").into())
            } else {
                Ok(vec![1.0])
            }
        });
        let inputs = vec![
            DocumentInput::new("a").content("good"),
            DocumentInput::new("b").content("bad"),
        ];

        let err = embed_inputs(&embedder, inputs, 2, &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            QuiverError::EmbeddingProvider(msg) => assert!(msg.contains("upstream 500")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_rejects_missing_content_and_non_finite() {
        let embedder = FnEmbedder::new("nan", |_| Ok(vec![f32::NAN]));

        let err = embed_inputs(
            &embedder,
            vec![DocumentInput::new("empty")],
            1,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, QuiverError::InvalidArgument(_)));

        let err = embed_inputs(
            &embedder,
            vec![DocumentInput::new("x").content("text")],
            1,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, QuiverError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_before_provider() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let embedder = FnEmbedder::new("counting", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1.0])
        });
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = embed_inputs(
            &embedder,
            vec![DocumentInput::new("a").content("a")],
            1,
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
