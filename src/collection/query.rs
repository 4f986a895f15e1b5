//! Query requests and the brute-force query executor.
//!
//! Execution: filter the snapshot down to the candidate set, split the
//! candidates into one disjoint slice per scoring worker, score each slice
//! into a worker-local [`TopKCollector`], then merge the collectors into the
//! global top-K.

use std::collections::HashMap;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::collection::collector::{ScoredDocument, TopKCollector};
use crate::collection::document::Document;
use crate::collection::filter::{DocumentFilter, QueryFilter};
use crate::config::CollectionSettings;
use crate::error::{QuiverError, Result};
use crate::vector::similarity::cosine_similarity;

/// Candidates scored between two cancellation checks inside a worker.
pub const SCORING_CHECK_INTERVAL: usize = 1024;

fn default_n_results() -> usize {
    10
}

/// What to search with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryInput {
    /// Text embedded once through the collection's provider.
    Text(String),
    /// A ready-made query vector.
    Embedding(Vec<f32>),
}

/// Request model for a collection query.
///
/// ```
/// use quiver::collection::filter::DocumentFilter;
/// use quiver::collection::query::QueryRequest;
///
/// let request = QueryRequest::text("what is rust?")
///     .n_results(3)
///     .where_metadata("source", "docs")
///     .where_document(DocumentFilter::contains("rust"));
/// assert_eq!(request.n_results, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub input: QueryInput,
    /// Maximum number of results; clamped to the candidate count.
    #[serde(default = "default_n_results")]
    pub n_results: usize,
    #[serde(default)]
    pub filter: QueryFilter,
}

impl QueryRequest {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            input: QueryInput::Text(text.into()),
            n_results: default_n_results(),
            filter: QueryFilter::default(),
        }
    }

    pub fn embedding(embedding: Vec<f32>) -> Self {
        Self {
            input: QueryInput::Embedding(embedding),
            n_results: default_n_results(),
            filter: QueryFilter::default(),
        }
    }

    pub fn n_results(mut self, n_results: usize) -> Self {
        self.n_results = n_results;
        self
    }

    pub fn filter(mut self, filter: QueryFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn where_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filter = self.filter.where_metadata(key, value);
        self
    }

    pub fn where_document(mut self, filter: DocumentFilter) -> Self {
        self.filter = self.filter.where_document(filter);
        self
    }
}

/// One ranked result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub id: String,
    pub similarity: f32,
    pub metadata: HashMap<String, String>,
    pub content: Option<String>,
}

impl From<ScoredDocument> for QueryResult {
    fn from(scored: ScoredDocument) -> Self {
        let document = scored.document;
        Self {
            id: document.id.clone(),
            similarity: scored.similarity,
            metadata: document.metadata.clone(),
            content: document.content.clone(),
        }
    }
}

/// Score `snapshot` against `query` and return the top `n_results`.
///
/// `query` must already have the collection's dimension.
pub(crate) fn execute(
    settings: &CollectionSettings,
    snapshot: Vec<Arc<Document>>,
    query: &[f32],
    n_results: usize,
    filter: &QueryFilter,
    cancel: &CancellationToken,
) -> Result<Vec<QueryResult>> {
    let candidates: Vec<Arc<Document>> = if filter.is_empty() {
        snapshot
    } else {
        snapshot
            .into_iter()
            .filter(|document| filter.matches(document))
            .collect()
    };

    let k = n_results.min(candidates.len());
    if k == 0 {
        return Ok(Vec::new());
    }
    check_cancelled(cancel)?;

    let workers = settings.scoring_workers();
    let slice_len = candidates.len().div_ceil(workers);
    log::debug!(
        "scoring {} candidates in slices of {} (k = {})",
        candidates.len(),
        slice_len,
        k
    );

    let merged = settings.install(|| {
        candidates
            .par_chunks(slice_len)
            .map(|slice| score_slice(slice, query, k, cancel))
            .try_reduce(|| TopKCollector::new(k), |a, b| Ok(a.merge(b)))
    })?;
    log::debug!("scored {} candidates, kept {}", merged.seen(), k);

    Ok(merged.into_sorted().into_iter().map(QueryResult::from).collect())
}

fn score_slice(
    slice: &[Arc<Document>],
    query: &[f32],
    k: usize,
    cancel: &CancellationToken,
) -> Result<TopKCollector> {
    let mut collector = TopKCollector::new(k);
    for batch in slice.chunks(SCORING_CHECK_INTERVAL) {
        check_cancelled(cancel)?;
        for document in batch {
            let similarity = cosine_similarity(query, &document.embedding)?;
            collector.collect(ScoredDocument {
                similarity,
                document: Arc::clone(document),
            });
        }
    }
    Ok(collector)
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(QuiverError::cancelled("query cancelled during scoring"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;

    fn corpus(n: usize) -> Vec<Arc<Document>> {
        (0..n)
            .map(|i| {
                let angle = i as f32 * 0.1;
                let mut metadata = HashMap::new();
                metadata.insert("parity".to_string(), (i % 2).to_string());
                Arc::new(
                    Document::new(format!("doc-{i:04}"), vec![angle.cos(), angle.sin(), 0.5])
                        .with_metadata(metadata),
                )
            })
            .collect()
    }

    fn settings(threads: usize) -> Arc<CollectionSettings> {
        DatabaseConfig::builder()
            .scoring_threads(threads)
            .build()
            .unwrap()
            .settings()
            .unwrap()
    }

    #[test]
    fn test_results_match_full_sort() {
        let docs = corpus(500);
        let query = [1.0, 0.2, 0.5];
        let results = execute(
            &settings(4),
            docs.clone(),
            &query,
            25,
            &QueryFilter::default(),
            &CancellationToken::new(),
        )
        .unwrap();

        let mut expected: Vec<(f32, String)> = docs
            .iter()
            .map(|d| (cosine_similarity(&query, &d.embedding).unwrap(), d.id.clone()))
            .collect();
        expected.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        let got: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        let want: Vec<&str> = expected.iter().take(25).map(|(_, id)| id.as_str()).collect();
        assert_eq!(got, want);
    }

    #[test]
    fn test_filter_applies_before_scoring() {
        let results = execute(
            &settings(2),
            corpus(50),
            &[1.0, 0.0, 0.0],
            100,
            &QueryFilter::new().where_metadata("parity", "1"),
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(results.len(), 25);
        assert!(results.iter().all(|r| r.metadata["parity"] == "1"));
    }

    #[test]
    fn test_cancelled_query_returns_no_results() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = execute(
            &settings(2),
            corpus(10),
            &[1.0, 0.0, 0.0],
            3,
            &QueryFilter::default(),
            &cancel,
        )
        .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_empty_candidate_set() {
        let results = execute(
            &settings(2),
            Vec::new(),
            &[1.0],
            5,
            &QueryFilter::default(),
            &CancellationToken::new(),
        )
        .unwrap();
        assert!(results.is_empty());
    }
}
