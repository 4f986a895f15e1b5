//! Document types.
//!
//! [`Document`] is the stored form owned by a collection. [`DocumentInput`]
//! is one row handed to `add_documents`, whose vector may be missing, and
//! [`AddDocuments`] is the column-oriented batch accepted by `add`.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{QuiverError, Result};

/// A stored document: ID, embedding, optional content, metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Identifier, unique within the collection.
    pub id: String,
    /// Embedding vector; its length equals the collection dimension.
    pub embedding: Vec<f32>,
    /// Optional textual content.
    #[serde(default)]
    pub content: Option<String>,
    /// String-to-string metadata.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Document {
    /// Create a document from an ID and its embedding.
    pub fn new(id: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            embedding,
            content: None,
            metadata: HashMap::new(),
        }
    }

    /// Attach textual content.
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Replace the metadata map.
    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Get the embedding dimension.
    pub fn dimension(&self) -> usize {
        self.embedding.len()
    }
}

/// One document to add. Without an embedding, its content is embedded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentInput {
    pub id: String,
    pub embedding: Option<Vec<f32>>,
    pub content: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl DocumentInput {
    /// Create an input with only an ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Supply a pre-computed embedding.
    pub fn embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Set the content (embedded when no vector is supplied).
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Add one metadata entry.
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Replace the metadata map.
    pub fn metadata_map(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Column-oriented batch: parallel sequences indexed like `ids`.
///
/// ```
/// use quiver::collection::document::AddDocuments;
///
/// let batch = AddDocuments::new(vec!["d1".into(), "d2".into()])
///     .embeddings(vec![vec![1.0, 0.0], vec![0.0, 1.0]])
///     .contents(vec!["hello".into(), "world".into()]);
/// assert_eq!(batch.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddDocuments {
    pub ids: Vec<String>,
    pub embeddings: Option<Vec<Vec<f32>>>,
    pub metadatas: Option<Vec<HashMap<String, String>>>,
    pub contents: Option<Vec<String>>,
}

impl AddDocuments {
    pub fn new(ids: Vec<String>) -> Self {
        Self {
            ids,
            ..Default::default()
        }
    }

    pub fn embeddings(mut self, embeddings: Vec<Vec<f32>>) -> Self {
        self.embeddings = Some(embeddings);
        self
    }

    pub fn metadatas(mut self, metadatas: Vec<HashMap<String, String>>) -> Self {
        self.metadatas = Some(metadatas);
        self
    }

    pub fn contents(mut self, contents: Vec<String>) -> Self {
        self.contents = Some(contents);
        self
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Check the parallel sequences and split them into rows.
    pub fn into_inputs(self) -> Result<Vec<DocumentInput>> {
        let count = self.ids.len();
        check_len("embeddings", self.embeddings.as_ref().map(Vec::len), count)?;
        check_len("metadatas", self.metadatas.as_ref().map(Vec::len), count)?;
        check_len("contents", self.contents.as_ref().map(Vec::len), count)?;

        let mut embeddings = self.embeddings.map(Vec::into_iter);
        let mut metadatas = self.metadatas.map(Vec::into_iter);
        let mut contents = self.contents.map(Vec::into_iter);

        let inputs = self
            .ids
            .into_iter()
            .map(|id| DocumentInput {
                id,
                embedding: embeddings.as_mut().and_then(Iterator::next),
                content: contents.as_mut().and_then(Iterator::next),
                metadata: metadatas
                    .as_mut()
                    .and_then(Iterator::next)
                    .unwrap_or_default(),
            })
            .collect();
        Ok(inputs)
    }
}

fn check_len(field: &str, len: Option<usize>, expected: usize) -> Result<()> {
    match len {
        Some(len) if len != expected => Err(QuiverError::invalid_argument(format!(
            "{field} has {len} entries but ids has {expected}"
        ))),
        _ => Ok(()),
    }
}

/// Reject empty batches, empty IDs and IDs repeated within one call.
pub(crate) fn validate_ids<'a>(ids: impl IntoIterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if id.is_empty() {
            return Err(QuiverError::invalid_argument("document id is empty"));
        }
        if !seen.insert(id) {
            return Err(QuiverError::invalid_argument(format!(
                "duplicate document id '{id}' in one add call"
            )));
        }
    }
    if seen.is_empty() {
        return Err(QuiverError::invalid_argument("ids must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_inputs_aligns_columns() {
        let mut meta = HashMap::new();
        meta.insert("source".to_string(), "a".to_string());
        let inputs = AddDocuments::new(vec!["d1".into(), "d2".into()])
            .metadatas(vec![meta.clone(), HashMap::new()])
            .contents(vec!["hello".into(), "world".into()])
            .into_inputs()
            .unwrap();

        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].id, "d1");
        assert_eq!(inputs[0].metadata, meta);
        assert_eq!(inputs[1].content.as_deref(), Some("world"));
        assert!(inputs[1].embedding.is_none());
    }

    #[test]
    fn test_into_inputs_rejects_length_mismatch() {
        let result = AddDocuments::new(vec!["d1".into(), "d2".into()])
            .contents(vec!["only one".into()])
            .into_inputs();
        assert!(matches!(result, Err(QuiverError::InvalidArgument(_))));
    }

    #[test]
    fn test_validate_ids() {
        assert!(validate_ids(["a", "b"]).is_ok());
        assert!(validate_ids(Vec::<&str>::new()).is_err());
        assert!(validate_ids(["a", ""]).is_err());
        assert!(validate_ids(["a", "b", "a"]).is_err());
    }
}
