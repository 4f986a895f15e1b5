//! Metadata and content filters.
//!
//! A [`QueryFilter`] pairs a conjunctive [`MetadataFilter`] with an optional
//! [`DocumentFilter`] over the document's text. Filters are evaluated before
//! scoring, so they bound the amount of similarity work a query performs.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::collection::document::Document;
use crate::error::{QuiverError, Result};

/// Exact-match metadata filter. Every pair must match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MetadataFilter {
    #[serde(default)]
    pub equals: HashMap<String, String>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `key` to be present with exactly `value`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.equals.insert(key.into(), value.into());
        self
    }

    pub fn matches(&self, metadata: &HashMap<String, String>) -> bool {
        self.equals.iter().all(|(key, expected)| {
            metadata
                .get(key)
                .map(|actual| actual == expected)
                .unwrap_or(false)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.equals.is_empty()
    }
}

impl From<HashMap<String, String>> for MetadataFilter {
    fn from(equals: HashMap<String, String>) -> Self {
        Self { equals }
    }
}

/// Operators supported on document content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentOperator {
    #[serde(rename = "$contains")]
    Contains,
    #[serde(rename = "$not_contains")]
    NotContains,
}

impl ContentOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentOperator::Contains => "$contains",
            ContentOperator::NotContains => "$not_contains",
        }
    }
}

impl FromStr for ContentOperator {
    type Err = QuiverError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "$contains" => Ok(ContentOperator::Contains),
            "$not_contains" => Ok(ContentOperator::NotContains),
            other => Err(QuiverError::invalid_argument(format!(
                "unsupported document filter operator '{other}'"
            ))),
        }
    }
}

impl fmt::Display for ContentOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-sensitive substring filter over document content.
///
/// A document without content contains nothing: `Contains` rejects it and
/// `NotContains` accepts it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFilter {
    pub operator: ContentOperator,
    pub value: String,
}

impl DocumentFilter {
    pub fn contains(value: impl Into<String>) -> Self {
        Self {
            operator: ContentOperator::Contains,
            value: value.into(),
        }
    }

    pub fn not_contains(value: impl Into<String>) -> Self {
        Self {
            operator: ContentOperator::NotContains,
            value: value.into(),
        }
    }

    /// Build a filter from an operator name such as `"$contains"`.
    pub fn parse(operator: &str, value: impl Into<String>) -> Result<Self> {
        Ok(Self {
            operator: operator.parse()?,
            value: value.into(),
        })
    }

    pub fn matches(&self, content: Option<&str>) -> bool {
        let found = content
            .map(|text| text.contains(self.value.as_str()))
            .unwrap_or(false);
        match self.operator {
            ContentOperator::Contains => found,
            ContentOperator::NotContains => !found,
        }
    }
}

/// Combined filter applied to a query's candidate set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct QueryFilter {
    #[serde(default)]
    pub metadata: MetadataFilter,
    #[serde(default)]
    pub document: Option<DocumentFilter>,
}

impl QueryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn where_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata = self.metadata.with(key, value);
        self
    }

    pub fn where_document(mut self, filter: DocumentFilter) -> Self {
        self.document = Some(filter);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty() && self.document.is_none()
    }

    pub fn matches(&self, document: &Document) -> bool {
        if !self.metadata.matches(&document.metadata) {
            return false;
        }
        match &self.document {
            Some(filter) => filter.matches(document.content.as_deref()),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(content: Option<&str>, source: &str) -> Document {
        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), source.to_string());
        Document {
            id: "x".into(),
            embedding: vec![1.0],
            content: content.map(str::to_string),
            metadata,
        }
    }

    #[test]
    fn test_metadata_filter_is_conjunctive() {
        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), "a".to_string());
        metadata.insert("lang".to_string(), "en".to_string());

        assert!(MetadataFilter::new().matches(&metadata));
        assert!(MetadataFilter::new().with("source", "a").matches(&metadata));
        assert!(
            !MetadataFilter::new()
                .with("source", "a")
                .with("lang", "ja")
                .matches(&metadata)
        );
        assert!(!MetadataFilter::new().with("missing", "a").matches(&metadata));
    }

    #[test]
    fn test_content_operators() {
        let contains = DocumentFilter::contains("wor");
        let not_contains = DocumentFilter::not_contains("wor");

        assert!(contains.matches(Some("world")));
        assert!(!contains.matches(Some("hello")));
        assert!(!contains.matches(Some("WORLD")));
        assert!(!contains.matches(None));

        assert!(!not_contains.matches(Some("world")));
        assert!(not_contains.matches(Some("hello")));
        assert!(not_contains.matches(None));
    }

    #[test]
    fn test_unsupported_operator_is_rejected() {
        assert!(DocumentFilter::parse("$contains", "x").is_ok());
        let err = DocumentFilter::parse("$regex", "x").unwrap_err();
        assert!(matches!(err, QuiverError::InvalidArgument(_)));

        let parsed: std::result::Result<DocumentFilter, _> =
            serde_json::from_str(r#"{"operator": "$starts_with", "value": "x"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_query_filter_combines_both() {
        let filter = QueryFilter::new()
            .where_metadata("source", "b")
            .where_document(DocumentFilter::contains("wor"));

        assert!(filter.matches(&doc(Some("world"), "b")));
        assert!(!filter.matches(&doc(Some("world"), "a")));
        assert!(!filter.matches(&doc(Some("hello"), "b")));
        assert!(QueryFilter::new().is_empty());
        assert!(!filter.is_empty());
    }
}
