//! Reference-context retrieval collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A top-K search against the reference index.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalQuery {
    pub query: String,
    pub k: usize,
    /// Restrict results to one category.
    pub category_filter: Option<String>,
}

impl RetrievalQuery {
    pub fn new(query: impl Into<String>, k: usize) -> Self {
        Self {
            query: query.into(),
            k,
            category_filter: None,
        }
    }

    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.category_filter = category;
        self
    }
}

/// One retrieved passage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub text: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Similarity or distance reported by the index, if any.
    #[serde(default)]
    pub score: Option<f32>,
}

impl RetrievedChunk {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Read-only search over a reference index. Must tolerate concurrent calls.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn search(&self, query: &RetrievalQuery) -> Result<Vec<RetrievedChunk>>;
}

/// Retriever with an empty index.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetriever;

#[async_trait]
impl Retriever for NoRetriever {
    async fn search(&self, _query: &RetrievalQuery) -> Result<Vec<RetrievedChunk>> {
        Ok(Vec::new())
    }
}

/// Fixed in-memory passages ranked by query-term overlap.
///
/// Good enough for local use and tests; real deployments plug in a vector
/// index behind [`Retriever`].
#[derive(Debug, Clone, Default)]
pub struct StaticRetriever {
    chunks: Vec<(Option<String>, RetrievedChunk)>,
}

impl StaticRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunk(mut self, category: Option<&str>, text: impl Into<String>) -> Self {
        let category = category.map(str::to_string);
        let mut chunk = RetrievedChunk::new(text);
        if let Some(category) = &category {
            chunk.metadata = serde_json::json!({ "category": category });
        }
        self.chunks.push((category, chunk));
        self
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn search(&self, query: &RetrievalQuery) -> Result<Vec<RetrievedChunk>> {
        let wanted = terms(&query.query);
        let mut scored: Vec<(usize, &RetrievedChunk)> = self
            .chunks
            .iter()
            .filter(|(category, _)| match &query.category_filter {
                Some(filter) => category.as_deref() == Some(filter.as_str()),
                None => true,
            })
            .map(|(_, chunk)| {
                let haystack = terms(&chunk.text);
                let hits = wanted.iter().filter(|t| haystack.contains(t)).count();
                (hits, chunk)
            })
            .filter(|(hits, _)| *hits > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored
            .into_iter()
            .take(query.k)
            .map(|(hits, chunk)| RetrievedChunk {
                score: Some(hits as f32),
                ..chunk.clone()
            })
            .collect())
    }
}
