//! In-memory [`SearchBackend`] for tests and local development.
//!
//! Records live in a `HashMap` behind a `tokio::sync::RwLock`. Scoring is
//! brute force: the keyword score is the fraction of query terms found in a
//! chunk, the vector score is cosine similarity clamped at zero, and hybrid
//! queries blend the two with `hybrid_alpha`.

use std::collections::{BTreeMap, HashMap};

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::embedding::cosine_similarity;
use crate::models::{ChunkMetadata, RetrievedChunk};

use super::{HybridQuery, IndexRecord, IndexSchema, RecordOutcome, SearchBackend};

struct StoredIndex {
    dims: Option<usize>,
    records: HashMap<String, IndexRecord>,
}

/// In-memory index double.
pub struct InMemoryIndex {
    indexes: RwLock<BTreeMap<String, StoredIndex>>,
    hybrid_alpha: f64,
}

impl InMemoryIndex {
    /// `hybrid_alpha` weights the vector score: `(1-α)*keyword + α*vector`.
    pub fn new(hybrid_alpha: f64) -> Self {
        Self {
            indexes: RwLock::new(BTreeMap::new()),
            hybrid_alpha: hybrid_alpha.clamp(0.0, 1.0),
        }
    }

    /// Number of records in `name`, or `None` if the index does not exist.
    pub async fn len(&self, name: &str) -> Option<usize> {
        self.indexes.read().await.get(name).map(|i| i.records.len())
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new(0.6)
    }
}

/// Fraction of distinct lowercase query terms that occur in `text`.
fn keyword_score(terms: &[String], text: &str) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let text_lower = text.to_lowercase();
    let matches = terms.iter().filter(|t| text_lower.contains(t.as_str())).count();
    matches as f64 / terms.len() as f64
}

fn query_terms(text: &str) -> Vec<String> {
    let mut terms: Vec<String> = text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    terms.sort();
    terms.dedup();
    terms
}

#[async_trait]
impl SearchBackend for InMemoryIndex {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn create_or_update_index(&self, schema: &IndexSchema) -> Result<()> {
        let mut indexes = self.indexes.write().await;
        let entry = indexes.entry(schema.name.clone()).or_insert_with(|| StoredIndex {
            dims: None,
            records: HashMap::new(),
        });
        entry.dims = schema.vector_dims();
        Ok(())
    }

    async fn delete_index(&self, name: &str) -> Result<()> {
        self.indexes.write().await.remove(name);
        Ok(())
    }

    async fn upload(&self, name: &str, records: &[IndexRecord]) -> Result<Vec<RecordOutcome>> {
        let mut indexes = self.indexes.write().await;
        let Some(index) = indexes.get_mut(name) else {
            bail!("index '{}' does not exist", name);
        };

        let outcomes = records
            .iter()
            .map(|r| match index.dims {
                Some(dims) if dims != r.content_vector.len() => RecordOutcome {
                    id: r.id.clone(),
                    succeeded: false,
                    error: Some(format!(
                        "vector has {} dimensions, index expects {}",
                        r.content_vector.len(),
                        dims
                    )),
                },
                _ => {
                    index.records.insert(r.id.clone(), r.clone());
                    RecordOutcome {
                        id: r.id.clone(),
                        succeeded: true,
                        error: None,
                    }
                }
            })
            .collect();
        Ok(outcomes)
    }

    async fn search(&self, name: &str, query: &HybridQuery) -> Result<Vec<RetrievedChunk>> {
        let indexes = self.indexes.read().await;
        let Some(index) = indexes.get(name) else {
            bail!("index '{}' does not exist", name);
        };

        let terms = query_terms(&query.text);
        let alpha = if query.hybrid { self.hybrid_alpha } else { 1.0 };

        let mut scored: Vec<(f64, &IndexRecord)> = index
            .records
            .values()
            .map(|r| {
                let v = (cosine_similarity(&query.vector, &r.content_vector) as f64).max(0.0);
                let k = if query.hybrid {
                    keyword_score(&terms, &r.content)
                } else {
                    0.0
                };
                ((1.0 - alpha) * k + alpha * v, r)
            })
            .filter(|(score, _)| *score > 0.0)
            .collect();

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.id.cmp(&b.1.id))
        });
        scored.truncate(query.top_k);

        Ok(scored
            .into_iter()
            .map(|(score, r)| RetrievedChunk {
                content: r.content.clone(),
                score,
                metadata: ChunkMetadata {
                    source_document: r.source_document.clone(),
                    page_number: Some(r.page_number),
                    chunk_id: r.chunk_id.clone(),
                    source_url: r.source_url.clone(),
                },
            })
            .collect())
    }

    async fn list_ids(&self, name: &str, limit: usize) -> Result<Vec<String>> {
        let indexes = self.indexes.read().await;
        let Some(index) = indexes.get(name) else {
            return Ok(Vec::new());
        };
        let mut ids: Vec<String> = index.records.keys().cloned().collect();
        ids.sort();
        ids.truncate(limit);
        Ok(ids)
    }

    async fn delete_records(&self, name: &str, ids: &[String]) -> Result<usize> {
        let mut indexes = self.indexes.write().await;
        let Some(index) = indexes.get_mut(name) else {
            return Ok(0);
        };
        Ok(ids.iter().filter(|id| index.records.remove(*id).is_some()).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, content: &str, vector: Vec<f32>) -> IndexRecord {
        IndexRecord {
            id: id.into(),
            content: content.into(),
            content_vector: vector,
            source_document: "doc.pdf".into(),
            page_number: 1,
            source_url: "https://example.com/doc.pdf".into(),
            chunk_id: id.into(),
        }
    }

    async fn seeded() -> InMemoryIndex {
        let index = InMemoryIndex::new(0.5);
        index
            .create_or_update_index(&IndexSchema::for_chunks("t", 2))
            .await
            .unwrap();
        index
            .upload(
                "t",
                &[
                    record("a", "refund policy for hardware", vec![1.0, 0.0]),
                    record("b", "office opening hours", vec![0.0, 1.0]),
                    record("c", "refund window is thirty days", vec![0.7, 0.7]),
                ],
            )
            .await
            .unwrap();
        index
    }

    #[tokio::test]
    async fn test_vector_only_ranking() {
        let index = seeded().await;
        let q = HybridQuery {
            text: "ignored".into(),
            vector: vec![1.0, 0.0],
            top_k: 5,
            hybrid: false,
        };
        let hits = index.search("t", &q).await.unwrap();
        assert_eq!(hits[0].metadata.chunk_id, "a");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        // "b" is orthogonal and scores zero
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_hybrid_blends_keyword_score() {
        let index = seeded().await;
        let q = HybridQuery {
            text: "refund window".into(),
            vector: vec![0.0, 1.0],
            top_k: 3,
            hybrid: true,
        };
        let hits = index.search("t", &q).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.metadata.chunk_id.as_str()).collect();
        // c matches both terms and half the vector
        assert_eq!(ids[0], "c");
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_top_k_truncates() {
        let index = seeded().await;
        let q = HybridQuery {
            text: "refund".into(),
            vector: vec![1.0, 1.0],
            top_k: 1,
            hybrid: true,
        };
        assert_eq!(index.search("t", &q).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_per_record_failure() {
        let index = seeded().await;
        let outcomes = index
            .upload("t", &[record("d", "x", vec![1.0, 2.0, 3.0]), record("e", "y", vec![1.0, 0.0])])
            .await
            .unwrap();
        assert!(!outcomes[0].succeeded);
        assert!(outcomes[1].succeeded);
        assert_eq!(index.len("t").await, Some(4));
    }

    #[tokio::test]
    async fn test_upload_to_missing_index_fails() {
        let index = InMemoryIndex::default();
        assert!(index.upload("missing", &[record("a", "x", vec![1.0])]).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let index = seeded().await;
        let ids = index.list_ids("t", 2).await.unwrap();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(index.delete_records("t", &ids).await.unwrap(), 2);
        assert_eq!(index.len("t").await, Some(1));
        index.delete_index("t").await.unwrap();
        assert_eq!(index.len("t").await, None);
        // deleting twice is fine
        index.delete_index("t").await.unwrap();
    }
}
