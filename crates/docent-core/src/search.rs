//! Search orchestration over a [`SearchBackend`].
//!
//! [`SearchOrchestrator`] owns the chunk index name and schema and runs the
//! three index workflows:
//!
//! - **Schema**: idempotent create-or-update, delete, clear.
//! - **Upsert**: chunks + vectors → records, uploaded one batch at a time.
//!   A batch that fails as a whole counts every record in it as failed and
//!   the next batch is still attempted. At most [`MAX_REPORTED_ERRORS`]
//!   error descriptions are kept.
//! - **Query**: hybrid (lexical + vector, fused by the engine) or
//!   vector-only, returning at most `top_k` results, best first.

use std::sync::Arc;

use anyhow::{Context, Result};
use thiserror::Error;

use crate::index::{HybridQuery, IndexRecord, IndexSchema, SearchBackend};
use crate::models::{DocumentChunk, IndexBatchResult, RetrievedChunk};

/// Maximum number of error descriptions kept in an [`IndexBatchResult`].
pub const MAX_REPORTED_ERRORS: usize = 5;

/// Page size used when clearing documents out of an index.
const CLEAR_PAGE_SIZE: usize = 1000;

/// Typed failures of index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("{chunks} chunks but {vectors} vectors; every chunk needs exactly one vector")]
    LengthMismatch { chunks: usize, vectors: usize },
}

/// Index settings, decoupled from application config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSettings {
    pub index_name: String,
    /// Dimension of the embedding vectors.
    pub dims: usize,
    /// Records per upload call.
    pub batch_size: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            index_name: "rag-documents".to_string(),
            dims: 1536,
            batch_size: 100,
        }
    }
}

/// Coordinates schema management, batched upserts and queries.
pub struct SearchOrchestrator {
    backend: Arc<dyn SearchBackend>,
    settings: IndexSettings,
}

impl SearchOrchestrator {
    pub fn new(backend: Arc<dyn SearchBackend>, settings: IndexSettings) -> Self {
        Self { backend, settings }
    }

    pub fn index_name(&self) -> &str {
        &self.settings.index_name
    }

    pub fn backend_kind(&self) -> &'static str {
        self.backend.kind()
    }

    /// The schema this orchestrator maintains.
    pub fn schema(&self) -> IndexSchema {
        IndexSchema::for_chunks(&self.settings.index_name, self.settings.dims)
    }

    /// Create the index, or update it in place if it already exists.
    pub async fn ensure_index(&self) -> Result<()> {
        self.backend
            .create_or_update_index(&self.schema())
            .await
            .with_context(|| format!("failed to create or update index '{}'", self.index_name()))?;
        tracing::info!(index = self.index_name(), "index ready");
        Ok(())
    }

    /// Drop the index entirely. A missing index is not an error.
    pub async fn delete_index(&self) -> Result<()> {
        self.backend
            .delete_index(self.index_name())
            .await
            .with_context(|| format!("failed to delete index '{}'", self.index_name()))?;
        tracing::info!(index = self.index_name(), "index deleted");
        Ok(())
    }

    /// Remove every record while keeping the index. Returns how many were removed.
    pub async fn clear_documents(&self) -> Result<usize> {
        let mut removed = 0;
        loop {
            let ids = self
                .backend
                .list_ids(self.index_name(), CLEAR_PAGE_SIZE)
                .await
                .context("failed to list index records")?;
            if ids.is_empty() {
                break;
            }
            let deleted = self
                .backend
                .delete_records(self.index_name(), &ids)
                .await
                .context("failed to delete index records")?;
            removed += deleted;
            if deleted == 0 {
                break;
            }
        }
        tracing::info!(index = self.index_name(), removed, "cleared documents");
        Ok(removed)
    }

    /// Upload chunks with their vectors in batches.
    ///
    /// Errors only on a chunk/vector count mismatch; upload failures are
    /// accounted for in the returned [`IndexBatchResult`].
    pub async fn upsert(
        &self,
        chunks: &[DocumentChunk],
        vectors: Vec<Vec<f32>>,
    ) -> Result<IndexBatchResult, IndexError> {
        if chunks.len() != vectors.len() {
            return Err(IndexError::LengthMismatch {
                chunks: chunks.len(),
                vectors: vectors.len(),
            });
        }

        let records: Vec<IndexRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexRecord::from_chunk(chunk, vector))
            .collect();

        let mut result = IndexBatchResult {
            attempted: records.len(),
            ..Default::default()
        };

        let batch_size = self.settings.batch_size.max(1);
        for (i, batch) in records.chunks(batch_size).enumerate() {
            match self.backend.upload(self.index_name(), batch).await {
                Ok(outcomes) => {
                    for outcome in outcomes {
                        if outcome.succeeded {
                            result.succeeded += 1;
                        } else {
                            result.failed += 1;
                            push_error(
                                &mut result,
                                format!(
                                    "Failed to index {}: {}",
                                    outcome.id,
                                    outcome.error.as_deref().unwrap_or("unknown error")
                                ),
                            );
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(batch = i + 1, records = batch.len(), error = %e, "batch upload failed");
                    result.failed += batch.len();
                    push_error(&mut result, format!("Batch {} upload error: {}", i + 1, e));
                }
            }
        }

        tracing::info!(
            index = self.index_name(),
            succeeded = result.succeeded,
            failed = result.failed,
            "upsert finished"
        );
        Ok(result)
    }

    /// Run a query and return at most `top_k` results, best first.
    pub async fn query(
        &self,
        text: &str,
        vector: Vec<f32>,
        top_k: usize,
        hybrid: bool,
    ) -> Result<Vec<RetrievedChunk>> {
        let query = HybridQuery {
            text: text.to_string(),
            vector,
            top_k,
            hybrid,
        };
        let mut results = self
            .backend
            .search(self.index_name(), &query)
            .await
            .context("search request failed")?;

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(top_k);

        tracing::info!(results = results.len(), hybrid, "search finished");
        Ok(results)
    }
}

fn push_error(result: &mut IndexBatchResult, message: String) {
    if result.errors.len() < MAX_REPORTED_ERRORS {
        result.errors.push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::memory::InMemoryIndex;
    use crate::index::RecordOutcome;
    use anyhow::bail;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the whole upload call for one batch; rejects ids in `bad_ids`.
    struct Flaky {
        calls: AtomicUsize,
        fail_call: Option<usize>,
        bad_ids: Vec<String>,
    }

    #[async_trait]
    impl SearchBackend for Flaky {
        fn kind(&self) -> &'static str {
            "flaky"
        }
        async fn create_or_update_index(&self, _schema: &IndexSchema) -> Result<()> {
            Ok(())
        }
        async fn delete_index(&self, _name: &str) -> Result<()> {
            Ok(())
        }
        async fn upload(&self, _name: &str, records: &[IndexRecord]) -> Result<Vec<RecordOutcome>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if Some(call) == self.fail_call {
                bail!("service unavailable");
            }
            Ok(records
                .iter()
                .map(|r| {
                    let bad = self.bad_ids.contains(&r.id);
                    RecordOutcome {
                        id: r.id.clone(),
                        succeeded: !bad,
                        error: bad.then(|| "document too large".to_string()),
                    }
                })
                .collect())
        }
        async fn search(&self, _name: &str, _query: &HybridQuery) -> Result<Vec<RetrievedChunk>> {
            Ok(Vec::new())
        }
        async fn list_ids(&self, _name: &str, _limit: usize) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn delete_records(&self, _name: &str, _ids: &[String]) -> Result<usize> {
            Ok(0)
        }
    }

    fn chunks(n: usize) -> Vec<DocumentChunk> {
        (0..n)
            .map(|i| DocumentChunk {
                chunk_id: format!("chunk-{i:04}"),
                content: format!("content {i}"),
                source_document: "doc.pdf".into(),
                page_number: 1,
                source_url: "u".into(),
                chunk_index: i as u32,
            })
            .collect()
    }

    fn vectors(n: usize) -> Vec<Vec<f32>> {
        (0..n).map(|i| vec![1.0, i as f32]).collect()
    }

    fn orchestrator(backend: Arc<dyn SearchBackend>) -> SearchOrchestrator {
        SearchOrchestrator::new(
            backend,
            IndexSettings {
                index_name: "test".into(),
                dims: 2,
                batch_size: 100,
            },
        )
    }

    #[tokio::test]
    async fn test_failed_batch_counts_all_records() {
        let backend = Arc::new(Flaky {
            calls: AtomicUsize::new(0),
            fail_call: Some(2),
            bad_ids: Vec::new(),
        });
        let orch = orchestrator(backend.clone());
        let result = orch.upsert(&chunks(150), vectors(150)).await.unwrap();
        assert_eq!(result.attempted, 150);
        assert_eq!(result.succeeded, 100);
        assert_eq!(result.failed, 50);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("Batch 2"));
    }

    #[tokio::test]
    async fn test_later_batches_still_attempted() {
        let backend = Arc::new(Flaky {
            calls: AtomicUsize::new(0),
            fail_call: Some(1),
            bad_ids: Vec::new(),
        });
        let orch = orchestrator(backend.clone());
        let result = orch.upsert(&chunks(250), vectors(250)).await.unwrap();
        assert_eq!(result.failed, 100);
        assert_eq!(result.succeeded, 150);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_per_record_errors_are_capped() {
        let bad_ids: Vec<String> = (0..8).map(|i| format!("chunk-{i:04}")).collect();
        let backend = Arc::new(Flaky {
            calls: AtomicUsize::new(0),
            fail_call: None,
            bad_ids,
        });
        let orch = orchestrator(backend);
        let result = orch.upsert(&chunks(20), vectors(20)).await.unwrap();
        assert_eq!(result.failed, 8);
        assert_eq!(result.succeeded, 12);
        assert_eq!(result.errors.len(), MAX_REPORTED_ERRORS);
        assert_eq!(result.errors[0], "Failed to index chunk-0000: document too large");
    }

    #[tokio::test]
    async fn test_length_mismatch_is_rejected() {
        let orch = orchestrator(Arc::new(InMemoryIndex::default()));
        let err = orch.upsert(&chunks(3), vectors(2)).await.unwrap_err();
        assert!(matches!(err, IndexError::LengthMismatch { chunks: 3, vectors: 2 }));
    }

    #[tokio::test]
    async fn test_empty_upsert() {
        let orch = orchestrator(Arc::new(InMemoryIndex::default()));
        let result = orch.upsert(&[], Vec::new()).await.unwrap();
        assert_eq!(result, IndexBatchResult::default());
    }

    #[tokio::test]
    async fn test_roundtrip_and_clear_with_memory_backend() {
        let index = Arc::new(InMemoryIndex::default());
        let orch = orchestrator(index.clone());
        orch.ensure_index().await.unwrap();
        orch.ensure_index().await.unwrap();

        let result = orch.upsert(&chunks(5), vectors(5)).await.unwrap();
        assert_eq!(result.succeeded, 5);

        let hits = orch.query("content", vec![1.0, 0.0], 3, false).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].metadata.chunk_id, "chunk-0000");

        assert_eq!(orch.clear_documents().await.unwrap(), 5);
        assert_eq!(index.len("test").await, Some(0));

        orch.delete_index().await.unwrap();
        assert_eq!(index.len("test").await, None);
    }
}
