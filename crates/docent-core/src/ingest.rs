//! Corpus ingestion: storage → extraction → chunking → embedding → index.
//!
//! [`IngestRunner::run`] processes every document in the store. Problems with
//! a single document are counted and described in the report while the run
//! carries on. Only failures that make the whole run meaningless (index setup,
//! listing, embedding) abort it with an [`IngestError`].

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::chunk::{chunk_document, ChunkParams};
use crate::embedding::{embed_in_batches, EmbedBatching, EmbeddingProvider};
use crate::models::DocumentChunk;
use crate::search::{IndexError, SearchOrchestrator, MAX_REPORTED_ERRORS};
use crate::storage::{DocumentStore, PageExtractor};

/// Failures that abort an ingestion run.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("index setup failed: {0:#}")]
    Index(anyhow::Error),
    #[error("listing documents failed: {0:#}")]
    Listing(anyhow::Error),
    #[error("embedding chunks failed: {0:#}")]
    Embedding(anyhow::Error),
    #[error(transparent)]
    Upsert(#[from] IndexError),
}

/// Summary of an ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub success: bool,
    pub documents_processed: usize,
    pub chunks_indexed: usize,
    pub failures: usize,
    pub message: String,
    pub details: Vec<String>,
}

/// Drives ingestion over injected collaborators.
pub struct IngestRunner {
    store: Arc<dyn DocumentStore>,
    extractor: Arc<dyn PageExtractor>,
    embedder: Arc<dyn EmbeddingProvider>,
    search: Arc<SearchOrchestrator>,
    chunking: ChunkParams,
    batching: EmbedBatching,
}

impl IngestRunner {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        extractor: Arc<dyn PageExtractor>,
        embedder: Arc<dyn EmbeddingProvider>,
        search: Arc<SearchOrchestrator>,
        chunking: ChunkParams,
        batching: EmbedBatching,
    ) -> Self {
        Self {
            store,
            extractor,
            embedder,
            search,
            chunking,
            batching,
        }
    }

    /// Ingest the whole corpus. With `force_reindex` the index is dropped first.
    pub async fn run(&self, force_reindex: bool) -> Result<IngestReport, IngestError> {
        tracing::info!(force_reindex, store = self.store.kind(), "starting ingestion");
        let mut report = IngestReport::default();

        if force_reindex {
            match self.search.delete_index().await {
                Ok(()) => report.details.push("Deleted existing search index".to_string()),
                Err(e) => {
                    tracing::warn!(error = %e, "could not delete index before reindex");
                    report.details.push("No existing index to delete".to_string());
                }
            }
        }

        self.search.ensure_index().await.map_err(IngestError::Index)?;
        report.details.push("Search index created/updated".to_string());

        let documents = self
            .store
            .list_documents()
            .await
            .map_err(IngestError::Listing)?;
        report.documents_processed = documents.len();
        report
            .details
            .push(format!("Found {} documents in storage", documents.len()));

        if documents.is_empty() {
            report.success = true;
            report.message = "No documents found in storage".to_string();
            return Ok(report);
        }

        let mut all_chunks: Vec<DocumentChunk> = Vec::new();
        for doc in &documents {
            match self.process_document(&doc.name).await {
                Ok(chunks) if chunks.is_empty() => {
                    report.failures += 1;
                    report
                        .details
                        .push(format!("Skipped '{}': no extractable text", doc.name));
                }
                Ok(chunks) => {
                    report
                        .details
                        .push(format!("Processed '{}': {} chunks", doc.name, chunks.len()));
                    all_chunks.extend(chunks);
                }
                Err(e) => {
                    tracing::error!(document = %doc.name, error = %e, "failed to process document");
                    report.failures += 1;
                    report
                        .details
                        .push(format!("Failed to process '{}': {}", doc.name, short(&e)));
                }
            }
        }

        if all_chunks.is_empty() {
            report.success = false;
            report.message = "No text chunks extracted".to_string();
            return Ok(report);
        }

        let texts: Vec<String> = all_chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = embed_in_batches(self.embedder.as_ref(), &texts, &self.batching)
            .await
            .map_err(IngestError::Embedding)?;
        report
            .details
            .push(format!("Generated {} embeddings", vectors.len()));

        let result = self.search.upsert(&all_chunks, vectors).await?;
        report.chunks_indexed = result.succeeded;
        report.failures += result.failed;
        report.details.push(format!(
            "Indexed {} chunks, {} failures",
            result.succeeded, result.failed
        ));
        report.details.extend(
            result
                .errors
                .iter()
                .take(MAX_REPORTED_ERRORS)
                .map(|e| format!("Index error: {e}")),
        );

        report.success = report.chunks_indexed > 0;
        report.message = if report.success {
            format!(
                "Ingested {} documents with {} chunks",
                report.documents_processed, report.chunks_indexed
            )
        } else {
            "Ingestion completed with errors".to_string()
        };

        tracing::info!(
            documents = report.documents_processed,
            chunks = report.chunks_indexed,
            failures = report.failures,
            "ingestion finished"
        );
        Ok(report)
    }

    /// Fetch, extract and chunk one document. Empty output means no usable text.
    async fn process_document(&self, name: &str) -> anyhow::Result<Vec<DocumentChunk>> {
        let bytes = self.store.fetch(name).await?;
        let source_url = match self.store.access_url(name).await {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(document = name, error = %e, "no fresh link, using canonical url");
                self.store.canonical_url(name)
            }
        };
        let pages = self.extractor.extract_pages(name, bytes).await?;
        if !pages.iter().any(|p| p.has_text) {
            return Ok(Vec::new());
        }
        Ok(chunk_document(&pages, name, &source_url, &self.chunking))
    }
}

/// First line of an error, bounded, for report details.
fn short(e: &anyhow::Error) -> String {
    let text = e.to_string();
    let line = text.lines().next().unwrap_or_default();
    line.chars().take(160).collect()
}
