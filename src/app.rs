//! Composition root.
//!
//! [`AppContext`] owns every long-lived collaborator. It is built once from
//! [`Config`] at startup and shared (behind an `Arc`) by the HTTP server and
//! the CLI commands. Nothing else in the crate constructs clients.

use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::sync::Mutex;

use docent_core::embedding::EmbeddingProvider;
use docent_core::generation::ChatModel;
use docent_core::index::memory::InMemoryIndex;
use docent_core::index::SearchBackend;
use docent_core::ingest::IngestRunner;
use docent_core::pipeline::RagPipeline;
use docent_core::search::SearchOrchestrator;
use docent_core::storage::{DocumentStore, LinkResolver, PageExtractor};

use crate::config::{Config, ConfigSummary};
use crate::extract::PdfExtractor;
use crate::openai::{create_chat, create_embedder};
use crate::search_rest::RestSearchBackend;
use crate::storage_fs::FsDocumentStore;
use crate::storage_s3::S3DocumentStore;

/// External collaborators, before they are wired into the pipeline.
pub struct Collaborators {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub chat: Arc<dyn ChatModel>,
    pub backend: Arc<dyn SearchBackend>,
    pub store: Arc<dyn DocumentStore>,
    pub links: Arc<dyn LinkResolver>,
    pub extractor: Arc<dyn PageExtractor>,
    /// Set when documents are served by `GET /files/...`.
    pub files: Option<Arc<FsDocumentStore>>,
}

impl Collaborators {
    /// Build the real adapters selected by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let backend: Arc<dyn SearchBackend> = match config.search.backend.as_str() {
            "memory" => Arc::new(InMemoryIndex::new(config.retrieval.hybrid_alpha)),
            "rest" => Arc::new(RestSearchBackend::new(&config.search)?),
            other => bail!("Unknown search backend: '{}'", other),
        };

        let (store, links, files): (
            Arc<dyn DocumentStore>,
            Arc<dyn LinkResolver>,
            Option<Arc<FsDocumentStore>>,
        ) = match config.storage.backend.as_str() {
            "filesystem" => {
                let fs = Arc::new(FsDocumentStore::new(config)?);
                let store: Arc<dyn DocumentStore> = fs.clone();
                let links: Arc<dyn LinkResolver> = fs.clone();
                (store, links, Some(fs))
            }
            "s3" => {
                let s3 = Arc::new(S3DocumentStore::new(&config.storage)?);
                let store: Arc<dyn DocumentStore> = s3.clone();
                let links: Arc<dyn LinkResolver> = s3;
                (store, links, None)
            }
            other => bail!("Unknown storage backend: '{}'", other),
        };

        Ok(Self {
            embedder: create_embedder(&config.embedding)?,
            chat: create_chat(&config.generation)?,
            backend,
            store,
            links,
            extractor: Arc::new(PdfExtractor),
            files,
        })
    }
}

/// Shared application state.
pub struct AppContext {
    pub config: Arc<Config>,
    pub summary: ConfigSummary,
    pub search: Arc<SearchOrchestrator>,
    pub pipeline: RagPipeline,
    pub ingest: IngestRunner,
    pub files: Option<Arc<FsDocumentStore>>,
    /// Held for the duration of an ingestion run.
    pub ingest_lock: Mutex<()>,
}

impl AppContext {
    pub fn from_config(config: &Config) -> Result<Self> {
        let parts = Collaborators::from_config(config)?;
        Ok(Self::assemble(config, parts))
    }

    /// Wire collaborators into the pipeline and ingest runner.
    pub fn assemble(config: &Config, parts: Collaborators) -> Self {
        let search = Arc::new(SearchOrchestrator::new(
            parts.backend,
            config.index_settings(),
        ));

        let pipeline = RagPipeline::new(
            parts.embedder.clone(),
            parts.chat,
            search.clone(),
            parts.links,
            config.rag_settings(),
        );

        let ingest = IngestRunner::new(
            parts.store,
            parts.extractor,
            parts.embedder,
            search.clone(),
            config.chunk_params(),
            config.embedding.batching(),
        );

        tracing::info!(
            search = search.backend_kind(),
            index = search.index_name(),
            storage = %config.storage.backend,
            "application context ready"
        );

        Self {
            config: Arc::new(config.clone()),
            summary: config.summary(),
            search,
            pipeline,
            ingest,
            files: parts.files,
            ingest_lock: Mutex::new(()),
        }
    }
}
