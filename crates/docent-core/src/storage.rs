//! Collaborator traits for the document side of the system.
//!
//! - [`DocumentStore`] lists and fetches the source PDFs.
//! - [`LinkResolver`] turns a document name into a fresh, time-limited URL.
//! - [`PageExtractor`] turns PDF bytes into per-page text.
//!
//! Implementations (S3, local filesystem, `pdf-extract`) live in the app crate.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::ExtractedPage;

/// A document available in storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    /// Name relative to the store root; used as `source_document`.
    pub name: String,
    pub size: u64,
}

/// Produces fresh, time-limited access URLs for stored documents.
#[async_trait]
pub trait LinkResolver: Send + Sync {
    async fn access_url(&self, name: &str) -> Result<String>;
}

/// Read access to the corpus.
#[async_trait]
pub trait DocumentStore: LinkResolver {
    /// Short label for logs and the health summary (e.g. `"s3"`).
    fn kind(&self) -> &'static str;
    /// List every document eligible for ingestion, sorted by name.
    async fn list_documents(&self) -> Result<Vec<StoredDocument>>;
    /// Fetch a document's raw bytes.
    async fn fetch(&self, name: &str) -> Result<Vec<u8>>;
    /// Stable, unsigned URL for a document. Used when no fresh link can be made.
    fn canonical_url(&self, name: &str) -> String;
}

/// Per-page text extraction.
#[async_trait]
pub trait PageExtractor: Send + Sync {
    /// Extract every page of the document, in page order, 1-indexed.
    async fn extract_pages(&self, name: &str, bytes: Vec<u8>) -> Result<Vec<ExtractedPage>>;
}
