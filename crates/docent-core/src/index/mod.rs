//! Search index abstraction.
//!
//! The [`SearchBackend`] trait is the seam between the pipeline and the
//! external search engine. The app crate provides a REST implementation;
//! [`memory::InMemoryIndex`] is a local-development and test double.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::{DocumentChunk, RetrievedChunk};

/// Index field names. Shared by the schema, the records and the backends.
pub mod fields {
    pub const ID: &str = "id";
    pub const CONTENT: &str = "content";
    pub const CONTENT_VECTOR: &str = "contentVector";
    pub const SOURCE_DOCUMENT: &str = "source_document";
    pub const PAGE_NUMBER: &str = "page_number";
    pub const SOURCE_URL: &str = "source_url";
    pub const CHUNK_ID: &str = "chunk_id";
}

/// Storage type of an index field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Int32,
    /// Single-precision vector of the given dimension.
    Vector { dims: usize },
}

/// One field of the index schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub key: bool,
    pub searchable: bool,
    pub filterable: bool,
}

impl FieldSpec {
    fn stored(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            key: false,
            searchable: false,
            filterable: false,
        }
    }
}

/// Full description of the chunk index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSchema {
    pub name: String,
    pub fields: Vec<FieldSpec>,
}

impl IndexSchema {
    /// Schema for chunk records with vectors of `dims` dimensions.
    pub fn for_chunks(name: &str, dims: usize) -> Self {
        Self {
            name: name.to_string(),
            fields: vec![
                FieldSpec {
                    key: true,
                    filterable: true,
                    ..FieldSpec::stored(fields::ID, FieldKind::String)
                },
                FieldSpec {
                    searchable: true,
                    ..FieldSpec::stored(fields::CONTENT, FieldKind::String)
                },
                FieldSpec {
                    searchable: true,
                    ..FieldSpec::stored(fields::CONTENT_VECTOR, FieldKind::Vector { dims })
                },
                FieldSpec {
                    filterable: true,
                    ..FieldSpec::stored(fields::SOURCE_DOCUMENT, FieldKind::String)
                },
                FieldSpec {
                    filterable: true,
                    ..FieldSpec::stored(fields::PAGE_NUMBER, FieldKind::Int32)
                },
                FieldSpec::stored(fields::SOURCE_URL, FieldKind::String),
                FieldSpec::stored(fields::CHUNK_ID, FieldKind::String),
            ],
        }
    }

    /// Dimension of the vector field, if the schema has one.
    pub fn vector_dims(&self) -> Option<usize> {
        self.fields.iter().find_map(|f| match f.kind {
            FieldKind::Vector { dims } => Some(dims),
            _ => None,
        })
    }
}

/// One chunk as stored in the index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexRecord {
    pub id: String,
    pub content: String,
    #[serde(rename = "contentVector")]
    pub content_vector: Vec<f32>,
    pub source_document: String,
    pub page_number: u32,
    pub source_url: String,
    pub chunk_id: String,
}

impl IndexRecord {
    pub fn from_chunk(chunk: &DocumentChunk, vector: Vec<f32>) -> Self {
        Self {
            id: chunk.chunk_id.clone(),
            content: chunk.content.clone(),
            content_vector: vector,
            source_document: chunk.source_document.clone(),
            page_number: chunk.page_number,
            source_url: chunk.source_url.clone(),
            chunk_id: chunk.chunk_id.clone(),
        }
    }
}

/// Per-record result of an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
    pub id: String,
    pub succeeded: bool,
    pub error: Option<String>,
}

/// A query against the index.
#[derive(Debug, Clone, PartialEq)]
pub struct HybridQuery {
    /// Lexical query text. Ignored when `hybrid` is false.
    pub text: String,
    pub vector: Vec<f32>,
    pub top_k: usize,
    /// Combine lexical and vector retrieval; otherwise vector only.
    pub hybrid: bool,
}

/// Abstract search engine holding the chunk index.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`create_or_update_index`](SearchBackend::create_or_update_index) | Idempotent schema setup |
/// | [`delete_index`](SearchBackend::delete_index) | Drop the index; missing index is success |
/// | [`upload`](SearchBackend::upload) | Merge-or-upload a batch of records |
/// | [`search`](SearchBackend::search) | Hybrid or vector-only top-k query |
/// | [`list_ids`](SearchBackend::list_ids) | Page through record keys |
/// | [`delete_records`](SearchBackend::delete_records) | Remove records by key |
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Short label for logs (e.g. `"rest"`, `"memory"`).
    fn kind(&self) -> &'static str;

    async fn create_or_update_index(&self, schema: &IndexSchema) -> Result<()>;

    async fn delete_index(&self, name: &str) -> Result<()>;

    /// Upload one batch. An `Err` means the whole batch failed; otherwise
    /// one outcome per record.
    async fn upload(&self, name: &str, records: &[IndexRecord]) -> Result<Vec<RecordOutcome>>;

    /// Return at most `query.top_k` results, best first.
    async fn search(&self, name: &str, query: &HybridQuery) -> Result<Vec<RetrievedChunk>>;

    /// Return up to `limit` record keys.
    async fn list_ids(&self, name: &str, limit: usize) -> Result<Vec<String>>;

    /// Delete records by key, returning how many were removed.
    async fn delete_records(&self, name: &str, ids: &[String]) -> Result<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_schema_fields() {
        let schema = IndexSchema::for_chunks("rag-documents", 1536);
        assert_eq!(schema.vector_dims(), Some(1536));
        let key: Vec<_> = schema.fields.iter().filter(|f| f.key).collect();
        assert_eq!(key.len(), 1);
        assert_eq!(key[0].name, fields::ID);
        let names: Vec<_> = schema.fields.iter().map(|f| f.name).collect();
        assert_eq!(
            names,
            vec![
                "id",
                "content",
                "contentVector",
                "source_document",
                "page_number",
                "source_url",
                "chunk_id"
            ]
        );
    }

    #[test]
    fn test_record_serializes_vector_field_name() {
        let chunk = DocumentChunk {
            chunk_id: "abc".into(),
            content: "text".into(),
            source_document: "a.pdf".into(),
            page_number: 2,
            source_url: "u".into(),
            chunk_index: 0,
        };
        let json = serde_json::to_value(IndexRecord::from_chunk(&chunk, vec![0.5])).unwrap();
        assert_eq!(json["id"], "abc");
        assert_eq!(json["contentVector"][0], 0.5);
        assert_eq!(json["page_number"], 2);
    }
}
