//! Core data records that flow through ingestion and question answering.
//!
//! Every entity is an explicit struct: optional fields are `Option`, roles are
//! a closed enum, and nothing travels as a loose JSON map.

use serde::{Deserialize, Serialize};

/// Plain text of one PDF page, as produced by a page extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    /// 1-indexed page number.
    pub page_number: u32,
    pub text: String,
    /// `false` for pages with no usable text (scans, blank pages).
    pub has_text: bool,
}

/// A bounded span of one page's text, the unit that gets indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentChunk {
    /// Hex SHA-256 over document, page, index and content prefix.
    pub chunk_id: String,
    pub content: String,
    pub source_document: String,
    pub page_number: u32,
    /// URL recorded at ingestion time. May be expired by the time it is read.
    pub source_url: String,
    /// Position of the chunk within its page.
    pub chunk_index: u32,
}

/// Metadata stored alongside a chunk in the search index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source_document: String,
    pub page_number: Option<u32>,
    pub chunk_id: String,
    pub source_url: String,
}

/// A chunk returned by a search query together with its relevance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub content: String,
    pub score: f64,
    pub metadata: ChunkMetadata,
}

/// Outcome of the evidence check that runs before generation.
#[derive(Debug, Clone, PartialEq)]
pub struct GatingResult {
    pub passed: bool,
    pub reason: String,
    /// Highest score among the results; `None` when nothing was retrieved.
    pub top_score: Option<f64>,
    pub evidence_count: usize,
}

/// Pointer from an answer back to the document page that supports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub source_document: String,
    pub page_number: Option<u32>,
    pub source_url: String,
    pub snippet: String,
}

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Wire name used by chat-completion APIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Label used when a conversation is rendered as a transcript.
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

/// One prior message of the conversation, supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

/// Accounting for one ingestion run's index upserts.
///
/// `errors` holds at most [`crate::search::MAX_REPORTED_ERRORS`] entries, in
/// the order they occurred.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexBatchResult {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}
