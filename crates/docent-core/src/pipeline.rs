//! Grounded question answering.
//!
//! [`RagPipeline::answer`] drives one question through a fixed sequence of
//! stages:
//!
//! ```text
//! ReceivedQuestion → QueryPrepared → Searched → Gated ─┬→ Refused
//!                                                      └→ Generated → Cited → Done
//!                                        (generation error) → GenerationFailed
//! ```
//!
//! The generator only ever runs after the evidence gate passes. Upstream
//! error text never reaches the caller; the response carries one of the
//! fixed messages below and the failure kind goes to the log.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::citation::build_citations;
use crate::embedding::{embed_query, EmbeddingProvider};
use crate::gate::{self, OUT_OF_CONTEXT_MESSAGE};
use crate::generation::{ChatMessage, ChatModel, CompletionOptions, MessageRole};
use crate::models::{Citation, ConversationTurn, RetrievedChunk};
use crate::retry::RetryPolicy;
use crate::rewrite::rewrite_query;
use crate::search::SearchOrchestrator;
use crate::storage::LinkResolver;

/// Answer returned when embedding the query or searching fails.
pub const SEARCH_ERROR_MESSAGE: &str =
    "An error occurred while searching the documents. Please try again.";

/// Answer returned when the chat model fails.
pub const GENERATION_ERROR_MESSAGE: &str =
    "An error occurred while generating the response. Please try again.";

/// Longest accepted question, in characters.
pub const MAX_QUESTION_CHARS: usize = 2000;

/// Accepted range for a per-request `top_k`.
pub const TOP_K_RANGE: std::ops::RangeInclusive<usize> = 1..=20;

const GROUNDING_SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions using ONLY the numbered sources below.

Rules:
1. Use only information found in the sources.
2. If the sources do not contain what is needed, say \"I don't have enough information in the provided documents to answer this question.\"
3. Cite the document name and page number for every fact you use.
4. Be concise and accurate.
5. Never add knowledge from outside the sources.

SOURCES:
{sources}

Answer the question using the sources above and nothing else.";

/// Request rejected before the pipeline runs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("question must not be empty")]
    EmptyQuestion,
    #[error("question is {len} characters; the limit is {max}")]
    QuestionTooLong { len: usize, max: usize },
    #[error("top_k must be between 1 and 20, got {0}")]
    TopKOutOfRange(usize),
}

/// A question plus optional overrides and conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AnswerRequest {
    pub question: String,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
}

impl AnswerRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            top_k: None,
            history: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.question.trim().is_empty() {
            return Err(ValidationError::EmptyQuestion);
        }
        let len = self.question.chars().count();
        if len > MAX_QUESTION_CHARS {
            return Err(ValidationError::QuestionTooLong {
                len,
                max: MAX_QUESTION_CHARS,
            });
        }
        if let Some(k) = self.top_k {
            if !TOP_K_RANGE.contains(&k) {
                return Err(ValidationError::TopKOutOfRange(k));
            }
        }
        Ok(())
    }
}

/// Stages of one answer. `Refused`, `GenerationFailed` and `Done` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ReceivedQuestion,
    QueryPrepared,
    Searched,
    Gated,
    Refused,
    Generated,
    GenerationFailed,
    Cited,
    Done,
}

/// Final answer for the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerResponse {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub out_of_context: bool,
    /// Number of chunks retrieved for this question.
    pub evidence_count: usize,
    /// Terminal stage the answer ended in.
    #[serde(skip)]
    pub stage: Stage,
}

impl AnswerResponse {
    fn refused(answer: &str, evidence_count: usize) -> Self {
        Self {
            answer: answer.to_string(),
            citations: Vec::new(),
            out_of_context: true,
            evidence_count,
            stage: Stage::Refused,
        }
    }
}

/// Answering tunables, decoupled from application config.
#[derive(Debug, Clone, PartialEq)]
pub struct RagSettings {
    /// Results requested when the request does not override `top_k`.
    pub top_k: usize,
    pub score_threshold: f64,
    pub strict_grounding: bool,
    pub hybrid_search: bool,
    /// Most recent turns passed to the generator.
    pub history_turns: usize,
    pub generation: CompletionOptions,
    /// Retry around the query embedding.
    pub query_retry: RetryPolicy,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            score_threshold: 0.3,
            strict_grounding: true,
            hybrid_search: true,
            history_turns: 10,
            generation: CompletionOptions {
                temperature: 0.1,
                max_tokens: 1000,
            },
            query_retry: RetryPolicy::default(),
        }
    }
}

/// End-to-end answer flow over injected collaborators.
pub struct RagPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    chat: Arc<dyn ChatModel>,
    search: Arc<SearchOrchestrator>,
    links: Arc<dyn LinkResolver>,
    settings: RagSettings,
}

impl RagPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        chat: Arc<dyn ChatModel>,
        search: Arc<SearchOrchestrator>,
        links: Arc<dyn LinkResolver>,
        settings: RagSettings,
    ) -> Self {
        Self {
            embedder,
            chat,
            search,
            links,
            settings,
        }
    }

    pub fn settings(&self) -> &RagSettings {
        &self.settings
    }

    /// Answer one question.
    ///
    /// Only invalid requests produce an `Err`. Upstream failures end in the
    /// `Refused` or `GenerationFailed` stage with a fixed message.
    pub async fn answer(&self, req: &AnswerRequest) -> Result<AnswerResponse, ValidationError> {
        req.validate()?;
        let top_k = req.top_k.unwrap_or(self.settings.top_k);
        advance(Stage::ReceivedQuestion);

        let query = if req.history.is_empty() {
            req.question.clone()
        } else {
            rewrite_query(self.chat.as_ref(), &req.question, &req.history).await
        };
        advance(Stage::QueryPrepared);

        let results = match self.retrieve(&query, top_k).await {
            Ok(results) => results,
            Err(e) => {
                tracing::error!(error_kind = %root_kind(&e), "retrieval failed");
                advance(Stage::Refused);
                return Ok(AnswerResponse::refused(SEARCH_ERROR_MESSAGE, 0));
            }
        };
        advance(Stage::Searched);

        let gating = gate::evaluate(
            &results,
            self.settings.score_threshold,
            self.settings.strict_grounding,
        );
        advance(Stage::Gated);

        if !gating.passed {
            tracing::info!(reason = %gating.reason, "evidence gate failed");
            advance(Stage::Refused);
            return Ok(AnswerResponse::refused(
                OUT_OF_CONTEXT_MESSAGE,
                gating.evidence_count,
            ));
        }

        let messages = build_generation_messages(
            &req.question,
            &results,
            &req.history,
            self.settings.history_turns,
        );
        let answer = match self.chat.complete(&messages, self.settings.generation).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::error!(error_kind = %root_kind(&e), "generation failed");
                advance(Stage::GenerationFailed);
                return Ok(AnswerResponse {
                    answer: GENERATION_ERROR_MESSAGE.to_string(),
                    citations: Vec::new(),
                    out_of_context: false,
                    evidence_count: results.len(),
                    stage: Stage::GenerationFailed,
                });
            }
        };
        advance(Stage::Generated);

        let citations = build_citations(&results, self.links.as_ref()).await;
        advance(Stage::Cited);

        tracing::info!(
            citations = citations.len(),
            evidence = results.len(),
            "answered question"
        );
        advance(Stage::Done);

        Ok(AnswerResponse {
            answer,
            citations,
            out_of_context: false,
            evidence_count: results.len(),
            stage: Stage::Done,
        })
    }

    async fn retrieve(&self, query: &str, top_k: usize) -> anyhow::Result<Vec<RetrievedChunk>> {
        let vector = embed_query(self.embedder.as_ref(), query, &self.settings.query_retry).await?;
        self.search
            .query(query, vector, top_k, self.settings.hybrid_search)
            .await
    }
}

fn advance(stage: Stage) {
    tracing::debug!(?stage, "pipeline stage");
}

/// Outermost error message without the context chain, for logs only.
fn root_kind(e: &anyhow::Error) -> String {
    e.root_cause().to_string().chars().take(120).collect()
}

/// Render evidence as numbered `[Source i]` blocks separated by `---`.
pub fn format_sources(results: &[RetrievedChunk]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let page = r
                .metadata
                .page_number
                .map(|p| p.to_string())
                .unwrap_or_else(|| "N/A".to_string());
            format!(
                "[Source {}]\nDocument: {}\nPage: {}\nContent: {}\n",
                i + 1,
                r.metadata.source_document,
                page,
                r.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

/// System prompt with sources, the last `history_turns` turns, then the
/// original question.
pub fn build_generation_messages(
    question: &str,
    results: &[RetrievedChunk],
    history: &[ConversationTurn],
    history_turns: usize,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len().min(history_turns) + 2);
    messages.push(ChatMessage::system(
        GROUNDING_SYSTEM_PROMPT.replace("{sources}", &format_sources(results)),
    ));
    let recent = &history[history.len().saturating_sub(history_turns)..];
    messages.extend(recent.iter().map(|t| ChatMessage {
        role: MessageRole::from(t.role),
        content: t.content.clone(),
    }));
    messages.push(ChatMessage::user(question));
    messages
}
