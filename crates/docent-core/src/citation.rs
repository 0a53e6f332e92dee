//! Citation assembly.
//!
//! Turns the evidence that backed an answer into a short, deduplicated list
//! of document/page references with freshly issued links.

use std::collections::HashSet;

use crate::models::{Citation, RetrievedChunk};
use crate::storage::LinkResolver;

/// Maximum snippet length in characters, including the `"..."` suffix.
pub const SNIPPET_MAX_CHARS: usize = 200;

const ELLIPSIS: &str = "...";

/// Build one citation per distinct `(source_document, page_number)`.
///
/// Order follows the first appearance of each pair in `results`. Each kept
/// citation gets a fresh link from `resolver`, with a page anchor when the
/// page is known. If the resolver fails, that citation falls back to the URL
/// stored at ingestion time.
pub async fn build_citations(
    results: &[RetrievedChunk],
    resolver: &dyn LinkResolver,
) -> Vec<Citation> {
    let mut seen: HashSet<(&str, Option<u32>)> = HashSet::new();
    let mut citations = Vec::new();

    for r in results {
        let meta = &r.metadata;
        if !seen.insert((meta.source_document.as_str(), meta.page_number)) {
            continue;
        }

        let source_url = match resolver.access_url(&meta.source_document).await {
            Ok(url) => with_page_anchor(url, meta.page_number),
            Err(e) => {
                tracing::warn!(
                    document = %meta.source_document,
                    error = %e,
                    "could not issue fresh link, using stored url"
                );
                meta.source_url.clone()
            }
        };

        citations.push(Citation {
            source_document: meta.source_document.clone(),
            page_number: meta.page_number,
            source_url,
            snippet: truncate_snippet(&r.content, SNIPPET_MAX_CHARS),
        });
    }

    citations
}

/// Append a PDF-viewer fragment that opens the given page.
pub fn with_page_anchor(url: String, page_number: Option<u32>) -> String {
    match page_number {
        Some(page) => format!("{url}#page={page}&view=FitH,top"),
        None => url,
    }
}

/// Shorten `text` to at most `max_chars` characters, preferring a word break.
///
/// Text that already fits is returned unchanged. Otherwise the first
/// `max_chars - 3` characters are kept, cut back to the last space when that
/// space lies past 70% of `max_chars`, and `"..."` is appended.
pub fn truncate_snippet(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let mut cut: String = text.chars().take(keep).collect();

    if let Some(byte_pos) = cut.rfind(' ') {
        let char_pos = cut[..byte_pos].chars().count();
        if char_pos * 10 > max_chars * 7 {
            cut.truncate(byte_pos);
        }
    }

    format!("{}{}", cut.trim_end(), ELLIPSIS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;
    use anyhow::{bail, Result};
    use async_trait::async_trait;

    struct Signed;

    #[async_trait]
    impl LinkResolver for Signed {
        async fn access_url(&self, name: &str) -> Result<String> {
            Ok(format!("https://files.example/{name}?sig=fresh"))
        }
    }

    struct Broken;

    #[async_trait]
    impl LinkResolver for Broken {
        async fn access_url(&self, _name: &str) -> Result<String> {
            bail!("signing key unavailable")
        }
    }

    fn hit(doc: &str, page: Option<u32>, content: &str) -> RetrievedChunk {
        RetrievedChunk {
            content: content.to_string(),
            score: 0.8,
            metadata: ChunkMetadata {
                source_document: doc.to_string(),
                page_number: page,
                chunk_id: format!("{doc}-{page:?}"),
                source_url: format!("https://stored.example/{doc}"),
            },
        }
    }

    #[tokio::test]
    async fn test_dedup_keeps_first_seen_order() {
        let results = vec![
            hit("a.pdf", Some(1), "first"),
            hit("a.pdf", Some(1), "duplicate"),
            hit("b.pdf", Some(2), "second"),
        ];
        let citations = build_citations(&results, &Signed).await;
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].source_document, "a.pdf");
        assert_eq!(citations[0].snippet, "first");
        assert_eq!(citations[1].source_document, "b.pdf");
        assert_eq!(
            citations[1].source_url,
            "https://files.example/b.pdf?sig=fresh#page=2&view=FitH,top"
        );
    }

    #[tokio::test]
    async fn test_same_document_different_pages_are_distinct() {
        let results = vec![hit("a.pdf", Some(1), "x"), hit("a.pdf", Some(2), "y")];
        assert_eq!(build_citations(&results, &Signed).await.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_page_has_no_anchor() {
        let citations = build_citations(&[hit("a.pdf", None, "x")], &Signed).await;
        assert_eq!(citations[0].source_url, "https://files.example/a.pdf?sig=fresh");
        assert_eq!(citations[0].page_number, None);
    }

    #[tokio::test]
    async fn test_resolver_failure_falls_back_to_stored_url() {
        let citations = build_citations(&[hit("a.pdf", Some(3), "x")], &Broken).await;
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].source_url, "https://stored.example/a.pdf");
    }

    #[tokio::test]
    async fn test_empty_results() {
        assert!(build_citations(&[], &Signed).await.is_empty());
    }

    #[test]
    fn test_truncate_short_text_unchanged() {
        assert_eq!(truncate_snippet("short", 200), "short");
        let exact = "a".repeat(200);
        assert_eq!(truncate_snippet(&exact, 200), exact);
    }

    #[test]
    fn test_truncate_prefers_late_word_break() {
        let text = format!("{} {}", "a".repeat(180), "b".repeat(50));
        let out = truncate_snippet(&text, 200);
        assert_eq!(out, format!("{}...", "a".repeat(180)));
    }

    #[test]
    fn test_truncate_hard_cut_when_space_is_early() {
        let text = format!("{} {}", "a".repeat(100), "b".repeat(150));
        let out = truncate_snippet(&text, 200);
        assert_eq!(out.chars().count(), 200);
        assert!(out.ends_with("b..."));
    }

    #[test]
    fn test_truncate_multibyte() {
        let text = "é".repeat(300);
        let out = truncate_snippet(&text, 200);
        assert_eq!(out.chars().count(), 200);
        assert!(out.ends_with("..."));
    }
}
