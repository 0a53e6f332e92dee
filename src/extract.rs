//! Per-page PDF text extraction.
//!
//! Wraps `pdf-extract` behind [`PageExtractor`]. Extraction runs on the
//! blocking pool; a panic inside the parser surfaces as an error for that
//! document rather than taking down the ingest run.

use anyhow::Result;
use async_trait::async_trait;

use docent_core::models::ExtractedPage;
use docent_core::storage::PageExtractor;

/// Pages with this many characters or fewer after cleaning are treated as
/// having no text.
pub const MIN_PAGE_TEXT_CHARS: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("not a PDF: {0}")]
    NotPdf(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("PDF extraction aborted: {0}")]
    Aborted(String),
}

/// Extract the text of each page, 1-indexed, in order.
pub fn extract_pages(bytes: &[u8]) -> Result<Vec<ExtractedPage>, ExtractError> {
    if !bytes.starts_with(b"%PDF") {
        return Err(ExtractError::NotPdf("missing %PDF header".to_string()));
    }
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;

    Ok(pages
        .iter()
        .enumerate()
        .map(|(i, raw)| {
            let text = clean_text(raw);
            let has_text = text.chars().count() > MIN_PAGE_TEXT_CHARS;
            ExtractedPage {
                page_number: i as u32 + 1,
                text,
                has_text,
            }
        })
        .collect())
}

/// Collapse every run of whitespace to a single space and trim.
pub fn clean_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// [`PageExtractor`] backed by `pdf-extract`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

#[async_trait]
impl PageExtractor for PdfExtractor {
    async fn extract_pages(&self, name: &str, bytes: Vec<u8>) -> Result<Vec<ExtractedPage>> {
        let pages = tokio::task::spawn_blocking(move || extract_pages(&bytes))
            .await
            .map_err(|e| ExtractError::Aborted(e.to_string()))??;

        let with_text = pages.iter().filter(|p| p.has_text).count();
        tracing::debug!(document = name, pages = pages.len(), with_text, "extracted pages");
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  Refund\n\npolicy\t  applies \r\n"), "Refund policy applies");
        assert_eq!(clean_text("\n \t"), "");
    }

    #[test]
    fn test_rejects_non_pdf_bytes() {
        let err = extract_pages(b"PK\x03\x04 not a pdf").unwrap_err();
        assert!(matches!(err, ExtractError::NotPdf(_)));
    }

    #[test]
    fn test_truncated_pdf_is_an_error() {
        assert!(extract_pages(b"%PDF-1.4\n1 0 obj\n<<").is_err());
    }
}
