//! PDF handling: page extraction and ingestion from a local document root.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;

use docent::config::StorageConfig;
use docent::extract::{extract_pages, PdfExtractor};
use docent::storage_fs::FsDocumentStore;
use docent_core::chunk::ChunkParams;
use docent_core::embedding::{EmbedBatching, EmbeddingProvider};
use docent_core::index::memory::InMemoryIndex;
use docent_core::ingest::IngestRunner;
use docent_core::retry::RetryPolicy;
use docent_core::search::{IndexSettings, SearchOrchestrator};
use docent_core::storage::PageExtractor;

/// PDF with one page per entry of `pages`, each showing its text with
/// Helvetica. Builds the body, then an xref with correct byte offsets.
fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let n = pages.len();
    let font_id = 3 + 2 * n;
    let mut objects: Vec<String> = Vec::new();

    objects.push("<< /Type /Catalog /Pages 2 0 R >>".to_string());
    let kids = (0..n)
        .map(|i| format!("{} 0 R", 3 + 2 * i))
        .collect::<Vec<_>>()
        .join(" ");
    objects.push(format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids, n));
    for (i, text) in pages.iter().enumerate() {
        let page_id = 3 + 2 * i;
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents {} 0 R /Resources << /Font << /F1 {} 0 R >> >> >>",
            page_id + 1,
            font_id
        ));
        let content = if text.is_empty() {
            String::new()
        } else {
            format!("BT /F1 12 Tf 72 700 Td ({}) Tj ET", text)
        };
        objects.push(format!(
            "<< /Length {} >> stream\n{}\nendstream",
            content.len(),
            content
        ));
    }
    objects.push("<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string());

    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj {} endobj\n", i + 1, body).as_bytes());
    }
    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer << /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_start
        )
        .as_bytes(),
    );
    out
}

struct LetterEmbedder;

#[async_trait]
impl EmbeddingProvider for LetterEmbedder {
    fn model_name(&self) -> &str {
        "letters"
    }
    fn dims(&self) -> usize {
        26
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; 26];
                for c in t.to_lowercase().chars().filter(|c| c.is_ascii_lowercase()) {
                    v[(c as u8 - b'a') as usize] += 1.0;
                }
                v
            })
            .collect())
    }
}

#[test]
fn extracts_one_entry_per_page_in_order() {
    let pdf = pdf_with_pages(&["Refund policy for hardware purchases", ""]);
    let pages = extract_pages(&pdf).unwrap();

    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].page_number, 1);
    assert_eq!(pages[1].page_number, 2);
    assert!(!pages[1].has_text);
    assert_eq!(pages[1].text, "");
    // Whitespace is always collapsed.
    for page in &pages {
        assert!(!page.text.contains("  "));
        assert!(!page.text.contains('\n'));
        assert_eq!(page.has_text, page.text.chars().count() > 10);
    }
}

#[tokio::test]
async fn extractor_reports_corrupt_pdf_as_error() {
    let result = PdfExtractor
        .extract_pages("bad.pdf", b"not a valid pdf".to_vec())
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn ingest_counts_unreadable_documents_and_continues() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("bad.pdf"), b"not a valid pdf").unwrap();
    std::fs::write(
        dir.path().join("good.pdf"),
        pdf_with_pages(&["Employees accrue vacation days monthly"]),
    )
    .unwrap();
    std::fs::write(dir.path().join("notes.txt"), "ignored by the include glob").unwrap();

    let store = Arc::new(
        FsDocumentStore::with_secret(
            &StorageConfig::default(),
            dir.path().to_path_buf(),
            "http://127.0.0.1:8000".to_string(),
            b"secret".to_vec(),
        )
        .unwrap(),
    );
    let backend = Arc::new(InMemoryIndex::default());
    let search = Arc::new(SearchOrchestrator::new(
        backend.clone(),
        IndexSettings {
            dims: 26,
            ..IndexSettings::default()
        },
    ));
    let runner = IngestRunner::new(
        store,
        Arc::new(PdfExtractor),
        Arc::new(LetterEmbedder),
        search,
        ChunkParams::default(),
        EmbedBatching {
            pause: std::time::Duration::ZERO,
            retry: RetryPolicy {
                max_attempts: 1,
                ..RetryPolicy::default()
            },
            ..EmbedBatching::default()
        },
    );

    let report = runner.run(false).await.unwrap();

    assert_eq!(report.documents_processed, 2);
    assert!(report.failures >= 1);
    assert!(report
        .details
        .iter()
        .any(|d| d.starts_with("Failed to process 'bad.pdf'")));
    assert!(report.details.iter().all(|d| !d.contains("notes.txt")));
    // Whatever good.pdf yields is what the index holds.
    assert_eq!(
        backend.len("rag-documents").await,
        Some(report.chunks_indexed)
    );
}
