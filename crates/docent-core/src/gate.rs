//! Evidence gate that runs between retrieval and generation.
//!
//! The gate is the only place that decides whether the generator is allowed
//! to run. When it fails, the pipeline answers with [`OUT_OF_CONTEXT_MESSAGE`]
//! and the generator is never called.

use crate::models::{GatingResult, RetrievedChunk};

/// Fixed refusal returned when the corpus does not support an answer.
pub const OUT_OF_CONTEXT_MESSAGE: &str = "Your question is outside the provided documents. \
I can't answer it from the PDFs I have. \
Please ask a question related to the content in the uploaded documents.";

/// Reason recorded when the search returned nothing.
pub const NO_EVIDENCE_REASON: &str = "no evidence retrieved";

/// Decide whether the retrieved evidence is strong enough to answer from.
///
/// - No results always fails, regardless of `strict`.
/// - In strict mode the best score must reach `score_threshold`; the
///   boundary is inclusive.
/// - In lenient mode any non-empty result set passes.
pub fn evaluate(results: &[RetrievedChunk], score_threshold: f64, strict: bool) -> GatingResult {
    let evidence_count = results.len();

    let top_score = results
        .iter()
        .map(|r| r.score)
        .fold(None, |best: Option<f64>, s| match best {
            Some(b) if b >= s => Some(b),
            _ => Some(s),
        });

    let Some(top) = top_score else {
        return GatingResult {
            passed: false,
            reason: NO_EVIDENCE_REASON.to_string(),
            top_score: None,
            evidence_count,
        };
    };

    if strict && top < score_threshold {
        return GatingResult {
            passed: false,
            reason: format!(
                "top score {:.3} is below threshold {:.3}",
                top, score_threshold
            ),
            top_score: Some(top),
            evidence_count,
        };
    }

    GatingResult {
        passed: true,
        reason: format!("top score {:.3} meets threshold {:.3}", top, score_threshold),
        top_score: Some(top),
        evidence_count,
    }
}
