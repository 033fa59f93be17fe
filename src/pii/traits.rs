//! PII detector trait for pluggable entity recognition.
//!
//! This module defines the [`PiiDetector`] trait, which abstracts how
//! sensitive spans are found in text. The [`PiiSanitizer`](super::PiiSanitizer)
//! owns the redaction policy (enabled categories, per-category thresholds,
//! placeholders); detectors only report what they see.

use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;

/// A detected sensitive span.
///
/// `span` holds byte offsets into the scanned text, end exclusive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PiiEntity {
    pub category: String,
    pub span: (usize, usize),
    pub confidence: f64,
}

impl PiiEntity {
    pub fn new(category: &str, start: usize, end: usize, confidence: f64) -> Self {
        Self {
            category: category.to_string(),
            span: (start, end),
            confidence,
        }
    }

    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        self.span.0 < end && start < self.span.1
    }

    /// Whether the span lies on character boundaries inside `text`.
    pub fn is_valid_for(&self, text: &str) -> bool {
        let (start, end) = self.span;
        start < end
            && end <= text.len()
            && text.is_char_boundary(start)
            && text.is_char_boundary(end)
    }
}

/// Source of PII entities.
///
/// Implementations must be `Send + Sync` because one detector is shared by
/// every in-flight turn. A detector reports all categories it recognizes;
/// filtering by allow-list and threshold happens in the sanitizer.
#[async_trait]
pub trait PiiDetector: Send + Sync {
    /// Scan `text` and return every entity found, in any order.
    ///
    /// # Errors
    ///
    /// Remote detectors return `UpstreamUnavailable` or `MalformedResponse`
    /// when the recognition service fails.
    async fn detect(&self, text: &str) -> Result<Vec<PiiEntity>>;

    /// Human-readable detector name for logs and health output.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_is_half_open() {
        let entity = PiiEntity::new("Email", 5, 10, 0.9);
        assert!(entity.overlaps(9, 12));
        assert!(!entity.overlaps(10, 12));
        assert!(!entity.overlaps(0, 5));
    }

    #[test]
    fn rejects_spans_outside_text_or_inside_a_char() {
        let text = "héllo";
        assert!(PiiEntity::new("X", 0, 1, 1.0).is_valid_for(text));
        assert!(!PiiEntity::new("X", 0, 2, 1.0).is_valid_for(text));
        assert!(!PiiEntity::new("X", 3, 99, 1.0).is_valid_for(text));
        assert!(!PiiEntity::new("X", 2, 2, 1.0).is_valid_for(text));
    }
}
