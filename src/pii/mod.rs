//! PII sanitizer and detectors.
//!
//! [`PiiSanitizer`] applies the redaction policy; a [`PiiDetector`] finds the
//! spans. [`create_sanitizer`] wires the detector named in config.

pub mod pattern;
pub mod sanitizer;
pub mod service;
pub mod traits;

pub use pattern::PatternDetector;
pub use sanitizer::{placeholder, redact, PiiSanitizer, Sanitized};
pub use service::ServiceDetector;
pub use traits::{PiiDetector, PiiEntity};

use crate::classifiers::LanguageClient;
use crate::config::{LanguageServiceConfig, PiiConfig, PiiDetectorKind};
use crate::error::Result;
use std::sync::Arc;

/// Factory: build the sanitizer with the configured detector.
pub fn create_sanitizer(pii: &PiiConfig, language: &LanguageServiceConfig) -> Result<PiiSanitizer> {
    let detector: Arc<dyn PiiDetector> = match (pii.enabled, pii.detector) {
        (true, PiiDetectorKind::Service) => Arc::new(ServiceDetector::new(
            Arc::new(LanguageClient::new(language)?),
            &pii.categories,
        )),
        _ => Arc::new(PatternDetector::new()),
    };
    tracing::info!(
        enabled = pii.enabled,
        detector = detector.name(),
        categories = %pii.categories.join(","),
        "pii sanitizer ready"
    );
    Ok(PiiSanitizer::new(pii, detector))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_detector_needs_an_endpoint() {
        let pii = PiiConfig {
            enabled: true,
            detector: PiiDetectorKind::Service,
            ..PiiConfig::default()
        };
        assert!(create_sanitizer(&pii, &LanguageServiceConfig::default()).is_err());
    }

    #[test]
    fn disabled_sanitizer_uses_local_detector() {
        let sanitizer = create_sanitizer(
            &PiiConfig {
                detector: PiiDetectorKind::Service,
                ..PiiConfig::default()
            },
            &LanguageServiceConfig::default(),
        )
        .unwrap();
        assert!(!sanitizer.is_enabled());
        assert_eq!(sanitizer.detector_name(), "pattern");
    }
}
