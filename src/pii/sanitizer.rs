use super::traits::{PiiDetector, PiiEntity};
use crate::config::PiiConfig;
use crate::conversation::{ConversationHistory, ConversationTurn};
use crate::error::Result;
use regex::Regex;
use std::sync::{Arc, OnceLock};

/// Placeholder text substituted for a redacted span.
pub fn placeholder(category: &str) -> String {
    format!("[{category}]")
}

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\[[A-Za-z][A-Za-z0-9]*\]").expect("placeholder pattern must compile")
    })
}

/// Outcome of one sanitize call.
#[derive(Debug, Clone, PartialEq)]
pub struct Sanitized {
    pub text: String,
    /// Every entity the detector reported, redacted or not.
    pub entities: Vec<PiiEntity>,
    pub redacted: usize,
}

impl Sanitized {
    fn untouched(text: &str) -> Self {
        Self {
            text: text.to_string(),
            entities: Vec::new(),
            redacted: 0,
        }
    }
}

/// Replace every entity that passes `config` with its category placeholder.
///
/// Entities with invalid spans, sub-threshold confidence, a category outside
/// the allow-list, or a span touching an existing placeholder are left alone.
/// Overlapping entities resolve to the earliest, then longest, span.
/// Returns the new text and the number of spans replaced.
pub fn redact(text: &str, entities: &[PiiEntity], config: &PiiConfig) -> (String, usize) {
    let placeholders: Vec<(usize, usize)> = placeholder_regex()
        .find_iter(text)
        .map(|m| (m.start(), m.end()))
        .collect();

    let mut accepted: Vec<&PiiEntity> = entities
        .iter()
        .filter(|e| e.is_valid_for(text))
        .filter(|e| config.threshold_for(&e.category).accepts(e.confidence))
        .filter(|e| !placeholders.iter().any(|&(s, end)| e.overlaps(s, end)))
        .collect();
    accepted.sort_by(|a, b| {
        a.span
            .0
            .cmp(&b.span.0)
            .then_with(|| (b.span.1 - b.span.0).cmp(&(a.span.1 - a.span.0)))
    });

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    let mut count = 0;
    for entity in accepted {
        let (start, end) = entity.span;
        if start < cursor {
            continue;
        }
        out.push_str(&text[cursor..start]);
        out.push_str(&placeholder(&entity.category));
        cursor = end;
        count += 1;
    }
    out.push_str(&text[cursor..]);
    (out, count)
}

/// Redacts configured PII categories from text entering or leaving the core.
///
/// Holds no per-turn state: each call scans, redacts and forgets.
pub struct PiiSanitizer {
    config: PiiConfig,
    detector: Arc<dyn PiiDetector>,
}

impl PiiSanitizer {
    pub fn new(config: &PiiConfig, detector: Arc<dyn PiiDetector>) -> Self {
        Self {
            config: config.clone(),
            detector,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn detector_name(&self) -> &str {
        self.detector.name()
    }

    /// Scan and redact. When disabled the text passes through and the
    /// detector is never called.
    pub async fn sanitize(&self, text: &str) -> Result<Sanitized> {
        if !self.config.enabled || text.is_empty() {
            return Ok(Sanitized::untouched(text));
        }

        let entities = self.detector.detect(text).await?;
        let (clean, redacted) = redact(text, &entities, &self.config);

        if !entities.is_empty() {
            let mut categories: Vec<&str> = entities.iter().map(|e| e.category.as_str()).collect();
            categories.sort_unstable();
            categories.dedup();
            tracing::debug!(
                detector = self.detector.name(),
                found = entities.len(),
                redacted,
                categories = %categories.join(","),
                "pii scan"
            );
        }

        Ok(Sanitized {
            text: clean,
            entities,
            redacted,
        })
    }

    /// Sanitize every turn's content, keeping roles and order.
    pub async fn sanitize_history(&self, history: &ConversationHistory) -> Result<ConversationHistory> {
        if !self.config.enabled {
            return Ok(history.clone());
        }
        let mut turns = Vec::with_capacity(history.len());
        for turn in history {
            let clean = self.sanitize(turn.content()).await?;
            turns.push(ConversationTurn::new(turn.role(), clean.text));
        }
        Ok(ConversationHistory::from(turns))
    }
}
