//! Remote PII recognition over the language service `:analyze-text` API.

use super::traits::{PiiDetector, PiiEntity};
use crate::classifiers::LanguageClient;
use crate::error::{ParleyError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

const ANALYZE_TEXT: &str = "/language/:analyze-text";

#[derive(Debug, Deserialize)]
struct AnalyzeTextResponse {
    results: AnalyzeTextResults,
}

#[derive(Debug, Deserialize)]
struct AnalyzeTextResults {
    documents: Vec<WireDocument>,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct WireDocument {
    entities: Vec<WireEntity>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEntity {
    category: String,
    offset: usize,
    length: usize,
    confidence_score: f64,
}

/// Byte offset of the `char_offset`-th code point, or `None` past the end.
fn byte_offset(text: &str, char_offset: usize) -> Option<usize> {
    if char_offset == text.chars().count() {
        return Some(text.len());
    }
    text.char_indices().nth(char_offset).map(|(i, _)| i)
}

/// Convert a reply into entities with byte spans. Offsets are requested as
/// Unicode code points.
pub(crate) fn parse_entities(text: &str, body: serde_json::Value) -> Result<Vec<PiiEntity>> {
    let response: AnalyzeTextResponse =
        serde_json::from_value(body).map_err(|e| ParleyError::malformed("pii", e))?;

    if let Some(error) = response.results.errors.first() {
        return Err(ParleyError::malformed("pii", format!("document error: {error}")));
    }
    let Some(document) = response.results.documents.into_iter().next() else {
        return Err(ParleyError::malformed("pii", "no document in response"));
    };

    let mut entities = Vec::with_capacity(document.entities.len());
    for entity in document.entities {
        let (Some(start), Some(end)) = (
            byte_offset(text, entity.offset),
            byte_offset(text, entity.offset + entity.length),
        ) else {
            return Err(ParleyError::malformed(
                "pii",
                format!("entity span {}+{} outside text", entity.offset, entity.length),
            ));
        };
        entities.push(PiiEntity::new(
            &entity.category,
            start,
            end,
            entity.confidence_score,
        ));
    }
    Ok(entities)
}

/// Detector backed by the language service PII recognizer.
pub struct ServiceDetector {
    client: Arc<LanguageClient>,
    categories: Vec<String>,
}

impl ServiceDetector {
    pub fn new(client: Arc<LanguageClient>, categories: &[String]) -> Self {
        Self {
            client,
            categories: categories.to_vec(),
        }
    }
}

#[async_trait]
impl PiiDetector for ServiceDetector {
    async fn detect(&self, text: &str) -> Result<Vec<PiiEntity>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let body = json!({
            "kind": "PiiEntityRecognition",
            "analysisInput": {
                "documents": [{"id": "1", "language": self.client.language(), "text": text}]
            },
            "parameters": {
                "modelVersion": "latest",
                "piiCategories": self.categories,
                "stringIndexType": "UnicodeCodePoint",
            }
        });
        let reply: serde_json::Value = self
            .client
            .post_json(self.name(), ANALYZE_TEXT, &[], &body)
            .await?;
        parse_entities(text, reply)
    }

    fn name(&self) -> &str {
        "pii"
    }
}
