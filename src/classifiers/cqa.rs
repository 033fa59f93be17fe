//! Knowledge-base question answering over `:query-knowledgebases`.

use super::client::LanguageClient;
use super::traits::{compose_query, Classifier, RankedCandidate};
use crate::conversation::ConversationHistory;
use crate::error::{ParleyError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

const QUERY_KNOWLEDGEBASES: &str = "/language/:query-knowledgebases";

/// Answer id the service returns when nothing in the knowledge base matched.
const NO_ANSWER_ID: i64 = -1;

#[derive(Debug, Deserialize)]
struct QueryResponse {
    answers: Vec<WireAnswer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAnswer {
    answer: String,
    confidence_score: f64,
    #[serde(default)]
    id: Option<i64>,
}

pub(crate) fn query_request(question: &str) -> serde_json::Value {
    json!({
        "question": question,
        "top": 3,
        "includeUnstructuredSources": true,
    })
}

/// Decode a knowledge-base reply. Default "no answer" entries are dropped.
pub(crate) fn parse_answers(service: &str, body: serde_json::Value) -> Result<Vec<RankedCandidate>> {
    let response: QueryResponse =
        serde_json::from_value(body).map_err(|e| ParleyError::malformed(service, e))?;

    let mut candidates = Vec::with_capacity(response.answers.len());
    for answer in response.answers {
        if !(0.0..=1.0).contains(&answer.confidence_score) {
            return Err(ParleyError::malformed(
                service,
                format!("answer confidence {} outside [0, 1]", answer.confidence_score),
            ));
        }
        if answer.id == Some(NO_ANSWER_ID) || answer.answer.trim().is_empty() {
            continue;
        }
        let label = answer
            .id
            .map_or_else(|| "answer".to_string(), |id| format!("answer-{id}"));
        candidates.push(RankedCandidate::answer(
            &label,
            answer.confidence_score,
            &answer.answer,
        ));
    }
    Ok(candidates)
}

/// Knowledge-base adapter for a custom question answering project.
pub struct KnowledgeBaseClassifier {
    client: Arc<LanguageClient>,
    project: String,
    deployment: String,
}

impl KnowledgeBaseClassifier {
    pub fn new(client: Arc<LanguageClient>, project: &str, deployment: &str) -> Self {
        Self {
            client,
            project: project.to_string(),
            deployment: deployment.to_string(),
        }
    }
}

#[async_trait]
impl Classifier for KnowledgeBaseClassifier {
    async fn resolve(
        &self,
        utterance: &str,
        history: &ConversationHistory,
    ) -> Result<Vec<RankedCandidate>> {
        let question = compose_query(utterance, history);
        let reply: serde_json::Value = self
            .client
            .post_json(
                self.name(),
                QUERY_KNOWLEDGEBASES,
                &[
                    ("projectName", self.project.as_str()),
                    ("deploymentName", self.deployment.as_str()),
                ],
                &query_request(&question),
            )
            .await?;
        parse_answers(self.name(), reply)
    }

    fn name(&self) -> &str {
        "cqa"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifiers::traits::{select_best, CandidatePayload};

    #[test]
    fn parses_answers_in_service_order() {
        let candidates = parse_answers(
            "cqa",
            json!({"answers": [
                {"answer": "Returns are accepted within 30 days.", "confidenceScore": 0.92, "id": 7},
                {"answer": "Store hours are 9 to 5.", "confidenceScore": 0.31, "id": 2}
            ]}),
        )
        .unwrap();
        assert_eq!(candidates.len(), 2);
        let best = select_best(&candidates).unwrap();
        assert_eq!(best.label, "answer-7");
        assert_eq!(
            best.payload,
            CandidatePayload::Answer {
                text: "Returns are accepted within 30 days.".into()
            }
        );
    }

    #[test]
    fn default_no_answer_is_dropped() {
        let candidates = parse_answers(
            "cqa",
            json!({"answers": [
                {"answer": "No answer found", "confidenceScore": 0.0, "id": -1}
            ]}),
        )
        .unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn missing_answers_field_is_malformed() {
        let err = parse_answers("cqa", json!({"result": []})).unwrap_err();
        assert!(matches!(err, ParleyError::MalformedResponse { .. }));
    }
}
