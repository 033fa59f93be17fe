//! Intent classification over the `:analyze-conversations` API.

use super::client::LanguageClient;
use super::traits::{compose_query, Classifier, Entity, RankedCandidate};
use crate::conversation::ConversationHistory;
use crate::error::{ParleyError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

pub(crate) const ANALYZE_CONVERSATIONS: &str = "/language/:analyze-conversations";

/// Intent label the service uses for "no intent matched".
pub const NONE_INTENT: &str = "None";

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    result: AnalyzeResult,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResult {
    prediction: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConversationPrediction {
    #[serde(default)]
    top_intent: Option<String>,
    intents: Vec<WireIntent>,
    #[serde(default)]
    entities: Vec<WireEntity>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireIntent {
    category: String,
    confidence_score: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEntity {
    category: String,
    text: String,
    #[serde(default)]
    confidence_score: f64,
}

/// Whether the service's verdict is "nothing matched": `None` is the top
/// intent, or no other intent scores strictly above it.
pub(crate) fn none_prevails(
    top_intent: Option<&str>,
    none_score: Option<f64>,
    candidates: &[RankedCandidate],
) -> bool {
    top_intent == Some(NONE_INTENT)
        || none_score.is_some_and(|none| candidates.iter().all(|c| c.confidence <= none))
}

/// Build the request body shared by conversation and orchestration projects.
pub(crate) fn analyze_request(
    text: &str,
    language: &str,
    project: &str,
    deployment: &str,
) -> serde_json::Value {
    json!({
        "kind": "Conversation",
        "analysisInput": {
            "conversationItem": {
                "id": "1",
                "participantId": "user",
                "modality": "text",
                "language": language,
                "text": text,
            }
        },
        "parameters": {
            "projectName": project,
            "deploymentName": deployment,
            "stringIndexType": "TextElement_V8",
        }
    })
}

/// Pull `result.prediction` out of an analyze-conversations reply.
pub(crate) fn extract_prediction(service: &str, body: serde_json::Value) -> Result<serde_json::Value> {
    serde_json::from_value::<AnalyzeResponse>(body)
        .map(|r| r.result.prediction)
        .map_err(|e| ParleyError::malformed(service, e))
}

/// Decode a conversation-project prediction into ranked candidates.
///
/// `None` never becomes a candidate, and when it prevails the list is empty so
/// the turn is a miss. Extracted entities are attached to every
/// candidate since the service does not tie them to a single intent.
pub(crate) fn parse_conversation_prediction(
    service: &str,
    prediction: serde_json::Value,
) -> Result<Vec<RankedCandidate>> {
    let prediction: ConversationPrediction =
        serde_json::from_value(prediction).map_err(|e| ParleyError::malformed(service, e))?;

    let entities: Vec<Entity> = prediction
        .entities
        .into_iter()
        .map(|e| Entity {
            category: e.category,
            text: e.text,
            confidence: e.confidence_score,
        })
        .collect();

    let mut candidates = Vec::with_capacity(prediction.intents.len());
    let mut none_score = None;
    for intent in prediction.intents {
        if !(0.0..=1.0).contains(&intent.confidence_score) {
            return Err(ParleyError::malformed(
                service,
                format!(
                    "intent {} has confidence {} outside [0, 1]",
                    intent.category, intent.confidence_score
                ),
            ));
        }
        if intent.category == NONE_INTENT {
            none_score = Some(intent.confidence_score);
            continue;
        }
        candidates.push(RankedCandidate::skill(
            &intent.category,
            intent.confidence_score,
            entities.clone(),
        ));
    }

    if none_prevails(prediction.top_intent.as_deref(), none_score, &candidates) {
        return Ok(Vec::new());
    }

    // The service lists the top intent first; keep it first on a tie.
    if let Some(top) = prediction.top_intent.as_deref() {
        if let Some(pos) = candidates.iter().position(|c| c.label == top) {
            let top = candidates.remove(pos);
            candidates.insert(0, top);
        }
    }

    Ok(candidates)
}

/// Intent adapter for a conversation language understanding project.
pub struct IntentClassifier {
    client: Arc<LanguageClient>,
    project: String,
    deployment: String,
}

impl IntentClassifier {
    pub fn new(client: Arc<LanguageClient>, project: &str, deployment: &str) -> Self {
        Self {
            client,
            project: project.to_string(),
            deployment: deployment.to_string(),
        }
    }
}

#[async_trait]
impl Classifier for IntentClassifier {
    async fn resolve(
        &self,
        utterance: &str,
        history: &ConversationHistory,
    ) -> Result<Vec<RankedCandidate>> {
        let query = compose_query(utterance, history);
        let body = analyze_request(
            &query,
            self.client.language(),
            &self.project,
            &self.deployment,
        );
        let reply: serde_json::Value = self
            .client
            .post_json(self.name(), ANALYZE_CONVERSATIONS, &[], &body)
            .await?;
        let prediction = extract_prediction(self.name(), reply)?;
        let candidates = parse_conversation_prediction(self.name(), prediction)?;

        tracing::debug!(
            project = %self.project,
            candidates = candidates.len(),
            "intent classification complete"
        );
        Ok(candidates)
    }

    fn name(&self) -> &str {
        "clu"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifiers::traits::{select_best, CandidatePayload};

    fn prediction() -> serde_json::Value {
        json!({
            "topIntent": "CancelOrder",
            "projectKind": "Conversation",
            "intents": [
                {"category": "CancelOrder", "confidenceScore": 0.91},
                {"category": "None", "confidenceScore": 0.05},
                {"category": "OrderStatus", "confidenceScore": 0.42}
            ],
            "entities": [
                {"category": "OrderId", "text": "12345", "offset": 17, "length": 5, "confidenceScore": 1.0}
            ]
        })
    }

    #[test]
    fn none_intent_is_never_a_candidate() {
        let candidates = parse_conversation_prediction("clu", prediction()).unwrap();
        assert_eq!(candidates.len(), 2);
        assert!(candidates.iter().all(|c| c.label != NONE_INTENT));
        assert_eq!(select_best(&candidates).unwrap().label, "CancelOrder");
    }

    #[test]
    fn none_as_top_intent_yields_no_candidates() {
        let candidates = parse_conversation_prediction(
            "clu",
            json!({
                "topIntent": "None",
                "intents": [
                    {"category": "None", "confidenceScore": 0.9},
                    {"category": "CancelOrder", "confidenceScore": 0.65}
                ]
            }),
        )
        .unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn none_outscoring_every_intent_yields_no_candidates() {
        let candidates = parse_conversation_prediction(
            "clu",
            json!({"intents": [
                {"category": "OrderStatus", "confidenceScore": 0.7},
                {"category": "None", "confidenceScore": 0.8}
            ]}),
        )
        .unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn entities_travel_with_the_skill() {
        let candidates = parse_conversation_prediction("clu", prediction()).unwrap();
        match &candidates[0].payload {
            CandidatePayload::Skill { skill, entities } => {
                assert_eq!(skill, "CancelOrder");
                assert_eq!(entities[0].category, "OrderId");
                assert_eq!(entities[0].text, "12345");
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn missing_intents_is_malformed() {
        let err = parse_conversation_prediction("clu", json!({"topIntent": "X"})).unwrap_err();
        assert!(matches!(err, ParleyError::MalformedResponse { .. }));
    }

    #[test]
    fn out_of_range_confidence_is_malformed() {
        let err = parse_conversation_prediction(
            "clu",
            json!({"intents": [{"category": "OrderStatus", "confidenceScore": 1.7}]}),
        )
        .unwrap_err();
        assert!(matches!(err, ParleyError::MalformedResponse { .. }));
    }

    #[test]
    fn extract_prediction_requires_result() {
        assert!(extract_prediction("clu", json!({"kind": "ConversationResult"})).is_err());
        let prediction = extract_prediction(
            "clu",
            json!({"kind": "ConversationResult", "result": {"query": "q", "prediction": prediction()}}),
        )
        .unwrap();
        assert_eq!(prediction["topIntent"], "CancelOrder");
    }

    #[test]
    fn request_carries_project_and_text() {
        let body = analyze_request("where is order 5", "en", "orders", "prod");
        assert_eq!(body["kind"], "Conversation");
        assert_eq!(body["analysisInput"]["conversationItem"]["text"], "where is order 5");
        assert_eq!(body["parameters"]["projectName"], "orders");
        assert_eq!(body["parameters"]["deploymentName"], "prod");
    }
}
