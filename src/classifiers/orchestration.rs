//! Hierarchical orchestration project over `:analyze-conversations`.
//!
//! Each top-level intent targets a child project. The service usually runs
//! the child itself and embeds its result; those embedded results become the
//! `resolved` candidates of a [`CandidatePayload::Delegate`].

use super::client::LanguageClient;
use super::clu::{
    analyze_request, extract_prediction, none_prevails, parse_conversation_prediction,
    ANALYZE_CONVERSATIONS, NONE_INTENT,
};
use super::cqa::parse_answers;
use super::traits::{compose_query, CandidatePayload, ChildKind, Classifier, RankedCandidate};
use crate::conversation::ConversationHistory;
use crate::error::{ParleyError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrchestrationPrediction {
    #[serde(default)]
    top_intent: Option<String>,
    intents: BTreeMap<String, TargetIntent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetIntent {
    confidence_score: f64,
    target_project_kind: String,
    #[serde(default)]
    result: Option<serde_json::Value>,
}

fn child_candidates(
    service: &str,
    kind: ChildKind,
    result: Option<serde_json::Value>,
) -> Result<Option<Vec<RankedCandidate>>> {
    let Some(result) = result else {
        return Ok(None);
    };
    let candidates = match kind {
        ChildKind::Intent => {
            let prediction = result
                .get("prediction")
                .cloned()
                .ok_or_else(|| ParleyError::malformed(service, "child result has no prediction"))?;
            parse_conversation_prediction(service, prediction)?
        }
        ChildKind::KnowledgeBase => parse_answers(service, result)?,
    };
    Ok(Some(candidates))
}

/// Decode an orchestration prediction into top-level candidates.
///
/// Intents arrive as a map, so candidates follow the service's top intent and
/// then intent-name order. Conversation and question-answering targets become
/// delegations; non-linked intents are dispatched as skills directly.
pub(crate) fn parse_orchestration_prediction(
    service: &str,
    prediction: serde_json::Value,
) -> Result<Vec<RankedCandidate>> {
    let prediction: OrchestrationPrediction =
        serde_json::from_value(prediction).map_err(|e| ParleyError::malformed(service, e))?;

    let mut candidates = Vec::with_capacity(prediction.intents.len());
    let mut none_score = None;
    for (name, intent) in prediction.intents {
        if !(0.0..=1.0).contains(&intent.confidence_score) {
            return Err(ParleyError::malformed(
                service,
                format!("intent {name} has confidence {} outside [0, 1]", intent.confidence_score),
            ));
        }
        if name == NONE_INTENT {
            none_score = Some(intent.confidence_score);
            continue;
        }
        let payload = match intent.target_project_kind.as_str() {
            "Conversation" => CandidatePayload::Delegate {
                target: ChildKind::Intent,
                resolved: child_candidates(service, ChildKind::Intent, intent.result)?,
            },
            "QuestionAnswering" => CandidatePayload::Delegate {
                target: ChildKind::KnowledgeBase,
                resolved: child_candidates(service, ChildKind::KnowledgeBase, intent.result)?,
            },
            "NonLinked" => CandidatePayload::Skill {
                skill: name.clone(),
                entities: Vec::new(),
            },
            other => {
                return Err(ParleyError::malformed(
                    service,
                    format!("unsupported target project kind {other}"),
                ))
            }
        };
        candidates.push(RankedCandidate {
            label: name,
            confidence: intent.confidence_score,
            payload,
        });
    }

    if none_prevails(prediction.top_intent.as_deref(), none_score, &candidates) {
        return Ok(Vec::new());
    }

    if let Some(top) = prediction.top_intent.as_deref() {
        if let Some(pos) = candidates.iter().position(|c| c.label == top) {
            let top = candidates.remove(pos);
            candidates.insert(0, top);
        }
    }

    Ok(candidates)
}

/// Hierarchical orchestration adapter.
pub struct OrchestrationClassifier {
    client: Arc<LanguageClient>,
    project: String,
    deployment: String,
}

impl OrchestrationClassifier {
    pub fn new(client: Arc<LanguageClient>, project: &str, deployment: &str) -> Self {
        Self {
            client,
            project: project.to_string(),
            deployment: deployment.to_string(),
        }
    }
}

#[async_trait]
impl Classifier for OrchestrationClassifier {
    async fn resolve(
        &self,
        utterance: &str,
        history: &ConversationHistory,
    ) -> Result<Vec<RankedCandidate>> {
        let body = analyze_request(
            &compose_query(utterance, history),
            self.client.language(),
            &self.project,
            &self.deployment,
        );
        let reply: serde_json::Value = self
            .client
            .post_json(self.name(), ANALYZE_CONVERSATIONS, &[], &body)
            .await?;
        let prediction = extract_prediction(self.name(), reply)?;
        parse_orchestration_prediction(self.name(), prediction)
    }

    fn name(&self) -> &str {
        "orchestration"
    }
}
