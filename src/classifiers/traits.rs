//! Classifier adapter traits and the ranked-candidate contract.

use crate::conversation::{ConversationHistory, Role};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// An entity extracted alongside an intent (e.g. `OrderId = 12345`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    pub category: String,
    pub text: String,
    pub confidence: f64,
}

/// Which child classifier an orchestration target delegates to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChildKind {
    Intent,
    KnowledgeBase,
}

/// What accepting a candidate means.
#[derive(Debug, Clone, PartialEq)]
pub enum CandidatePayload {
    /// Dispatch to the named skill with the extracted entities.
    Skill {
        skill: String,
        entities: Vec<Entity>,
    },
    /// Return this answer verbatim.
    Answer { text: String },
    /// Resolve again with a child classifier. `resolved` carries the child's
    /// candidates when the orchestration service already ran it.
    Delegate {
        target: ChildKind,
        resolved: Option<Vec<RankedCandidate>>,
    },
}

/// One ranked classifier output.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedCandidate {
    pub label: String,
    pub confidence: f64,
    pub payload: CandidatePayload,
}

impl RankedCandidate {
    pub fn skill(label: &str, confidence: f64, entities: Vec<Entity>) -> Self {
        Self {
            label: label.to_string(),
            confidence,
            payload: CandidatePayload::Skill {
                skill: label.to_string(),
                entities,
            },
        }
    }

    pub fn answer(label: &str, confidence: f64, text: &str) -> Self {
        Self {
            label: label.to_string(),
            confidence,
            payload: CandidatePayload::Answer {
                text: text.to_string(),
            },
        }
    }
}

/// Highest-confidence candidate; on an exact tie the earliest one wins.
///
/// The tie order is whatever the adapter returned. It is deterministic but
/// carries no meaning.
pub fn select_best(candidates: &[RankedCandidate]) -> Option<&RankedCandidate> {
    candidates.iter().fold(None, |best, candidate| match best {
        Some(current) if current.confidence >= candidate.confidence => Some(current),
        _ => Some(candidate),
    })
}

/// Text sent to a classifier: earlier user turns followed by the utterance.
pub fn compose_query(utterance: &str, history: &ConversationHistory) -> String {
    let mut parts: Vec<&str> = history
        .iter()
        .filter(|turn| turn.role() == Role::User)
        .map(|turn| turn.content())
        .collect();
    parts.push(utterance);
    parts.join(" ")
}

/// Confidence-scored resolution strategy.
///
/// Implementations fail with `UpstreamUnavailable` on transport or service
/// errors and `MalformedResponse` when the service breaks its contract.
/// Retrying is the caller's job.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn resolve(
        &self,
        utterance: &str,
        history: &ConversationHistory,
    ) -> Result<Vec<RankedCandidate>>;

    fn name(&self) -> &str;
}
