//! Response assembler: turns a routing outcome into the outbound payload.

use crate::conversation::StateTracker;
use crate::error::Result;
use crate::pii::PiiSanitizer;
use crate::routing::Resolution;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shown whenever a turn cannot produce a safe answer.
pub const APOLOGY: &str =
    "I apologize, but I'm having trouble processing your request. Please try again.";

/// Outbound payload for one turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnResponse {
    pub messages: Vec<String>,
    pub need_more_info: bool,
}

impl TurnResponse {
    pub fn apology() -> Self {
        Self {
            messages: vec![APOLOGY.to_string()],
            need_more_info: false,
        }
    }
}

pub struct ResponseAssembler {
    sanitizer: Arc<PiiSanitizer>,
}

impl ResponseAssembler {
    pub fn new(sanitizer: Arc<PiiSanitizer>) -> Self {
        Self { sanitizer }
    }

    /// Sanitize every fragment and derive the next clarification flag.
    ///
    /// Output is scanned even when the input already was. A routing error, an
    /// empty resolution or a failed output scan all produce the apology.
    pub async fn assemble(&self, outcome: Result<Resolution>) -> TurnResponse {
        let resolution = match outcome {
            Ok(resolution) => resolution,
            Err(e) => {
                tracing::error!("turn failed: {e}");
                return TurnResponse::apology();
            }
        };

        let fragments: Vec<&String> = resolution
            .messages
            .iter()
            .filter(|m| !m.trim().is_empty())
            .collect();
        if fragments.is_empty() {
            tracing::warn!(strategy = %resolution.decision.strategy, "resolver produced no text");
            return TurnResponse::apology();
        }

        let mut messages = Vec::with_capacity(fragments.len());
        for fragment in fragments {
            match self.sanitizer.sanitize(fragment).await {
                Ok(clean) => messages.push(clean.text),
                Err(e) => {
                    tracing::error!("outbound pii scan failed: {e}");
                    return TurnResponse::apology();
                }
            }
        }

        TurnResponse {
            messages,
            need_more_info: StateTracker::update(resolution.need_more_info),
        }
    }
}
