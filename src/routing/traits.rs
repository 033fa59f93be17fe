//! Per-turn routing types.

use crate::config::RouterStrategy;
use serde::Serialize;

/// Which path a turn took. Built fresh per turn and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteDecision {
    pub strategy: RouterStrategy,
    /// Confidence of the first-level candidate, when a classifier ran.
    pub confidence: Option<f64>,
    /// Skill or answer label that produced the reply.
    pub target_skill: Option<String>,
    /// The strategy missed and free-form generation answered instead.
    pub fell_back: bool,
}

impl RouteDecision {
    pub fn new(strategy: RouterStrategy) -> Self {
        Self {
            strategy,
            confidence: None,
            target_skill: None,
            fell_back: false,
        }
    }
}

/// Output of the chosen resolver for one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub messages: Vec<String>,
    /// Explicit clarification signal, when the resolver gave one.
    pub need_more_info: Option<bool>,
    pub decision: RouteDecision,
}
