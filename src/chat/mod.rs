//! Turn pipeline: sanitize, replay history, route, assemble.

pub mod assembler;

pub use assembler::{ResponseAssembler, TurnResponse, APOLOGY};

use crate::classifiers::create_classifiers;
use crate::config::{Config, ExecutionMode, RouterStrategy};
use crate::conversation::{ConversationHistory, ConversationTurn, StateTracker};
use crate::error::Result;
use crate::pii::{create_sanitizer, PiiSanitizer};
use crate::providers::create_provider;
use crate::routing::{create_router, Router};
use crate::sessions::create_session_manager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Conversation id used when the client sends none.
pub const DEFAULT_CONVERSATION: &str = "default";

/// One history entry as sent by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireTurn {
    pub role: String,
    pub content: String,
}

/// Inbound payload for one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<WireTurn>,
    /// Flag echoed back from the previous response. When absent, a non-empty
    /// history is taken as a pending clarification.
    #[serde(default)]
    pub need_more_info: Option<bool>,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

impl TurnRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            history: Vec::new(),
            need_more_info: None,
            conversation_id: None,
        }
    }

    fn history(&self) -> ConversationHistory {
        self.history
            .iter()
            .filter_map(|turn| ConversationTurn::from_wire(&turn.role, &turn.content))
            .collect()
    }
}

pub struct ChatService {
    router: Router,
    sanitizer: Arc<PiiSanitizer>,
    assembler: ResponseAssembler,
}

impl ChatService {
    pub fn new(router: Router, sanitizer: Arc<PiiSanitizer>) -> Self {
        Self {
            router,
            assembler: ResponseAssembler::new(Arc::clone(&sanitizer)),
            sanitizer,
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn pii_enabled(&self) -> bool {
        self.sanitizer.is_enabled()
    }

    /// Run one turn. Always returns a well-formed payload; failures become
    /// the apology message.
    ///
    /// Without a conversation id, agent sessions are scoped to the request:
    /// a fresh session serves the turn and is deleted right after it.
    pub async fn handle(&self, request: TurnRequest) -> TurnResponse {
        let given = request
            .conversation_id
            .as_deref()
            .filter(|id| !id.trim().is_empty());
        let single_use = match (given, self.router.sessions()) {
            (None, Some(sessions)) => Some((format!("turn-{}", uuid::Uuid::new_v4()), sessions)),
            _ => None,
        };
        let conversation_id = match (&single_use, given) {
            (Some((id, _)), _) => id.clone(),
            (None, Some(id)) => id.to_string(),
            (None, None) => DEFAULT_CONVERSATION.to_string(),
        };

        let response = self.run(request, &conversation_id).await;
        if let Some((id, sessions)) = single_use {
            sessions.evict(&id).await;
        }
        response
    }

    async fn run(&self, request: TurnRequest, conversation_id: &str) -> TurnResponse {
        let history = request.history();
        let need_more_info = request.need_more_info.unwrap_or(!history.is_empty());

        let inbound = self
            .sanitize_inbound(&request.message, need_more_info, &history)
            .await;
        let (message, replayed) = match inbound {
            Ok(inbound) => inbound,
            Err(e) => {
                tracing::error!(conversation_id = %conversation_id, "inbound pii scan failed: {e}");
                return TurnResponse::apology();
            }
        };

        let outcome = self.router.route(&message, &replayed, conversation_id).await;
        if let Ok(resolution) = &outcome {
            tracing::info!(
                conversation_id = %conversation_id,
                strategy = %resolution.decision.strategy,
                confidence = ?resolution.decision.confidence,
                target = ?resolution.decision.target_skill,
                fell_back = resolution.decision.fell_back,
                replayed_turns = replayed.len(),
                "turn routed"
            );
        }
        self.assembler.assemble(outcome).await
    }

    async fn sanitize_inbound(
        &self,
        message: &str,
        need_more_info: bool,
        history: &ConversationHistory,
    ) -> Result<(String, ConversationHistory)> {
        let message = self.sanitizer.sanitize(message).await?.text;
        let replayed = StateTracker::prepare_history(need_more_info, history);
        let replayed = self.sanitizer.sanitize_history(&replayed).await?;
        Ok((message, replayed))
    }
}

/// Build the full pipeline from configuration.
pub fn create_chat_service(config: &Config) -> Result<ChatService> {
    let classifiers = create_classifiers(config)?;
    let provider = create_provider(&config.generation);
    let sessions = (config.agent.mode == ExecutionMode::Agent
        && config.router.strategy == RouterStrategy::FunctionCalling)
        .then(|| Arc::new(create_session_manager(&config.agent, Arc::clone(&provider))));
    let router = create_router(config, classifiers, provider, sessions)?;
    let sanitizer = Arc::new(create_sanitizer(&config.pii, &config.language)?);
    Ok(ChatService::new(router, sanitizer))
}
