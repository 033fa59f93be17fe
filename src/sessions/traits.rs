//! Agent session types and the backend trait the session manager drives.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A live tool-calling agent session, bound to exactly one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSession {
    /// Backend-assigned session id.
    pub id: String,
    pub conversation_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Retries spent across all turns of this session.
    pub retries_used: u32,
}

impl AgentSession {
    pub fn new(id: String, conversation_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id,
            conversation_id: conversation_id.to_string(),
            created_at: now,
            last_activity: now,
            retries_used: 0,
        }
    }
}

/// Decoded result of one agent turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentTurnResult {
    pub messages: Vec<String>,
    pub need_more_info: bool,
    /// Backend calls made for this turn, including the first.
    pub attempts: u32,
}

/// A stateful agent service: sessions keep their own transcript.
///
/// Implementations must be `Send + Sync`; the session manager guarantees
/// that at most one `run` per session is in flight.
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Create a session for `conversation_id` and return its id.
    async fn create_session(&self, conversation_id: &str) -> Result<String>;

    /// Send one user message and return the agent's raw final output.
    ///
    /// A failed run must leave the session transcript as it was.
    ///
    /// # Errors
    ///
    /// `UpstreamUnavailable` for transient failures (retried by the manager),
    /// anything else is final for the turn.
    async fn run(&self, session_id: &str, message: &str) -> Result<String>;

    async fn delete_session(&self, session_id: &str) -> Result<()>;

    /// Every session the backend currently holds, including ones the manager
    /// no longer tracks.
    async fn list_sessions(&self) -> Result<Vec<String>>;

    fn name(&self) -> &str;
}
