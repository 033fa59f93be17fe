//! Agent backend built on a completion provider and the tool loop.
//!
//! Each session owns a chat transcript. A turn runs on a copy and is committed
//! only when it succeeds, so a failed attempt leaves nothing behind.

use super::traits::AgentBackend;
use crate::error::{ParleyError, Result};
use crate::providers::{ChatMessage, Provider};
use crate::tools::{run_tool_loop, Tool};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

pub struct ProviderAgentBackend {
    provider: Arc<dyn Provider>,
    tools: Vec<Arc<dyn Tool>>,
    instructions: String,
    max_tool_iterations: usize,
    transcripts: Mutex<HashMap<String, Vec<ChatMessage>>>,
}

impl ProviderAgentBackend {
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Vec<Arc<dyn Tool>>,
        instructions: &str,
        max_tool_iterations: usize,
    ) -> Self {
        Self {
            provider,
            tools,
            instructions: instructions.to_string(),
            max_tool_iterations,
            transcripts: Mutex::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    pub(crate) fn transcript_len(&self, session_id: &str) -> Option<usize> {
        self.transcripts.lock().get(session_id).map(Vec::len)
    }
}

#[async_trait]
impl AgentBackend for ProviderAgentBackend {
    async fn create_session(&self, conversation_id: &str) -> Result<String> {
        let id = format!("agent-{}", uuid::Uuid::new_v4());
        self.transcripts
            .lock()
            .insert(id.clone(), vec![ChatMessage::system(self.instructions.clone())]);
        tracing::debug!(session_id = %id, conversation_id, "agent session created");
        Ok(id)
    }

    async fn run(&self, session_id: &str, message: &str) -> Result<String> {
        let mut transcript = self
            .transcripts
            .lock()
            .get(session_id)
            .cloned()
            .ok_or_else(|| ParleyError::malformed(self.name(), format!("unknown session {session_id}")))?;

        transcript.push(ChatMessage::user(message));
        let answer = run_tool_loop(
            self.provider.as_ref(),
            &self.tools,
            &mut transcript,
            self.max_tool_iterations,
        )
        .await?;

        if let Some(slot) = self.transcripts.lock().get_mut(session_id) {
            *slot = transcript;
        }
        Ok(answer)
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.transcripts.lock().remove(session_id);
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<String>> {
        Ok(self.transcripts.lock().keys().cloned().collect())
    }

    fn name(&self) -> &str {
        "agent"
    }
}
