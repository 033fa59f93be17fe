//! Free-form generation: the fallback every classifier strategy lands on.

use crate::chat::APOLOGY;
use crate::conversation::{ConversationHistory, Role};
use crate::providers::{ChatMessage, ChatRequest, Provider};
use std::sync::Arc;

/// Map conversation turns onto chat roles. System-side turns are what the
/// assistant said.
pub(crate) fn history_messages(history: &ConversationHistory) -> Vec<ChatMessage> {
    history
        .iter()
        .map(|turn| match turn.role() {
            Role::User => ChatMessage::user(turn.content()),
            Role::System => ChatMessage::assistant(turn.content()),
        })
        .collect()
}

pub struct FreeFormGenerator {
    provider: Arc<dyn Provider>,
    system_prompt: String,
}

impl FreeFormGenerator {
    pub fn new(provider: Arc<dyn Provider>, system_prompt: &str) -> Self {
        Self {
            provider,
            system_prompt: system_prompt.to_string(),
        }
    }

    /// Answer `utterance` given the forwarded history. Never fails: a provider
    /// error or an empty completion becomes the apology message.
    pub async fn generate(&self, utterance: &str, history: &ConversationHistory) -> Vec<String> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(self.system_prompt.clone()));
        messages.extend(history_messages(history));
        messages.push(ChatMessage::user(utterance));

        match self
            .provider
            .chat(ChatRequest {
                messages: &messages,
                tools: None,
            })
            .await
        {
            Ok(response) if !response.text_or_empty().is_empty() => {
                vec![response.text_or_empty().to_string()]
            }
            Ok(_) => {
                tracing::warn!(provider = self.provider.name(), "empty free-form completion");
                vec![APOLOGY.to_string()]
            }
            Err(e) => {
                tracing::warn!(provider = self.provider.name(), "free-form generation failed: {e}");
                vec![APOLOGY.to_string()]
            }
        }
    }
}
