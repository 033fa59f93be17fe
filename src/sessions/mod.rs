//! Agent sessions: lifecycle, retry and cleanup for agent-mode execution.

pub mod envelope;
pub mod manager;
pub mod provider_backend;
pub mod traits;

pub use envelope::{parse_agent_output, AgentReply};
pub use manager::{AgentSessionManager, SweepReport};
pub use provider_backend::ProviderAgentBackend;
pub use traits::{AgentBackend, AgentSession, AgentTurnResult};

use crate::config::AgentConfig;
use crate::providers::Provider;
use crate::tools::default_tools;
use std::sync::Arc;

/// Create a session manager over the provider-backed agent with the default tools.
pub fn create_session_manager(config: &AgentConfig, provider: Arc<dyn Provider>) -> AgentSessionManager {
    let backend = ProviderAgentBackend::new(
        provider,
        default_tools(),
        &config.instructions,
        config.max_tool_iterations,
    );
    AgentSessionManager::new(Arc::new(backend), config)
}
