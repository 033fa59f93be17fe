//! Message routing: resolves every turn with one configured strategy.

pub mod generation;
pub mod router;
pub mod traits;

pub use generation::FreeFormGenerator;
pub use router::{Router, RouterBuilder};
pub use traits::{Resolution, RouteDecision};

use crate::classifiers::ClassifierSet;
use crate::config::Config;
use crate::error::Result;
use crate::providers::Provider;
use crate::sessions::AgentSessionManager;
use crate::skills::default_skills;
use crate::tools::default_tools;
use std::sync::Arc;

/// Create a router from the loaded configuration with the bundled skills and
/// tools. `sessions` is required in agent execution mode.
pub fn create_router(
    config: &Config,
    classifiers: ClassifierSet,
    provider: Arc<dyn Provider>,
    sessions: Option<Arc<AgentSessionManager>>,
) -> Result<Router> {
    let mut builder = Router::builder(config.router.clone())
        .mode(config.agent.mode)
        .classifiers(classifiers)
        .skills(default_skills())
        .provider(provider)
        .system_prompt(&config.generation.system_prompt)
        .tools(
            default_tools(),
            &config.agent.instructions,
            config.agent.max_tool_iterations,
        );
    if let Some(sessions) = sessions {
        builder = builder.sessions(sessions);
    }
    builder.build()
}
