pub mod schema;

#[allow(unused_imports)]
pub use schema::{
    AgentConfig, Config, ExecutionMode, GatewayConfig, GenerationConfig, LanguageServiceConfig,
    PiiConfig, PiiDetectorKind, RouterConfig, RouterStrategy, Threshold,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reexported_config_default_is_constructible() {
        let config = Config::default();

        assert_eq!(config.router.strategy, RouterStrategy::Bypass);
        assert_eq!(config.agent.mode, ExecutionMode::Direct);
        assert!(config.gateway.port > 0);
    }
}
