//! Confidence-scored classifier adapters.
//!
//! Every adapter implements [`Classifier`] and returns ranked candidates. The
//! factory [`create_classifiers`] builds the adapters whose projects are
//! configured; the router decides which one it consults.

pub mod client;
pub mod clu;
pub mod cqa;
pub mod orchestration;
pub mod traits;

pub use client::LanguageClient;
pub use clu::IntentClassifier;
pub use cqa::KnowledgeBaseClassifier;
pub use orchestration::OrchestrationClassifier;
pub use traits::{
    compose_query, select_best, CandidatePayload, ChildKind, Classifier, Entity, RankedCandidate,
};

use crate::config::{Config, RouterStrategy};
use crate::error::{ParleyError, Result};
use std::sync::Arc;

/// The adapters available to a router instance.
#[derive(Clone, Default)]
pub struct ClassifierSet {
    pub intent: Option<Arc<dyn Classifier>>,
    pub knowledge_base: Option<Arc<dyn Classifier>>,
    pub orchestration: Option<Arc<dyn Classifier>>,
}

impl ClassifierSet {
    pub fn child(&self, kind: ChildKind) -> Option<&Arc<dyn Classifier>> {
        match kind {
            ChildKind::Intent => self.intent.as_ref(),
            ChildKind::KnowledgeBase => self.knowledge_base.as_ref(),
        }
    }
}

fn project_pair<'a>(project: Option<&'a str>, deployment: Option<&'a str>) -> Option<(&'a str, &'a str)> {
    match (project, deployment) {
        (Some(p), Some(d)) if !p.trim().is_empty() && !d.trim().is_empty() => Some((p, d)),
        _ => None,
    }
}

/// Factory: build the adapters the configured strategy can reach.
///
/// Bypass and function calling consult no classifier, so nothing is built
/// and no language endpoint is required. For the classifier strategies the
/// first-level adapter must be configured.
pub fn create_classifiers(config: &Config) -> Result<ClassifierSet> {
    let strategy = config.router.strategy;
    if matches!(strategy, RouterStrategy::Bypass | RouterStrategy::FunctionCalling) {
        return Ok(ClassifierSet::default());
    }

    let language = &config.language;
    let client = Arc::new(LanguageClient::new(language)?);
    let mut set = ClassifierSet::default();

    if let Some((project, deployment)) = project_pair(
        language.clu_project.as_deref(),
        language.clu_deployment.as_deref(),
    ) {
        set.intent = Some(Arc::new(IntentClassifier::new(
            Arc::clone(&client),
            project,
            deployment,
        )));
    }
    if let Some((project, deployment)) = project_pair(
        language.cqa_project.as_deref(),
        language.cqa_deployment.as_deref(),
    ) {
        set.knowledge_base = Some(Arc::new(KnowledgeBaseClassifier::new(
            Arc::clone(&client),
            project,
            deployment,
        )));
    }
    if let Some((project, deployment)) = project_pair(
        language.orchestration_project.as_deref(),
        language.orchestration_deployment.as_deref(),
    ) {
        set.orchestration = Some(Arc::new(OrchestrationClassifier::new(
            Arc::clone(&client),
            project,
            deployment,
        )));
    }

    let first_level = match strategy {
        RouterStrategy::Clu => set.intent.is_some(),
        RouterStrategy::Cqa => set.knowledge_base.is_some(),
        RouterStrategy::Orchestration => set.orchestration.is_some(),
        RouterStrategy::Bypass | RouterStrategy::FunctionCalling => true,
    };
    if !first_level {
        return Err(ParleyError::Configuration(format!(
            "router strategy {strategy} needs its language project and deployment names"
        )));
    }

    tracing::info!(
        %strategy,
        intent = set.intent.is_some(),
        knowledge_base = set.knowledge_base.is_some(),
        orchestration = set.orchestration.is_some(),
        "classifier adapters ready"
    );
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(strategy: RouterStrategy) -> Config {
        let mut config = Config::default();
        config.router.strategy = strategy;
        config.language.endpoint = Some("https://lang.example.com".into());
        config
    }

    #[test]
    fn bypass_builds_nothing_and_needs_no_endpoint() {
        let mut config = Config::default();
        config.language.endpoint = None;
        let set = create_classifiers(&config).unwrap();
        assert!(set.intent.is_none() && set.knowledge_base.is_none() && set.orchestration.is_none());
    }

    #[test]
    fn selected_strategy_needs_its_project() {
        let err = create_classifiers(&config(RouterStrategy::Cqa)).err().unwrap();
        assert!(matches!(err, ParleyError::Configuration(_)));
    }

    #[test]
    fn builds_configured_adapters() {
        let mut config = config(RouterStrategy::Orchestration);
        config.language.orchestration_project = Some("orch".into());
        config.language.orchestration_deployment = Some("prod".into());
        config.language.cqa_project = Some("faq".into());
        config.language.cqa_deployment = Some("prod".into());
        let set = create_classifiers(&config).unwrap();
        assert_eq!(set.orchestration.as_ref().unwrap().name(), "orchestration");
        assert_eq!(set.child(ChildKind::KnowledgeBase).unwrap().name(), "cqa");
        assert!(set.child(ChildKind::Intent).is_none());
    }
}
