//! Strategy router: picks one resolver per turn and falls back to free-form
//! generation whenever the chosen resolver misses.

use super::generation::{history_messages, FreeFormGenerator};
use super::traits::{Resolution, RouteDecision};
use crate::classifiers::{
    select_best, CandidatePayload, ChildKind, Classifier, ClassifierSet, RankedCandidate,
};
use crate::config::{ExecutionMode, RouterConfig, RouterStrategy, Threshold};
use crate::conversation::ConversationHistory;
use crate::error::{ParleyError, Result};
use crate::providers::{ChatMessage, Provider};
use crate::sessions::{parse_agent_output, AgentSessionManager};
use crate::skills::SkillRegistry;
use crate::tools::{run_tool_loop, Tool};
use crate::util::RetryPolicy;
use std::sync::Arc;
use std::time::Duration;

/// What a resolver produced before it is turned into a [`Resolution`].
struct Hit {
    messages: Vec<String>,
    need_more_info: Option<bool>,
    label: String,
}

pub struct Router {
    config: RouterConfig,
    mode: ExecutionMode,
    classifiers: ClassifierSet,
    skills: SkillRegistry,
    generator: FreeFormGenerator,
    provider: Arc<dyn Provider>,
    tools: Vec<Arc<dyn Tool>>,
    instructions: String,
    max_tool_iterations: usize,
    sessions: Option<Arc<AgentSessionManager>>,
    retry: RetryPolicy,
}

/// Builder for [`Router`]. Only the provider is mandatory; everything else
/// defaults to empty.
pub struct RouterBuilder {
    config: RouterConfig,
    mode: ExecutionMode,
    classifiers: ClassifierSet,
    skills: SkillRegistry,
    provider: Option<Arc<dyn Provider>>,
    system_prompt: String,
    tools: Vec<Arc<dyn Tool>>,
    instructions: String,
    max_tool_iterations: usize,
    sessions: Option<Arc<AgentSessionManager>>,
}

impl RouterBuilder {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            config,
            mode: ExecutionMode::Direct,
            classifiers: ClassifierSet::default(),
            skills: SkillRegistry::new(),
            provider: None,
            system_prompt: String::new(),
            tools: Vec::new(),
            instructions: String::new(),
            max_tool_iterations: 5,
            sessions: None,
        }
    }

    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn classifiers(mut self, classifiers: ClassifierSet) -> Self {
        self.classifiers = classifiers;
        self
    }

    pub fn skills(mut self, skills: SkillRegistry) -> Self {
        self.skills = skills;
        self
    }

    pub fn provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn system_prompt(mut self, prompt: &str) -> Self {
        self.system_prompt = prompt.to_string();
        self
    }

    /// Tools and instructions for direct function calling.
    pub fn tools(mut self, tools: Vec<Arc<dyn Tool>>, instructions: &str, max_iterations: usize) -> Self {
        self.tools = tools;
        self.instructions = instructions.to_string();
        self.max_tool_iterations = max_iterations;
        self
    }

    pub fn sessions(mut self, sessions: Arc<AgentSessionManager>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn build(self) -> Result<Router> {
        let provider = self
            .provider
            .ok_or_else(|| ParleyError::Configuration("router requires a completion provider".into()))?;
        if self.mode == ExecutionMode::Agent
            && self.config.strategy == RouterStrategy::FunctionCalling
            && self.sessions.is_none()
        {
            return Err(ParleyError::Configuration(
                "agent execution mode requires a session manager".into(),
            ));
        }
        let retry = RetryPolicy::new(
            self.config.classifier_retries,
            Duration::from_millis(self.config.classifier_backoff_ms),
        );
        Ok(Router {
            generator: FreeFormGenerator::new(Arc::clone(&provider), &self.system_prompt),
            config: self.config,
            mode: self.mode,
            classifiers: self.classifiers,
            skills: self.skills,
            provider,
            tools: self.tools,
            instructions: self.instructions,
            max_tool_iterations: self.max_tool_iterations,
            sessions: self.sessions,
            retry,
        })
    }
}

impl Router {
    pub fn builder(config: RouterConfig) -> RouterBuilder {
        RouterBuilder::new(config)
    }

    pub fn strategy(&self) -> RouterStrategy {
        self.config.strategy
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn sessions(&self) -> Option<&Arc<AgentSessionManager>> {
        self.sessions.as_ref()
    }

    /// Resolve one turn with the configured strategy.
    ///
    /// Classifier misses and failures fall back to free-form generation and
    /// never fail the turn. The only error returned is `AgentInvocationFailed`:
    /// an agent-mode turn that spent its retry budget, or a function-calling
    /// sequence that failed after a tool had executed.
    pub async fn route(
        &self,
        utterance: &str,
        history: &ConversationHistory,
        conversation_id: &str,
    ) -> Result<Resolution> {
        let strategy = self.config.strategy;
        match strategy {
            RouterStrategy::Bypass => Ok(self.free_form(strategy, utterance, history, None).await),
            RouterStrategy::Clu => {
                self.route_classifier(
                    strategy,
                    self.classifiers.intent.as_ref(),
                    self.config.clu(),
                    utterance,
                    history,
                )
                .await
            }
            RouterStrategy::Cqa => {
                self.route_classifier(
                    strategy,
                    self.classifiers.knowledge_base.as_ref(),
                    self.config.cqa(),
                    utterance,
                    history,
                )
                .await
            }
            RouterStrategy::Orchestration => {
                self.route_classifier(
                    strategy,
                    self.classifiers.orchestration.as_ref(),
                    self.config.orchestration(),
                    utterance,
                    history,
                )
                .await
            }
            RouterStrategy::FunctionCalling => {
                self.route_function_calling(utterance, history, conversation_id).await
            }
        }
    }

    async fn route_classifier(
        &self,
        strategy: RouterStrategy,
        classifier: Option<&Arc<dyn Classifier>>,
        threshold: Threshold,
        utterance: &str,
        history: &ConversationHistory,
    ) -> Result<Resolution> {
        let Some(candidates) = self.classify(classifier, utterance, history).await else {
            return Ok(self.free_form(strategy, utterance, history, None).await);
        };
        let Some(best) = select_best(&candidates) else {
            tracing::info!(%strategy, "classifier returned no candidates");
            return Ok(self.free_form(strategy, utterance, history, None).await);
        };
        let confidence = Some(best.confidence);

        if !threshold.accepts(best.confidence) {
            tracing::info!(
                %strategy,
                label = %best.label,
                confidence = best.confidence,
                "top candidate below threshold"
            );
            return Ok(self.free_form(strategy, utterance, history, confidence).await);
        }

        match self.dispatch(best, utterance, history).await {
            Some(hit) => {
                tracing::info!(%strategy, target = %hit.label, confidence = best.confidence, "routed");
                Ok(Resolution {
                    messages: hit.messages,
                    need_more_info: hit.need_more_info,
                    decision: RouteDecision {
                        strategy,
                        confidence,
                        target_skill: Some(hit.label),
                        fell_back: false,
                    },
                })
            }
            None => Ok(self.free_form(strategy, utterance, history, confidence).await),
        }
    }

    /// Call a classifier with retries. `None` on a missing adapter or failure.
    async fn classify(
        &self,
        classifier: Option<&Arc<dyn Classifier>>,
        utterance: &str,
        history: &ConversationHistory,
    ) -> Option<Vec<RankedCandidate>> {
        let Some(classifier) = classifier else {
            tracing::warn!("no classifier configured for this route");
            return None;
        };
        match self
            .retry
            .run(classifier.name(), || classifier.resolve(utterance, history))
            .await
        {
            Ok(candidates) => Some(candidates),
            Err(e) => {
                tracing::warn!(classifier = classifier.name(), "classification failed: {e}");
                None
            }
        }
    }

    /// Act on an accepted candidate. Delegation is followed for one extra
    /// hop only; a child that delegates again is a miss.
    async fn dispatch(
        &self,
        candidate: &RankedCandidate,
        utterance: &str,
        history: &ConversationHistory,
    ) -> Option<Hit> {
        let CandidatePayload::Delegate { target, resolved } = &candidate.payload else {
            return self.dispatch_leaf(candidate).await;
        };
        let children = match resolved {
            Some(children) => children.clone(),
            None => self.classify(self.classifiers.child(*target), utterance, history).await?,
        };
        let best = select_best(&children)?;
        let threshold = match target {
            ChildKind::Intent => self.config.clu(),
            ChildKind::KnowledgeBase => self.config.cqa(),
        };
        if !threshold.accepts(best.confidence) {
            tracing::info!(
                target = ?target,
                label = %best.label,
                confidence = best.confidence,
                "delegated candidate below threshold"
            );
            return None;
        }
        self.dispatch_leaf(best).await
    }

    async fn dispatch_leaf(&self, candidate: &RankedCandidate) -> Option<Hit> {
        match &candidate.payload {
            CandidatePayload::Answer { text } => Some(Hit {
                messages: vec![text.clone()],
                need_more_info: Some(false),
                label: candidate.label.clone(),
            }),
            CandidatePayload::Skill { skill, entities } => {
                let Some(handler) = self.skills.get(skill) else {
                    tracing::warn!(skill = %skill, "no skill registered for intent");
                    return None;
                };
                match handler.invoke(entities).await {
                    Ok(output) => Some(Hit {
                        messages: output.messages,
                        need_more_info: Some(output.need_more_info),
                        label: skill.clone(),
                    }),
                    Err(e) => {
                        tracing::warn!(skill = %skill, "skill failed: {e}");
                        None
                    }
                }
            }
            CandidatePayload::Delegate { .. } => {
                tracing::warn!(label = %candidate.label, "nested delegation ignored");
                None
            }
        }
    }

    async fn route_function_calling(
        &self,
        utterance: &str,
        history: &ConversationHistory,
        conversation_id: &str,
    ) -> Result<Resolution> {
        let strategy = RouterStrategy::FunctionCalling;

        if self.mode == ExecutionMode::Agent {
            let sessions = self.sessions.as_ref().ok_or_else(|| {
                ParleyError::Configuration("agent execution mode requires a session manager".into())
            })?;
            let result = sessions.run_turn(conversation_id, utterance).await?;
            return Ok(Resolution {
                messages: result.messages,
                need_more_info: Some(result.need_more_info),
                decision: RouteDecision {
                    strategy,
                    confidence: None,
                    target_skill: Some(sessions.backend_name().to_string()),
                    fell_back: false,
                },
            });
        }

        let mut base = Vec::with_capacity(history.len() + 2);
        base.push(ChatMessage::system(self.instructions.clone()));
        base.extend(history_messages(history));
        base.push(ChatMessage::user(utterance));

        let outcome = self
            .retry
            .run(self.provider.name(), || {
                let mut messages = base.clone();
                async move {
                    run_tool_loop(
                        self.provider.as_ref(),
                        &self.tools,
                        &mut messages,
                        self.max_tool_iterations,
                    )
                    .await
                }
            })
            .await;

        match outcome {
            Ok(raw) => {
                let reply = parse_agent_output(&raw);
                Ok(Resolution {
                    messages: reply.messages,
                    need_more_info: Some(reply.need_more_info),
                    decision: RouteDecision {
                        strategy,
                        confidence: None,
                        target_skill: Some("tools".into()),
                        fell_back: false,
                    },
                })
            }
            // Tools already ran; a free-form answer would hide their effects.
            Err(e @ ParleyError::AgentInvocationFailed { .. }) => Err(e),
            Err(e) => {
                tracing::warn!("function calling failed, falling back: {e}");
                Ok(self.free_form(strategy, utterance, history, None).await)
            }
        }
    }

    async fn free_form(
        &self,
        strategy: RouterStrategy,
        utterance: &str,
        history: &ConversationHistory,
        confidence: Option<f64>,
    ) -> Resolution {
        let messages = self.generator.generate(utterance, history).await;
        Resolution {
            messages,
            need_more_info: None,
            decision: RouteDecision {
                strategy,
                confidence,
                target_skill: None,
                fell_back: strategy != RouterStrategy::Bypass,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::APOLOGY;
    use crate::classifiers::Entity;
    use crate::config::AgentConfig;
    use crate::providers::{ChatRequest, ChatResponse, ToolCall};
    use crate::sessions::AgentBackend;
    use crate::skills::default_skills;
    use crate::tools::default_tools;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};

    const FREE_FORM: &str = "free-form answer";

    struct FixedClassifier {
        name: &'static str,
        candidates: Vec<RankedCandidate>,
        calls: AtomicU32,
    }

    impl FixedClassifier {
        fn new(name: &'static str, candidates: Vec<RankedCandidate>) -> Arc<Self> {
            Arc::new(Self {
                name,
                candidates,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl Classifier for FixedClassifier {
        async fn resolve(&self, _: &str, _: &ConversationHistory) -> Result<Vec<RankedCandidate>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.candidates.clone())
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    struct DownClassifier {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Classifier for DownClassifier {
        async fn resolve(&self, _: &str, _: &ConversationHistory) -> Result<Vec<RankedCandidate>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ParleyError::upstream("down", "503"))
        }

        fn name(&self) -> &str {
            "down"
        }
    }

    /// Replays scripted responses, then answers with a constant text.
    struct ScriptedProvider {
        script: Mutex<VecDeque<Result<ChatResponse>>>,
    }

    impl ScriptedProvider {
        fn plain() -> Arc<Self> {
            Self::with(vec![])
        }

        fn with(script: Vec<Result<ChatResponse>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
            })
        }
    }

    fn text(content: &str) -> Result<ChatResponse> {
        Ok(ChatResponse {
            text: Some(content.into()),
            tool_calls: vec![],
        })
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        async fn chat(&self, _: ChatRequest<'_>) -> Result<ChatResponse> {
            self.script.lock().pop_front().unwrap_or_else(|| text(FREE_FORM))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn router_config(strategy: RouterStrategy) -> RouterConfig {
        RouterConfig {
            strategy,
            classifier_retries: 2,
            classifier_backoff_ms: 0,
            ..RouterConfig::default()
        }
    }

    fn router(config: RouterConfig, classifiers: ClassifierSet) -> Router {
        Router::builder(config)
            .classifiers(classifiers)
            .skills(default_skills())
            .provider(ScriptedProvider::plain())
            .system_prompt("be helpful")
            .build()
            .unwrap()
    }

    fn order_id(id: &str) -> Vec<Entity> {
        vec![Entity {
            category: "OrderId".into(),
            text: id.into(),
            confidence: 1.0,
        }]
    }

    #[tokio::test]
    async fn bypass_always_generates() {
        let r = router(router_config(RouterStrategy::Bypass), ClassifierSet::default());
        let res = r.route("hello", &ConversationHistory::new(), "c").await.unwrap();
        assert_eq!(res.messages, vec![FREE_FORM]);
        assert_eq!(res.need_more_info, None);
        assert!(!res.decision.fell_back);
    }

    #[tokio::test]
    async fn cqa_answer_above_threshold_is_returned_verbatim() {
        let mut config = router_config(RouterStrategy::Cqa);
        config.cqa_threshold = Some(0.7);
        let set = ClassifierSet {
            knowledge_base: Some(FixedClassifier::new(
                "cqa",
                vec![RankedCandidate::answer("answer-7", 0.92, "Returns are accepted within 30 days.")],
            )),
            ..ClassifierSet::default()
        };
        let res = router(config, set)
            .route("what is the return policy?", &ConversationHistory::new(), "c")
            .await
            .unwrap();
        assert_eq!(res.messages, vec!["Returns are accepted within 30 days."]);
        assert_eq!(res.need_more_info, Some(false));
        assert_eq!(res.decision.confidence, Some(0.92));
        assert_eq!(res.decision.target_skill.as_deref(), Some("answer-7"));
    }

    #[tokio::test]
    async fn clu_below_threshold_falls_back() {
        let mut config = router_config(RouterStrategy::Clu);
        config.clu_threshold = Some(0.6);
        let set = ClassifierSet {
            intent: Some(FixedClassifier::new(
                "clu",
                vec![RankedCandidate::skill("OrderStatus", 0.4, order_id("12345"))],
            )),
            ..ClassifierSet::default()
        };
        let res = router(config, set)
            .route("where is my stuff", &ConversationHistory::new(), "c")
            .await
            .unwrap();
        assert_eq!(res.messages, vec![FREE_FORM]);
        assert!(res.decision.fell_back);
        assert_eq!(res.decision.confidence, Some(0.4));
        assert_eq!(res.decision.target_skill, None);
    }

    #[tokio::test]
    async fn threshold_boundary_is_inclusive() {
        let mut config = router_config(RouterStrategy::Clu);
        config.clu_threshold = Some(0.6);
        let set = ClassifierSet {
            intent: Some(FixedClassifier::new(
                "clu",
                vec![RankedCandidate::skill("CancelOrder", 0.6, order_id("12345"))],
            )),
            ..ClassifierSet::default()
        };
        let res = router(config, set)
            .route("cancel 12345", &ConversationHistory::new(), "c")
            .await
            .unwrap();
        assert_eq!(res.messages, vec!["Order 12345 has successfully been cancelled."]);
        assert_eq!(res.need_more_info, Some(false));
    }

    #[tokio::test]
    async fn none_top_intent_is_never_dispatched() {
        let mut config = router_config(RouterStrategy::Clu);
        config.clu_threshold = Some(0.6);
        let candidates = crate::classifiers::clu::parse_conversation_prediction(
            "clu",
            serde_json::json!({
                "topIntent": "None",
                "intents": [
                    {"category": "None", "confidenceScore": 0.9},
                    {"category": "CancelOrder", "confidenceScore": 0.65}
                ],
                "entities": [{"category": "OrderId", "text": "12345", "confidenceScore": 1.0}]
            }),
        )
        .unwrap();
        let set = ClassifierSet {
            intent: Some(FixedClassifier::new("clu", candidates)),
            ..ClassifierSet::default()
        };
        let res = router(config, set)
            .route("tell me a joke about 12345", &ConversationHistory::new(), "c")
            .await
            .unwrap();
        assert_eq!(res.messages, vec![FREE_FORM]);
        assert!(res.decision.fell_back);
        assert_eq!(res.decision.target_skill, None);
    }

    #[tokio::test]
    async fn missing_threshold_rejects_every_candidate() {
        let config = router_config(RouterStrategy::Clu);
        let set = ClassifierSet {
            intent: Some(FixedClassifier::new(
                "clu",
                vec![RankedCandidate::skill("CancelOrder", 1.0, order_id("1"))],
            )),
            ..ClassifierSet::default()
        };
        let res = router(config, set)
            .route("cancel 1", &ConversationHistory::new(), "c")
            .await
            .unwrap();
        assert!(res.decision.fell_back);
    }

    #[tokio::test]
    async fn skill_without_entity_asks_for_more_info() {
        let mut config = router_config(RouterStrategy::Clu);
        config.clu_threshold = Some(0.5);
        let set = ClassifierSet {
            intent: Some(FixedClassifier::new(
                "clu",
                vec![RankedCandidate::skill("CancelOrder", 0.9, vec![])],
            )),
            ..ClassifierSet::default()
        };
        let res = router(config, set)
            .route("cancel my order", &ConversationHistory::new(), "c")
            .await
            .unwrap();
        assert_eq!(res.need_more_info, Some(true));
        assert_eq!(res.decision.target_skill.as_deref(), Some("CancelOrder"));
    }

    #[tokio::test]
    async fn unregistered_skill_is_a_miss() {
        let mut config = router_config(RouterStrategy::Clu);
        config.clu_threshold = Some(0.5);
        let set = ClassifierSet {
            intent: Some(FixedClassifier::new(
                "clu",
                vec![RankedCandidate::skill("TrackParcel", 0.95, vec![])],
            )),
            ..ClassifierSet::default()
        };
        let res = router(config, set)
            .route("track", &ConversationHistory::new(), "c")
            .await
            .unwrap();
        assert!(res.decision.fell_back);
        assert_eq!(res.messages, vec![FREE_FORM]);
    }

    #[tokio::test]
    async fn classifier_failure_is_retried_then_falls_back() {
        let mut config = router_config(RouterStrategy::Cqa);
        config.cqa_threshold = Some(0.5);
        let down = Arc::new(DownClassifier {
            calls: AtomicU32::new(0),
        });
        let set = ClassifierSet {
            knowledge_base: Some(down.clone()),
            ..ClassifierSet::default()
        };
        let res = router(config, set)
            .route("hours?", &ConversationHistory::new(), "c")
            .await
            .unwrap();
        assert_eq!(down.calls.load(Ordering::SeqCst), 3);
        assert!(res.decision.fell_back);
        assert_eq!(res.messages, vec![FREE_FORM]);
    }

    #[tokio::test]
    async fn orchestration_child_below_threshold_falls_back() {
        let mut config = router_config(RouterStrategy::Orchestration);
        config.orchestration_threshold = Some(0.8);
        config.cqa_threshold = Some(0.5);
        let delegate = RankedCandidate {
            label: "faq".into(),
            confidence: 0.9,
            payload: CandidatePayload::Delegate {
                target: ChildKind::KnowledgeBase,
                resolved: Some(vec![RankedCandidate::answer("answer-3", 0.3, "We open at 9.")]),
            },
        };
        let set = ClassifierSet {
            orchestration: Some(FixedClassifier::new("orchestration", vec![delegate])),
            ..ClassifierSet::default()
        };
        let res = router(config, set)
            .route("when do you open", &ConversationHistory::new(), "c")
            .await
            .unwrap();
        assert_eq!(res.messages, vec![FREE_FORM]);
        assert!(res.decision.fell_back);
        assert_eq!(res.decision.confidence, Some(0.9));
    }

    #[tokio::test]
    async fn orchestration_calls_child_when_unresolved() {
        let mut config = router_config(RouterStrategy::Orchestration);
        config.orchestration_threshold = Some(0.8);
        config.clu_threshold = Some(0.6);
        let delegate = RankedCandidate {
            label: "orders".into(),
            confidence: 0.85,
            payload: CandidatePayload::Delegate {
                target: ChildKind::Intent,
                resolved: None,
            },
        };
        let child = FixedClassifier::new(
            "clu",
            vec![RankedCandidate::skill("RefundStatus", 0.7, order_id("777"))],
        );
        let set = ClassifierSet {
            intent: Some(child.clone()),
            orchestration: Some(FixedClassifier::new("orchestration", vec![delegate])),
            ..ClassifierSet::default()
        };
        let res = router(config, set)
            .route("refund for 777?", &ConversationHistory::new(), "c")
            .await
            .unwrap();
        assert_eq!(child.calls.load(Ordering::SeqCst), 1);
        assert_eq!(res.messages, vec!["Refund is still processing for order 777."]);
        assert_eq!(res.decision.target_skill.as_deref(), Some("RefundStatus"));
    }

    #[tokio::test]
    async fn delegation_is_capped_at_one_hop() {
        let mut config = router_config(RouterStrategy::Orchestration);
        config.orchestration_threshold = Some(0.5);
        config.clu_threshold = Some(0.5);
        let nested = RankedCandidate {
            label: "inner".into(),
            confidence: 0.9,
            payload: CandidatePayload::Delegate {
                target: ChildKind::Intent,
                resolved: None,
            },
        };
        let outer = RankedCandidate {
            label: "outer".into(),
            confidence: 0.9,
            payload: CandidatePayload::Delegate {
                target: ChildKind::Intent,
                resolved: Some(vec![nested]),
            },
        };
        let set = ClassifierSet {
            orchestration: Some(FixedClassifier::new("orchestration", vec![outer])),
            ..ClassifierSet::default()
        };
        let res = router(config, set)
            .route("loop", &ConversationHistory::new(), "c")
            .await
            .unwrap();
        assert!(res.decision.fell_back);
    }

    #[tokio::test]
    async fn direct_function_calling_runs_tools_and_decodes_envelope() {
        let provider = ScriptedProvider::with(vec![
            Ok(ChatResponse {
                text: None,
                tool_calls: vec![ToolCall {
                    id: "call_1".into(),
                    name: "check_order_status".into(),
                    arguments: r#"{"order_id":"12345"}"#.into(),
                }],
            }),
            text(r#"{"response": "Order 12345 arrives soon.", "need_more_info": false}"#),
        ]);
        let r = Router::builder(router_config(RouterStrategy::FunctionCalling))
            .provider(provider)
            .tools(default_tools(), "use tools", 3)
            .build()
            .unwrap();
        let res = r
            .route("status of 12345", &ConversationHistory::new(), "c")
            .await
            .unwrap();
        assert_eq!(res.messages, vec!["Order 12345 arrives soon."]);
        assert_eq!(res.need_more_info, Some(false));
        assert_eq!(res.decision.target_skill.as_deref(), Some("tools"));
    }

    #[tokio::test]
    async fn direct_function_calling_failure_falls_back() {
        let provider = ScriptedProvider::with(vec![Err(ParleyError::malformed("scripted", "bad"))]);
        let r = Router::builder(router_config(RouterStrategy::FunctionCalling))
            .provider(provider)
            .tools(default_tools(), "use tools", 3)
            .build()
            .unwrap();
        let res = r.route("hi", &ConversationHistory::new(), "c").await.unwrap();
        assert!(res.decision.fell_back);
        assert_eq!(res.messages, vec![FREE_FORM]);
    }

    /// Counts executions of a side-effecting tool.
    struct CountingTool {
        runs: AtomicU32,
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &str {
            "process_cancellation"
        }

        fn description(&self) -> &str {
            "Cancel an order."
        }

        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }

        async fn execute(&self, _: serde_json::Value) -> crate::tools::ToolResult {
            self.runs.fetch_add(1, Ordering::SeqCst);
            crate::tools::ToolResult::ok("cancelled")
        }
    }

    #[tokio::test]
    async fn transient_failure_after_a_tool_ran_is_not_retried() {
        let provider = ScriptedProvider::with(vec![
            Ok(ChatResponse {
                text: None,
                tool_calls: vec![ToolCall {
                    id: "call_1".into(),
                    name: "process_cancellation".into(),
                    arguments: r#"{"order_id":"12345"}"#.into(),
                }],
            }),
            Err(ParleyError::upstream("scripted", "429")),
        ]);
        let tool = Arc::new(CountingTool {
            runs: AtomicU32::new(0),
        });
        let tools: Vec<Arc<dyn Tool>> = vec![tool.clone()];
        let r = Router::builder(router_config(RouterStrategy::FunctionCalling))
            .provider(provider)
            .tools(tools, "use tools", 3)
            .build()
            .unwrap();
        let err = r.route("cancel 12345", &ConversationHistory::new(), "c").await.unwrap_err();
        assert!(matches!(err, ParleyError::AgentInvocationFailed { .. }));
        assert_eq!(tool.runs.load(Ordering::SeqCst), 1);
    }

    struct BrokenBackend;

    #[async_trait]
    impl AgentBackend for BrokenBackend {
        async fn create_session(&self, _: &str) -> Result<String> {
            Ok("s-1".into())
        }

        async fn run(&self, _: &str, _: &str) -> Result<String> {
            Err(ParleyError::upstream("agent", "503"))
        }

        async fn delete_session(&self, _: &str) -> Result<()> {
            Ok(())
        }

        async fn list_sessions(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    #[tokio::test]
    async fn agent_mode_failure_surfaces_to_caller() {
        let agent = AgentConfig {
            max_retry: 1,
            retry_backoff_ms: 0,
            ..AgentConfig::default()
        };
        let sessions = Arc::new(AgentSessionManager::new(Arc::new(BrokenBackend), &agent));
        let r = Router::builder(router_config(RouterStrategy::FunctionCalling))
            .mode(ExecutionMode::Agent)
            .provider(ScriptedProvider::plain())
            .sessions(sessions)
            .build()
            .unwrap();
        let err = r.route("hi", &ConversationHistory::new(), "c").await.unwrap_err();
        assert!(matches!(err, ParleyError::AgentInvocationFailed { attempts: 2, .. }));
    }

    #[test]
    fn agent_mode_without_sessions_is_rejected() {
        let built = Router::builder(router_config(RouterStrategy::FunctionCalling))
            .mode(ExecutionMode::Agent)
            .provider(ScriptedProvider::plain())
            .build();
        assert!(built.is_err());
    }

    #[tokio::test]
    async fn provider_failure_in_fallback_becomes_apology() {
        let provider = ScriptedProvider::with(vec![Err(ParleyError::upstream("scripted", "down"))]);
        let r = Router::builder(router_config(RouterStrategy::Bypass))
            .provider(provider)
            .build()
            .unwrap();
        let res = r.route("hi", &ConversationHistory::new(), "c").await.unwrap();
        assert_eq!(res.messages, vec![APOLOGY]);
    }
}
