use crate::error::ParleyError;
use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::fs;

// ── Top-level config ──────────────────────────────────────────────

/// Top-level Parley configuration, loaded from `config.toml`.
///
/// Resolution order: `PARLEY_CONFIG` env → `$CONFIG_DIR/config.toml` → `~/.parley/config.toml`.
/// The resolved value is immutable for the lifetime of the process and is
/// handed to each component at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to config.toml - computed at load time, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Environment overrides that could not be parsed; `validate` rejects them.
    #[serde(skip)]
    pub rejected_overrides: Vec<String>,

    /// Routing strategy and confidence thresholds (`[router]`).
    #[serde(default)]
    pub router: RouterConfig,

    /// Agent execution mode and session lifecycle (`[agent]`).
    #[serde(default)]
    pub agent: AgentConfig,

    /// PII redaction (`[pii]`).
    #[serde(default)]
    pub pii: PiiConfig,

    /// Gateway server configuration: host, port, limits (`[gateway]`).
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Language service endpoints for CLU, CQA, orchestration and PII (`[language]`).
    #[serde(default)]
    pub language: LanguageServiceConfig,

    /// Free-form and tool-calling completion backend (`[generation]`).
    #[serde(default)]
    pub generation: GenerationConfig,
}

// ── Router ───────────────────────────────────────────────────────

/// Resolution strategy selected once per process.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouterStrategy {
    Bypass,
    Clu,
    Cqa,
    Orchestration,
    FunctionCalling,
}

impl RouterStrategy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bypass => "BYPASS",
            Self::Clu => "CLU",
            Self::Cqa => "CQA",
            Self::Orchestration => "ORCHESTRATION",
            Self::FunctionCalling => "FUNCTION_CALLING",
        }
    }
}

impl fmt::Display for RouterStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RouterStrategy {
    type Err = ParleyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BYPASS" => Ok(Self::Bypass),
            "CLU" => Ok(Self::Clu),
            "CQA" => Ok(Self::Cqa),
            "ORCHESTRATION" => Ok(Self::Orchestration),
            "FUNCTION_CALLING" => Ok(Self::FunctionCalling),
            other => Err(ParleyError::Configuration(format!(
                "unknown router strategy {other:?} (valid: BYPASS|CLU|CQA|ORCHESTRATION|FUNCTION_CALLING)"
            ))),
        }
    }
}

/// Minimum confidence a candidate needs to be accepted.
///
/// A missing threshold never accepts anything.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Threshold {
    Min(f64),
    RejectAll,
}

impl Threshold {
    pub fn from_option(value: Option<f64>) -> Self {
        value.map_or(Self::RejectAll, Self::Min)
    }

    pub fn accepts(self, confidence: f64) -> bool {
        match self {
            Self::Min(min) => confidence >= min,
            Self::RejectAll => false,
        }
    }
}

/// Router configuration (`[router]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Strategy used for every turn. Overridden by `ROUTER_TYPE`. Default: `BYPASS`.
    #[serde(default = "default_router_strategy")]
    pub strategy: RouterStrategy,
    /// Minimum intent confidence. Overridden by `CLU_CONFIDENCE_THRESHOLD`.
    #[serde(default)]
    pub clu_threshold: Option<f64>,
    /// Minimum knowledge-base answer confidence. Overridden by `CQA_CONFIDENCE_THRESHOLD`.
    #[serde(default)]
    pub cqa_threshold: Option<f64>,
    /// Minimum top-level orchestration confidence. Overridden by `ORCHESTRATION_CONFIDENCE_THRESHOLD`.
    #[serde(default)]
    pub orchestration_threshold: Option<f64>,
    /// Retries after the first classifier attempt on transient failure. Default: `2`.
    #[serde(default = "default_classifier_retries")]
    pub classifier_retries: u32,
    /// Base delay between classifier retries, doubled per attempt. Default: `200`.
    #[serde(default = "default_classifier_backoff_ms")]
    pub classifier_backoff_ms: u64,
}

fn default_router_strategy() -> RouterStrategy {
    RouterStrategy::Bypass
}

fn default_classifier_retries() -> u32 {
    2
}

fn default_classifier_backoff_ms() -> u64 {
    200
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            strategy: default_router_strategy(),
            clu_threshold: None,
            cqa_threshold: None,
            orchestration_threshold: None,
            classifier_retries: default_classifier_retries(),
            classifier_backoff_ms: default_classifier_backoff_ms(),
        }
    }
}

impl RouterConfig {
    pub fn clu(&self) -> Threshold {
        Threshold::from_option(self.clu_threshold)
    }

    pub fn cqa(&self) -> Threshold {
        Threshold::from_option(self.cqa_threshold)
    }

    pub fn orchestration(&self) -> Threshold {
        Threshold::from_option(self.orchestration_threshold)
    }
}

// ── Agent ────────────────────────────────────────────────────────

/// Whether function calling runs statelessly or through persistent agent sessions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Direct,
    Agent,
}

impl FromStr for ExecutionMode {
    type Err = ParleyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(Self::Direct),
            "agent" => Ok(Self::Agent),
            other => Err(ParleyError::Configuration(format!(
                "unknown execution mode {other:?} (valid: direct|agent)"
            ))),
        }
    }
}

/// Agent session configuration (`[agent]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Execution mode. Overridden by `EXECUTION_MODE`. Default: `direct`.
    #[serde(default = "default_execution_mode")]
    pub mode: ExecutionMode,
    /// Retries after the first agent attempt on transient failure. Overridden by `MAX_AGENT_RETRY`. Default: `3`.
    #[serde(default = "default_max_agent_retry")]
    pub max_retry: u32,
    /// Base delay between agent retries in milliseconds. Default: `500`.
    #[serde(default = "default_agent_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Sweep stale and orphaned sessions before the gateway starts. Overridden by `DELETE_OLD_AGENTS`.
    #[serde(default)]
    pub delete_old_agents: bool,
    /// Sessions older than this are replaced on next use and removed by the sweep. Default: `3600`.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    /// How often the gateway sweeps stale sessions in the background. Default: `300`.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Maximum tool-call rounds per agent turn. Default: `5`.
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: usize,
    /// System instructions given to every agent session.
    #[serde(default = "default_agent_instructions")]
    pub instructions: String,
}

fn default_execution_mode() -> ExecutionMode {
    ExecutionMode::Direct
}

fn default_max_agent_retry() -> u32 {
    3
}

fn default_agent_backoff_ms() -> u64 {
    500
}

fn default_stale_after_secs() -> u64 {
    3600
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_max_tool_iterations() -> usize {
    5
}

fn default_agent_instructions() -> String {
    "You are a customer support agent for an outdoor retailer. Use the provided tools to \
     check order status, cancel orders and process refunds. If you need an order ID, ask \
     for it. Reply with a JSON object {\"response\": <text for the customer>, \
     \"need_more_info\": <true when you asked the customer a question, else false>}."
        .into()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            mode: default_execution_mode(),
            max_retry: default_max_agent_retry(),
            retry_backoff_ms: default_agent_backoff_ms(),
            delete_old_agents: false,
            stale_after_secs: default_stale_after_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_tool_iterations: default_max_tool_iterations(),
            instructions: default_agent_instructions(),
        }
    }
}

// ── PII ──────────────────────────────────────────────────────────

/// Which detector feeds the sanitizer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PiiDetectorKind {
    /// Local regular-expression detector.
    Pattern,
    /// Remote language-service PII recognition.
    Service,
}

/// PII redaction configuration (`[pii]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PiiConfig {
    /// Master switch. Overridden by `PII_ENABLED`. Default: `false`.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_pii_detector")]
    pub detector: PiiDetectorKind,
    /// Category allow-list. Overridden by `PII_CATEGORIES` (comma separated).
    #[serde(default = "default_pii_categories")]
    pub categories: Vec<String>,
    /// Threshold for allowed categories without an explicit entry. Overridden by `PII_CONFIDENCE_THRESHOLD`.
    #[serde(default)]
    pub default_threshold: Option<f64>,
    /// Per-category minimum confidence.
    #[serde(default)]
    pub thresholds: HashMap<String, f64>,
}

fn default_pii_detector() -> PiiDetectorKind {
    PiiDetectorKind::Pattern
}

fn default_pii_categories() -> Vec<String> {
    ["Email", "PhoneNumber", "CreditCardNumber", "USSocialSecurityNumber", "IPAddress"]
        .iter()
        .map(|c| (*c).to_string())
        .collect()
}

impl Default for PiiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            detector: default_pii_detector(),
            categories: default_pii_categories(),
            default_threshold: None,
            thresholds: HashMap::new(),
        }
    }
}

impl PiiConfig {
    /// Threshold for a category, or `RejectAll` when the category is not allowed.
    pub fn threshold_for(&self, category: &str) -> Threshold {
        if !self.categories.iter().any(|c| c == category) {
            return Threshold::RejectAll;
        }
        Threshold::from_option(self.thresholds.get(category).copied().or(self.default_threshold))
    }
}

// ── Gateway ──────────────────────────────────────────────────────

/// Gateway server configuration (`[gateway]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway port. Default: `7000`.
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// Gateway host. Default: `127.0.0.1`.
    #[serde(default = "default_gateway_host")]
    pub host: String,
    /// Per-request timeout in seconds. Default: `120`.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Maximum inbound body size in bytes. Default: `65536`.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_gateway_port() -> u16 {
    7000
}

fn default_gateway_host() -> String {
    "127.0.0.1".into()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_max_body_bytes() -> usize {
    65_536
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            host: default_gateway_host(),
            request_timeout_secs: default_request_timeout_secs(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

// ── Language service ─────────────────────────────────────────────

/// Language service configuration (`[language]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageServiceConfig {
    /// Resource endpoint. Overridden by `LANGUAGE_ENDPOINT`.
    pub endpoint: Option<String>,
    /// Subscription key. Overridden by `LANGUAGE_API_KEY`.
    pub api_key: Option<String>,
    #[serde(default = "default_language_api_version")]
    pub api_version: String,
    pub clu_project: Option<String>,
    pub clu_deployment: Option<String>,
    pub cqa_project: Option<String>,
    pub cqa_deployment: Option<String>,
    pub orchestration_project: Option<String>,
    pub orchestration_deployment: Option<String>,
    /// Language code sent with every analysis request. Default: `en`.
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_language_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_language_api_version() -> String {
    "2023-04-01".into()
}

fn default_language() -> String {
    "en".into()
}

fn default_language_timeout_secs() -> u64 {
    30
}

impl Default for LanguageServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            api_version: default_language_api_version(),
            clu_project: None,
            clu_deployment: None,
            cqa_project: None,
            cqa_deployment: None,
            orchestration_project: None,
            orchestration_deployment: None,
            language: default_language(),
            timeout_secs: default_language_timeout_secs(),
        }
    }
}

// ── Generation ───────────────────────────────────────────────────

/// Completion backend configuration (`[generation]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// OpenAI-compatible base URL. Overridden by `GENERATION_API_URL`.
    #[serde(default = "default_generation_api_url")]
    pub api_url: String,
    /// Overridden by `GENERATION_API_KEY`, falling back to `OPENAI_API_KEY`.
    pub api_key: Option<String>,
    /// Overridden by `GENERATION_MODEL`.
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_generation_temperature")]
    pub temperature: f64,
    /// System prompt for free-form (fallback) answers.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_generation_api_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_generation_model() -> String {
    "gpt-4o-mini".into()
}

fn default_generation_temperature() -> f64 {
    0.2
}

fn default_system_prompt() -> String {
    "You are a helpful assistant for an outdoor retailer. Answer concisely using only \
     information you are confident about."
        .into()
}

fn default_generation_timeout_secs() -> u64 {
    120
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_url: default_generation_api_url(),
            api_key: None,
            model: default_generation_model(),
            temperature: default_generation_temperature(),
            system_prompt: default_system_prompt(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

// ── Config impl ──────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: default_config_path().unwrap_or_else(|_| PathBuf::from("config.toml")),
            rejected_overrides: Vec::new(),
            router: RouterConfig::default(),
            agent: AgentConfig::default(),
            pii: PiiConfig::default(),
            gateway: GatewayConfig::default(),
            language: LanguageServiceConfig::default(),
            generation: GenerationConfig::default(),
        }
    }
}

fn default_config_path() -> Result<PathBuf> {
    let home = UserDirs::new()
        .map(|u| u.home_dir().to_path_buf())
        .context("Could not find home directory")?;
    Ok(home.join(".parley").join("config.toml"))
}

fn resolve_config_path(env: &dyn Fn(&str) -> Option<String>) -> Result<PathBuf> {
    if let Some(path) = env("PARLEY_CONFIG").filter(|p| !p.trim().is_empty()) {
        return Ok(PathBuf::from(path));
    }
    if let Some(dir) = env("CONFIG_DIR").filter(|d| !d.trim().is_empty()) {
        return Ok(Path::new(&dir).join("config.toml"));
    }
    default_config_path()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

impl Config {
    /// Load the config file (if present), apply environment overrides and validate.
    pub async fn load() -> Result<Self> {
        let config_path = resolve_config_path(&process_env)?;
        let mut config = Self::load_from_path(&config_path).await?;
        config.apply_env_overrides();
        config.validate()?;
        tracing::info!(
            path = %config.config_path.display(),
            strategy = %config.router.strategy,
            mode = ?config.agent.mode,
            pii_enabled = config.pii.enabled,
            "Config loaded"
        );
        Ok(config)
    }

    /// Parse a TOML file without overrides or validation. A missing file yields defaults.
    pub async fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            toml::from_str::<Config>(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        } else {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            Config::default()
        };
        config.config_path = path.to_path_buf();
        Ok(config)
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(&process_env);
    }

    /// Apply overrides from an arbitrary key lookup. Unparseable values are
    /// recorded and leave the field untouched; [`Config::validate`] rejects them.
    pub fn apply_overrides(&mut self, env: &dyn Fn(&str) -> Option<String>) {
        if let Some(raw) = env("ROUTER_TYPE") {
            match raw.parse::<RouterStrategy>() {
                Ok(strategy) => self.router.strategy = strategy,
                Err(error) => self.rejected_overrides.push(format!("ROUTER_TYPE: {error}")),
            }
        }

        if let Some(raw) = env("EXECUTION_MODE") {
            match raw.parse::<ExecutionMode>() {
                Ok(mode) => self.agent.mode = mode,
                Err(error) => self.rejected_overrides.push(format!("EXECUTION_MODE: {error}")),
            }
        }

        // Thresholds keep unparseable text as NaN so validation fails loudly.
        let threshold = |key: &str| env(key).map(|raw| raw.trim().parse::<f64>().unwrap_or(f64::NAN));
        if let Some(value) = threshold("CLU_CONFIDENCE_THRESHOLD") {
            self.router.clu_threshold = Some(value);
        }
        if let Some(value) = threshold("CQA_CONFIDENCE_THRESHOLD") {
            self.router.cqa_threshold = Some(value);
        }
        if let Some(value) = threshold("ORCHESTRATION_CONFIDENCE_THRESHOLD") {
            self.router.orchestration_threshold = Some(value);
        }
        if let Some(value) = threshold("PII_CONFIDENCE_THRESHOLD") {
            self.pii.default_threshold = Some(value);
        }

        if let Some(flag) = env("PII_ENABLED").as_deref().and_then(parse_bool) {
            self.pii.enabled = flag;
        }
        if let Some(raw) = env("PII_CATEGORIES") {
            let categories: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(ToString::to_string)
                .collect();
            if !categories.is_empty() {
                self.pii.categories = categories;
            }
        }

        if let Some(raw) = env("MAX_AGENT_RETRY") {
            match raw.trim().parse::<u32>() {
                Ok(retries) => self.agent.max_retry = retries,
                Err(_) => self.rejected_overrides.push(format!(
                    "MAX_AGENT_RETRY: expected a non-negative integer, got {raw:?}"
                )),
            }
        }
        if let Some(flag) = env("DELETE_OLD_AGENTS").as_deref().and_then(parse_bool) {
            self.agent.delete_old_agents = flag;
        }

        if let Some(port) = env("PARLEY_GATEWAY_PORT").and_then(|p| p.parse::<u16>().ok()) {
            self.gateway.port = port;
        }
        if let Some(host) = env("PARLEY_GATEWAY_HOST").filter(|h| !h.is_empty()) {
            self.gateway.host = host;
        }

        if let Some(endpoint) = env("LANGUAGE_ENDPOINT").filter(|v| !v.is_empty()) {
            self.language.endpoint = Some(endpoint);
        }
        if let Some(key) = env("LANGUAGE_API_KEY").filter(|v| !v.is_empty()) {
            self.language.api_key = Some(key);
        }
        let language_fields: [(&str, &mut Option<String>); 6] = [
            ("CLU_PROJECT_NAME", &mut self.language.clu_project),
            ("CLU_DEPLOYMENT_NAME", &mut self.language.clu_deployment),
            ("CQA_PROJECT_NAME", &mut self.language.cqa_project),
            ("CQA_DEPLOYMENT_NAME", &mut self.language.cqa_deployment),
            ("ORCHESTRATION_PROJECT_NAME", &mut self.language.orchestration_project),
            ("ORCHESTRATION_DEPLOYMENT_NAME", &mut self.language.orchestration_deployment),
        ];
        for (key, slot) in language_fields {
            if let Some(value) = env(key).filter(|v| !v.is_empty()) {
                *slot = Some(value);
            }
        }

        if let Some(url) = env("GENERATION_API_URL").filter(|v| !v.is_empty()) {
            self.generation.api_url = url;
        }
        if let Some(key) = env("GENERATION_API_KEY")
            .or_else(|| env("OPENAI_API_KEY"))
            .filter(|v| !v.trim().is_empty())
        {
            self.generation.api_key = Some(key);
        }
        if let Some(model) = env("GENERATION_MODEL").filter(|v| !v.is_empty()) {
            self.generation.model = model;
        }
    }

    /// Validate configuration values that would make routing decisions unsafe.
    ///
    /// Thresholds must lie in `[0, 1]`. The threshold of the selected strategy's
    /// first-level classifier is mandatory; every other missing threshold
    /// rejects all candidates at runtime. With PII enabled, every allowed
    /// category must resolve to a threshold.
    pub fn validate(&self) -> std::result::Result<(), ParleyError> {
        if let Some(rejected) = self.rejected_overrides.first() {
            return Err(ParleyError::Configuration(format!(
                "invalid environment override {rejected}"
            )));
        }

        let check = |name: &str, value: Option<f64>| match value {
            Some(v) if !(0.0..=1.0).contains(&v) => Err(ParleyError::Configuration(format!(
                "{name} must be within [0, 1], got {v}"
            ))),
            _ => Ok(()),
        };
        check("router.clu_threshold", self.router.clu_threshold)?;
        check("router.cqa_threshold", self.router.cqa_threshold)?;
        check("router.orchestration_threshold", self.router.orchestration_threshold)?;
        check("pii.default_threshold", self.pii.default_threshold)?;
        for (category, value) in &self.pii.thresholds {
            check(&format!("pii.thresholds.{category}"), Some(*value))?;
        }

        let required = match self.router.strategy {
            RouterStrategy::Clu => Some(("router.clu_threshold", self.router.clu_threshold)),
            RouterStrategy::Cqa => Some(("router.cqa_threshold", self.router.cqa_threshold)),
            RouterStrategy::Orchestration => Some((
                "router.orchestration_threshold",
                self.router.orchestration_threshold,
            )),
            RouterStrategy::Bypass | RouterStrategy::FunctionCalling => None,
        };
        if let Some((name, None)) = required {
            return Err(ParleyError::Configuration(format!(
                "{name} is required when router strategy is {}",
                self.router.strategy
            )));
        }

        if self.pii.enabled {
            if self.pii.categories.is_empty() {
                return Err(ParleyError::Configuration(
                    "pii.categories must not be empty when PII is enabled".into(),
                ));
            }
            for category in &self.pii.categories {
                if self.pii.threshold_for(category) == Threshold::RejectAll {
                    return Err(ParleyError::Configuration(format!(
                        "no PII confidence threshold for category {category}"
                    )));
                }
            }
        }

        if self.agent.mode == ExecutionMode::Agent
            && self.router.strategy != RouterStrategy::FunctionCalling
        {
            return Err(ParleyError::Configuration(format!(
                "agent execution mode requires router strategy FUNCTION_CALLING, got {}",
                self.router.strategy
            )));
        }

        if self.gateway.host.trim().is_empty() {
            return Err(ParleyError::Configuration("gateway.host must not be empty".into()));
        }
        if self.agent.sweep_interval_secs == 0 {
            return Err(ParleyError::Configuration(
                "agent.sweep_interval_secs must be greater than 0".into(),
            ));
        }
        if self.agent.max_tool_iterations == 0 {
            return Err(ParleyError::Configuration(
                "agent.max_tool_iterations must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Serialize for display with secrets masked.
    pub fn to_masked_toml(&self) -> Result<String> {
        let mut shown = self.clone();
        for secret in [&mut shown.language.api_key, &mut shown.generation.api_key] {
            if secret.is_some() {
                *secret = Some("***MASKED***".into());
            }
        }
        toml::to_string_pretty(&shown).context("Failed to serialize config")
    }
}
