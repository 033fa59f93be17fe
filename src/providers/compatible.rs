//! Generic OpenAI-compatible provider.
//! Most completion APIs follow the same `/chat/completions` format, including
//! Azure OpenAI deployments, so one implementation covers them.

use crate::error::{ParleyError, Result};
use crate::providers::traits::{
    ChatMessage, ChatRequest as ProviderChatRequest, ChatResponse as ProviderChatResponse,
    Provider, ToolCall as ProviderToolCall, ToolSpec,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A provider that speaks the OpenAI-compatible chat completions API.
pub struct OpenAiCompatibleProvider {
    pub(crate) name: String,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    pub(crate) auth_header: AuthStyle,
    model: String,
    temperature: f64,
    client: Client,
}

/// How the provider expects the API key to be sent.
#[derive(Debug, Clone)]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// Custom header name (Azure OpenAI uses `api-key`)
    Custom(String),
}

impl AuthStyle {
    /// Azure OpenAI resources expect `api-key`; everything else uses bearer auth.
    pub fn for_url(base_url: &str) -> Self {
        let is_azure = reqwest::Url::parse(base_url)
            .ok()
            .and_then(|url| url.host_str().map(|h| h.ends_with(".openai.azure.com")))
            .unwrap_or(false);
        if is_azure {
            Self::Custom("api-key".into())
        } else {
            Self::Bearer
        }
    }
}

impl OpenAiCompatibleProvider {
    pub fn new(
        name: &str,
        base_url: &str,
        api_key: Option<&str>,
        model: &str,
        temperature: f64,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(ToString::to_string),
            auth_header: AuthStyle::for_url(base_url),
            model: model.to_string(),
            temperature,
            client: Client::builder()
                .timeout(timeout)
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Build the full URL for chat completions, detecting if base_url already includes the path.
    fn chat_completions_url(&self) -> String {
        let has_full_endpoint = reqwest::Url::parse(&self.base_url)
            .map(|url| {
                url.path()
                    .trim_end_matches('/')
                    .ends_with("/chat/completions")
            })
            .unwrap_or_else(|_| {
                self.base_url
                    .trim_end_matches('/')
                    .ends_with("/chat/completions")
            });

        if has_full_endpoint {
            self.base_url.clone()
        } else {
            format!("{}/chat/completions", self.base_url)
        }
    }

    fn apply_auth_header(
        &self,
        req: reqwest::RequestBuilder,
        api_key: &str,
    ) -> reqwest::RequestBuilder {
        match &self.auth_header {
            AuthStyle::Bearer => req.header("Authorization", format!("Bearer {api_key}")),
            AuthStyle::Custom(header) => req.header(header, api_key),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    // Several compatible servers reject `null` content on tool-call turns.
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Serialize)]
struct ToolDefinition {
    #[serde(rename = "type")]
    kind: &'static str,
    function: FunctionDefinition,
}

#[derive(Debug, Serialize)]
struct FunctionDefinition {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize, Serialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize, Serialize)]
struct ToolCall {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    function: Option<Function>,
}

#[derive(Debug, Deserialize, Serialize)]
struct Function {
    name: Option<String>,
    arguments: Option<String>,
}

fn to_wire_message(message: &ChatMessage) -> Message {
    let tool_calls = (!message.tool_calls.is_empty()).then(|| {
        message
            .tool_calls
            .iter()
            .map(|call| ToolCall {
                id: Some(call.id.clone()),
                kind: Some("function".into()),
                function: Some(Function {
                    name: Some(call.name.clone()),
                    arguments: Some(call.arguments.clone()),
                }),
            })
            .collect()
    });
    Message {
        role: message.role.clone(),
        content: message.content.clone().unwrap_or_default(),
        tool_call_id: message.tool_call_id.clone(),
        tool_calls,
    }
}

fn to_tool_definitions(tools: &[ToolSpec]) -> Vec<ToolDefinition> {
    tools
        .iter()
        .map(|tool| ToolDefinition {
            kind: "function",
            function: FunctionDefinition {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.parameters.clone(),
            },
        })
        .collect()
}

fn from_response_message(message: ResponseMessage) -> ProviderChatResponse {
    let tool_calls = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .filter_map(|tc| {
            let function = tc.function?;
            let name = function.name?;
            let arguments = function.arguments.unwrap_or_else(|| "{}".to_string());
            Some(ProviderToolCall {
                id: tc.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                name,
                arguments,
            })
        })
        .collect();

    ProviderChatResponse {
        text: message.content,
        tool_calls,
    }
}

#[async_trait]
impl Provider for OpenAiCompatibleProvider {
    async fn chat(&self, request: ProviderChatRequest<'_>) -> Result<ProviderChatResponse> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            ParleyError::Configuration(format!(
                "{} API key not set. Set generation.api_key or GENERATION_API_KEY.",
                self.name
            ))
        })?;

        let tools = request
            .tools
            .filter(|tools| !tools.is_empty())
            .map(to_tool_definitions);
        let body = ChatRequest {
            model: self.model.clone(),
            messages: request.messages.iter().map(to_wire_message).collect(),
            temperature: self.temperature,
            tool_choice: tools.as_ref().map(|_| "auto".to_string()),
            tools,
        };

        let response = self
            .apply_auth_header(self.client.post(self.chat_completions_url()).json(&body), api_key)
            .send()
            .await
            .map_err(|e| ParleyError::upstream(&self.name, e))?;

        let status = response.status();
        if !status.is_success() {
            let error = response.text().await.unwrap_or_default();
            return Err(ParleyError::from_status(&self.name, status, &error));
        }

        let text = response
            .text()
            .await
            .map_err(|e| ParleyError::upstream(&self.name, e))?;
        let chat_response: ApiChatResponse =
            serde_json::from_str(&text).map_err(|e| ParleyError::malformed(&self.name, e))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| from_response_message(c.message))
            .ok_or_else(|| ParleyError::malformed(&self.name, "no choices in response"))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
