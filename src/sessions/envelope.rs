//! Decoding of the agent's reply envelope.
//!
//! Agents are instructed to answer with
//! `{"response": "...", "need_more_info": true}`. Older prompts produce the
//! flag as the strings `"True"`/`"False"`, and models like to wrap JSON in
//! code fences. Anything that is not an envelope is taken as plain text.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentReply {
    pub messages: Vec<String>,
    pub need_more_info: bool,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    response: Value,
    #[serde(default)]
    need_more_info: Option<Value>,
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn messages(response: &Value) -> Option<Vec<String>> {
    match response {
        Value::String(s) => Some(vec![s.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(ToString::to_string))
            .collect(),
        _ => None,
    }
}

/// Decode an agent's final output.
pub fn parse_agent_output(raw: &str) -> AgentReply {
    let body = strip_code_fence(raw);
    if let Ok(envelope) = serde_json::from_str::<Envelope>(body) {
        if let Some(messages) = messages(&envelope.response) {
            return AgentReply {
                messages: messages.into_iter().filter(|m| !m.trim().is_empty()).collect(),
                need_more_info: flag(envelope.need_more_info.as_ref()),
            };
        }
    }
    AgentReply {
        messages: if raw.trim().is_empty() {
            Vec::new()
        } else {
            vec![raw.trim().to_string()]
        },
        need_more_info: false,
    }
}
