use crate::providers::ToolSpec;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of one tool execution, fed back to the model as the tool message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
        }
    }

    /// Text returned to the model.
    pub fn to_model_text(&self) -> String {
        match &self.error {
            Some(error) => format!("Error: {error}"),
            None => self.output.clone(),
        }
    }
}

/// A function the model may call in function-calling mode.
///
/// Bad arguments are reported through [`ToolResult::failed`] so the model can
/// correct itself; they are not errors of the turn.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments object.
    fn parameters_schema(&self) -> serde_json::Value;

    async fn execute(&self, args: serde_json::Value) -> ToolResult;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_result_renders_error() {
        assert_eq!(ToolResult::failed("bad id").to_model_text(), "Error: bad id");
        assert_eq!(ToolResult::ok("done").to_model_text(), "done");
    }
}
