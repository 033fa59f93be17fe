//! Order-support functions exposed to the model.

use super::traits::{Tool, ToolResult};
use async_trait::async_trait;
use serde_json::json;

fn order_id_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "order_id": {"type": "string", "description": "The customer's order id"}
        },
        "required": ["order_id"]
    })
}

fn order_id_arg(args: &serde_json::Value) -> Option<String> {
    match args.get("order_id")? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Tool that takes an `order_id` and returns a templated confirmation.
pub struct OrderTool {
    name: &'static str,
    description: &'static str,
    render: fn(&str) -> String,
}

impl OrderTool {
    pub fn check_order_status() -> Self {
        Self {
            name: "check_order_status",
            description: "Check the status of an order.",
            render: |id| format!("Order {id} is shipped and will arrive in 2-3 days."),
        }
    }

    pub fn process_cancellation() -> Self {
        Self {
            name: "process_cancellation",
            description: "Process the cancellation of an order.",
            render: |id| format!("Cancellation for order {id} has been processed successfully."),
        }
    }

    pub fn process_refund() -> Self {
        Self {
            name: "process_refund",
            description: "Process a refund for an order.",
            render: |id| format!("Refund for order {id} has been processed successfully."),
        }
    }
}

#[async_trait]
impl Tool for OrderTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        order_id_schema()
    }

    async fn execute(&self, args: serde_json::Value) -> ToolResult {
        match order_id_arg(&args) {
            Some(order_id) => {
                tracing::info!(tool = self.name, "order tool executed");
                ToolResult::ok((self.render)(&order_id))
            }
            None => ToolResult::failed("missing required argument: order_id"),
        }
    }
}
