//! Order-support skills: status, cancellation and refund status.

use super::traits::{find_entity, Skill, SkillOutput};
use crate::classifiers::Entity;
use crate::error::Result;
use async_trait::async_trait;

pub const ORDER_ID_ENTITY: &str = "OrderId";

/// A skill that needs an order id and answers with a fixed template.
pub struct OrderSkill {
    name: &'static str,
    description: &'static str,
    missing_id: &'static str,
    render: fn(&str) -> String,
}

impl OrderSkill {
    pub fn order_status() -> Self {
        Self {
            name: "OrderStatus",
            description: "Report the shipping status of an order",
            missing_id: "Please specify order ID in order to check order status.",
            render: |id| format!("Order {id} has shipped."),
        }
    }

    pub fn cancel_order() -> Self {
        Self {
            name: "CancelOrder",
            description: "Cancel an order",
            missing_id: "Please specify order ID in order to cancel order.",
            render: |id| format!("Order {id} has successfully been cancelled."),
        }
    }

    pub fn refund_status() -> Self {
        Self {
            name: "RefundStatus",
            description: "Report the refund status of an order",
            missing_id: "Please specify order ID in order to check refund status.",
            render: |id| format!("Refund is still processing for order {id}."),
        }
    }
}

#[async_trait]
impl Skill for OrderSkill {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    async fn invoke(&self, entities: &[Entity]) -> Result<SkillOutput> {
        Ok(match find_entity(entities, ORDER_ID_ENTITY) {
            Some(order_id) => SkillOutput::answer((self.render)(order_id)),
            None => SkillOutput::clarify(self.missing_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_id(id: &str) -> Vec<Entity> {
        vec![Entity {
            category: ORDER_ID_ENTITY.into(),
            text: id.into(),
            confidence: 1.0,
        }]
    }

    #[tokio::test]
    async fn answers_with_order_id() {
        let out = OrderSkill::cancel_order().invoke(&order_id("12345")).await.unwrap();
        assert_eq!(out.messages, vec!["Order 12345 has successfully been cancelled."]);
        assert!(!out.need_more_info);

        let out = OrderSkill::refund_status().invoke(&order_id("9")).await.unwrap();
        assert_eq!(out.messages, vec!["Refund is still processing for order 9."]);
    }

    #[tokio::test]
    async fn asks_for_missing_order_id() {
        let out = OrderSkill::order_status().invoke(&[]).await.unwrap();
        assert_eq!(
            out.messages,
            vec!["Please specify order ID in order to check order status."]
        );
        assert!(out.need_more_info);
    }
}
