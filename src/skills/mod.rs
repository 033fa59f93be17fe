//! Skills dispatched by intent label.
//!
//! The router looks up the accepted intent in a [`SkillRegistry`]. An intent
//! with no registered skill is treated as a miss.

pub mod orders;
pub mod traits;

pub use orders::OrderSkill;
pub use traits::{find_entity, Skill, SkillOutput};

use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct SkillRegistry {
    skills: HashMap<String, Arc<dyn Skill>>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a skill under its own name, replacing any previous one.
    pub fn register(&mut self, skill: Arc<dyn Skill>) {
        self.skills.insert(skill.name().to_string(), skill);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Skill>> {
        self.skills.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.skills.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Create the bundled order-support skills.
pub fn default_skills() -> SkillRegistry {
    let mut registry = SkillRegistry::new();
    registry.register(Arc::new(OrderSkill::order_status()));
    registry.register(Arc::new(OrderSkill::cancel_order()));
    registry.register(Arc::new(OrderSkill::refund_status()));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_skills_cover_order_intents() {
        let registry = default_skills();
        assert_eq!(
            registry.names(),
            vec!["CancelOrder", "OrderStatus", "RefundStatus"]
        );
        assert!(registry.get("None").is_none());
    }
}
