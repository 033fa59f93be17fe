use crate::classifiers::Entity;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What a skill produced for one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillOutput {
    pub messages: Vec<String>,
    /// The skill asked the user for something it needs (e.g. an order id).
    pub need_more_info: bool,
}

impl SkillOutput {
    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            messages: vec![text.into()],
            need_more_info: false,
        }
    }

    pub fn clarify(text: impl Into<String>) -> Self {
        Self {
            messages: vec![text.into()],
            need_more_info: true,
        }
    }
}

/// Handler for one intent label.
#[async_trait]
pub trait Skill: Send + Sync {
    /// Intent label this skill answers, exactly as the classifier reports it.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    async fn invoke(&self, entities: &[Entity]) -> Result<SkillOutput>;
}

/// First entity of `category`, case-insensitively, with non-blank text.
pub fn find_entity<'a>(entities: &'a [Entity], category: &str) -> Option<&'a str> {
    entities
        .iter()
        .find(|e| e.category.eq_ignore_ascii_case(category) && !e.text.trim().is_empty())
        .map(|e| e.text.trim())
}
