//! Skill value type shared by user profiles and swap requests
use crate::error::SwapError;

/// Longest permitted skill description.
pub const MAX_SKILL_DESCRIPTION: usize = 200;

#[derive(
    minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord,
)]
pub enum SkillLevel {
    #[n(0)]
    Beginner,
    #[n(1)]
    Intermediate,
    #[n(2)]
    Advanced,
    #[n(3)]
    Expert,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Skill {
    #[n(0)]
    pub name: String,
    #[n(1)]
    pub level: SkillLevel,
    #[n(2)]
    pub description: Option<String>,
}

impl Skill {
    pub fn new(name: impl Into<String>, level: SkillLevel) -> Self {
        Self {
            name: name.into(),
            level,
            description: None,
        }
    }
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
    /// Field-shape checks: a non-empty trimmed name and a bounded description.
    pub fn validate(&self) -> Result<(), SwapError> {
        if self.name.trim().is_empty() {
            return Err(SwapError::Validation("skill name is required".into()));
        }
        if let Some(description) = &self.description {
            if description.chars().count() > MAX_SKILL_DESCRIPTION {
                return Err(SwapError::Validation(format!(
                    "skill description cannot exceed {MAX_SKILL_DESCRIPTION} characters"
                )));
            }
        }
        Ok(())
    }
}
