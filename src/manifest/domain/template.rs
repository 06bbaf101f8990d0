//! Prompt templates and skills.

use crate::strategy::{AgentRole, Strategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Identifier of a stored prompt template.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateId(String);

impl TemplateId {
    /// Wraps an identifier.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A system-layer prompt template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    /// Identifier.
    pub id: TemplateId,
    /// Display name.
    pub name: String,
    /// Role the template is written for.
    pub role: AgentRole,
    /// Strategy the template is written for; `None` applies to every
    /// strategy of the role.
    pub strategy: Option<Strategy>,
    /// Template source (minijinja syntax).
    pub content: String,
    /// Marks the default for its role and strategy.
    pub is_default: bool,
}

impl Template {
    /// Returns `true` when the template can serve `role` and `strategy`.
    #[must_use]
    pub fn applies_to(&self, role: AgentRole, strategy: Strategy) -> bool {
        self.role == role && self.strategy.is_none_or(|wanted| wanted == strategy)
    }
}

/// A skill from the skill catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    /// Identifier (directory name).
    pub id: String,
    /// Display name.
    pub name: String,
    /// One-line description.
    pub description: String,
    /// Plugin directory passed to the agent process.
    pub path: PathBuf,
}
