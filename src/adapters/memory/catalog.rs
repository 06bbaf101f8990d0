//! Fixed skill catalog.

use crate::manifest::domain::Skill;
use crate::manifest::ports::{SkillCatalog, SkillCatalogError};
use async_trait::async_trait;
use std::path::PathBuf;

/// Skill catalog backed by a fixed list.
#[derive(Debug, Clone, Default)]
pub struct StaticSkillCatalog {
    skills: Vec<Skill>,
}

impl StaticSkillCatalog {
    /// Creates a catalog from a list of skills.
    #[must_use]
    pub fn new(skills: impl IntoIterator<Item = Skill>) -> Self {
        Self {
            skills: skills.into_iter().collect(),
        }
    }

    /// Adds a skill whose identifier and name are both `id`.
    #[must_use]
    pub fn with_skill(mut self, id: &str, path: impl Into<PathBuf>) -> Self {
        self.skills.push(Skill {
            id: id.to_owned(),
            name: id.to_owned(),
            description: String::new(),
            path: path.into(),
        });
        self
    }
}

#[async_trait]
impl SkillCatalog for StaticSkillCatalog {
    async fn resolve(&self, name: &str) -> Result<Option<Skill>, SkillCatalogError> {
        Ok(self
            .skills
            .iter()
            .find(|skill| skill.id == name || skill.name == name)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Skill>, SkillCatalogError> {
        Ok(self.skills.clone())
    }
}
