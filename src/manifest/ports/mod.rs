//! Ports for manifest storage, template lookup, and skill resolution.

use super::domain::{Manifest, Skill, Template, TemplateId};
use crate::error::{EntityKind, EntityRef, OrchestrationError};
use crate::session::domain::SessionId;
use crate::strategy::{AgentRole, Strategy};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for manifest repository operations.
pub type ManifestRepositoryResult<T> = Result<T, ManifestRepositoryError>;

/// Write-once manifest persistence contract.
#[async_trait]
pub trait ManifestRepository: Send + Sync {
    /// Stores the manifest for its session.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestRepositoryError::AlreadyWritten`] when the session
    /// already has a manifest.
    async fn store_manifest(&self, manifest: &Manifest) -> ManifestRepositoryResult<()>;

    /// Finds the manifest written for a session.
    async fn find_manifest(&self, session_id: SessionId)
    -> ManifestRepositoryResult<Option<Manifest>>;
}

/// Errors returned by manifest repository implementations.
#[derive(Debug, Clone, Error)]
pub enum ManifestRepositoryError {
    /// A manifest was already written for the session.
    #[error("manifest for session {0} was already written")]
    AlreadyWritten(SessionId),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl ManifestRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}

impl From<ManifestRepositoryError> for OrchestrationError {
    fn from(error: ManifestRepositoryError) -> Self {
        match error {
            ManifestRepositoryError::AlreadyWritten(session_id) => {
                Self::state_conflict(error.to_string())
                    .with_entity(EntityRef::new(EntityKind::Manifest, session_id))
            }
            ManifestRepositoryError::Persistence(_) => Self::storage(error.to_string()),
        }
    }
}

/// Result type for template repository operations.
pub type TemplateRepositoryResult<T> = Result<T, TemplateRepositoryError>;

/// Template lookup contract.
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    /// Stores a template.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateRepositoryError::DuplicateTemplate`] when the
    /// identifier is taken.
    async fn store_template(&self, template: &Template) -> TemplateRepositoryResult<()>;

    /// Finds a template by identifier.
    async fn find_template(&self, id: &TemplateId) -> TemplateRepositoryResult<Option<Template>>;

    /// Finds the default template for a role and strategy.
    ///
    /// A strategy-specific default wins over a role-wide one.
    async fn find_default(
        &self,
        role: AgentRole,
        strategy: Strategy,
    ) -> TemplateRepositoryResult<Option<Template>>;
}

/// Errors returned by template repository implementations.
#[derive(Debug, Clone, Error)]
pub enum TemplateRepositoryError {
    /// A template with the same identifier already exists.
    #[error("duplicate template identifier: {0}")]
    DuplicateTemplate(TemplateId),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl TemplateRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}

impl From<TemplateRepositoryError> for OrchestrationError {
    fn from(error: TemplateRepositoryError) -> Self {
        match error {
            TemplateRepositoryError::DuplicateTemplate(ref id) => {
                let entity = EntityRef::template(id);
                Self::state_conflict(error.to_string()).with_entity(entity)
            }
            TemplateRepositoryError::Persistence(_) => Self::storage(error.to_string()),
        }
    }
}

/// Resolves skill names to plugin directories.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SkillCatalog: Send + Sync {
    /// Resolves a skill by name. Returns `None` when unknown.
    async fn resolve(&self, name: &str) -> Result<Option<Skill>, SkillCatalogError>;

    /// Lists every available skill.
    async fn list(&self) -> Result<Vec<Skill>, SkillCatalogError>;
}

/// Skill catalog failure.
#[derive(Debug, Clone, Error)]
#[error("skill catalog error: {reason}")]
pub struct SkillCatalogError {
    /// Underlying reason.
    pub reason: String,
}

impl From<SkillCatalogError> for OrchestrationError {
    fn from(error: SkillCatalogError) -> Self {
        Self::storage(error.to_string())
    }
}
