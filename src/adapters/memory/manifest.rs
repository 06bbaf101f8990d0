//! Manifest and template ports.

use super::{InMemoryStore, poisoned};
use crate::manifest::domain::{Manifest, Template, TemplateId};
use crate::manifest::ports::{
    ManifestRepository, ManifestRepositoryError, ManifestRepositoryResult, TemplateRepository,
    TemplateRepositoryError, TemplateRepositoryResult,
};
use crate::session::domain::SessionId;
use crate::strategy::{AgentRole, Strategy};
use async_trait::async_trait;
use std::collections::hash_map::Entry;

#[async_trait]
impl ManifestRepository for InMemoryStore {
    async fn store_manifest(&self, manifest: &Manifest) -> ManifestRepositoryResult<()> {
        let mut state = self
            .state
            .write()
            .map_err(|err| ManifestRepositoryError::persistence(poisoned(err)))?;
        match state.manifests.entry(manifest.session_id) {
            Entry::Occupied(_) => Err(ManifestRepositoryError::AlreadyWritten(manifest.session_id)),
            Entry::Vacant(slot) => {
                slot.insert(manifest.clone());
                Ok(())
            }
        }
    }

    async fn find_manifest(
        &self,
        session_id: SessionId,
    ) -> ManifestRepositoryResult<Option<Manifest>> {
        let state = self
            .state
            .read()
            .map_err(|err| ManifestRepositoryError::persistence(poisoned(err)))?;
        Ok(state.manifests.get(&session_id).cloned())
    }
}

#[async_trait]
impl TemplateRepository for InMemoryStore {
    async fn store_template(&self, template: &Template) -> TemplateRepositoryResult<()> {
        let mut state = self
            .state
            .write()
            .map_err(|err| TemplateRepositoryError::persistence(poisoned(err)))?;
        if state.templates.contains_key(&template.id) {
            return Err(TemplateRepositoryError::DuplicateTemplate(
                template.id.clone(),
            ));
        }
        state.templates.insert(template.id.clone(), template.clone());
        Ok(())
    }

    async fn find_template(&self, id: &TemplateId) -> TemplateRepositoryResult<Option<Template>> {
        let state = self
            .state
            .read()
            .map_err(|err| TemplateRepositoryError::persistence(poisoned(err)))?;
        Ok(state.templates.get(id).cloned())
    }

    async fn find_default(
        &self,
        role: AgentRole,
        strategy: Strategy,
    ) -> TemplateRepositoryResult<Option<Template>> {
        let state = self
            .state
            .read()
            .map_err(|err| TemplateRepositoryError::persistence(poisoned(err)))?;
        let mut defaults = state
            .templates
            .values()
            .filter(|template| template.is_default && template.applies_to(role, strategy));
        let first = defaults.next();
        let specific = first
            .into_iter()
            .chain(defaults)
            .find(|template| template.strategy == Some(strategy));
        Ok(specific.or(first).cloned())
    }
}
