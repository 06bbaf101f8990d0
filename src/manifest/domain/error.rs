//! Prompt rendering errors.

use crate::error::{EntityRef, OrchestrationError};
use thiserror::Error;

/// Errors raised while rendering a prompt layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    /// The template failed to parse or referenced an unresolved variable.
    #[error("failed to render template {template}: {reason}")]
    Render {
        /// Template identifier or bundled template name.
        template: String,
        /// Renderer-provided reason.
        reason: String,
    },
}

impl From<TemplateError> for OrchestrationError {
    fn from(error: TemplateError) -> Self {
        match error {
            TemplateError::Render { ref template, .. } => {
                let entity = EntityRef::template(template);
                Self::manifest_generation(error.to_string()).with_entity(entity)
            }
        }
    }
}
