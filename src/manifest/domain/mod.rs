//! Manifests, templates, and compiled prompts.

mod error;
mod manifest;
mod template;

pub use error::TemplateError;
pub use manifest::{
    CompiledPrompt, Manifest, ManifestContext, ManifestRequest, SessionConfig, TaskSnapshot,
};
pub use template::{Skill, Template, TemplateId};
