//! The entity store: every repository port behind one handle.
//!
//! Services that span contexts (the session supervisor, the command gateway,
//! the composition root) are generic over [`EntityStore`] rather than over
//! a long list of port bounds. Any type implementing every port qualifies;
//! [`crate::adapters::InMemoryStore`] is the reference implementation.

use crate::manifest::ports::{ManifestRepository, TemplateRepository};
use crate::queue::ports::QueueRepository;
use crate::session::ports::SessionRepository;
use crate::task::ports::{AssociationRepository, ProjectRepository, TaskRepository};
use crate::team::ports::TeamRepository;

/// Union of the repository ports.
pub trait EntityStore:
    TaskRepository
    + ProjectRepository
    + AssociationRepository
    + SessionRepository
    + QueueRepository
    + TeamRepository
    + ManifestRepository
    + TemplateRepository
{
}

impl<T> EntityStore for T where
    T: TaskRepository
        + ProjectRepository
        + AssociationRepository
        + SessionRepository
        + QueueRepository
        + TeamRepository
        + ManifestRepository
        + TemplateRepository
{
}
