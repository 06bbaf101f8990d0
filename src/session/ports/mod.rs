//! Port contracts for session persistence and process spawning.

pub mod repository;
pub mod spawner;

pub use repository::{SessionRepository, SessionRepositoryError, SessionRepositoryResult};
#[cfg(test)]
pub use spawner::MockProcessSpawner;
pub use spawner::{ProcessSpawner, SPAWN_ENV_KEYS, SpawnError, SpawnRequest, SpawnResult};
