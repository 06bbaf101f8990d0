//! Domain model for agent sessions.
//!
//! A session is one spawned agent process working on one or more tasks. Its
//! status follows `spawning -> {idle, working} -> {completed, failed,
//! stopped}`, with `idle` and `working` interchangeable while it runs.

mod error;
mod ids;
mod session;
mod watch;

pub use error::SessionDomainError;
pub use ids::{SessionId, SpawnHandle};
pub use session::{NewSession, Session, SessionStatus, TimelineEntry, TimelineKind};
pub use watch::WatchOutcome;
