//! Session supervision: spawning, lifecycle reports, watching, and
//! coordinator runs.

mod launcher;
mod supervisor;
mod watch;

pub use launcher::SupervisorLauncher;
pub use supervisor::{SessionSupervisor, SupervisorSettings};
