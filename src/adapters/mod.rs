//! Adapters for the crate's ports.
//!
//! - [`memory`]: the in-memory reference store and a fixed skill catalog
//! - [`recording`]: a spawner and an event sink that only record
//! - [`process`]: the `tokio::process` spawner for real agent binaries
//! - [`skills`]: a skill catalog over a plugin directory

pub mod memory;
pub mod process;
pub mod recording;
pub mod skills;

pub use memory::{InMemoryStore, StaticSkillCatalog};
pub use process::AgentProcessSpawner;
pub use recording::{RecordingSink, RecordingSpawner};
pub use skills::DirectorySkillCatalog;
