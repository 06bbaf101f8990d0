//! Manifest assembly and prompt compilation.

mod builder;
pub mod compiler;

pub use builder::{ManifestBuilder, ManifestDefaults};
