//! Step definitions for the queue worker feature.

mod given;
mod then;
mod when;
pub mod world;
