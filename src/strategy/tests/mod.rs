//! Unit tests for phase machines and coordinator executors.

mod engine_tests;
mod phase_tests;
