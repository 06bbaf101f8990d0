//! Unit tests for the session context.

mod supervisor_tests;
mod watch_tests;
