//! Unit tests for the team roster.
