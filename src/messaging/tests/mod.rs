//! Unit tests for the command channel.
