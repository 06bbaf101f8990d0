//! Unit tests for the manifest pipeline.
