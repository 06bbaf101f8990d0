//! Unit tests for the queue context.

mod domain_tests;
