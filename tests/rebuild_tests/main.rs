//! Batch rebuild and archive builder integration tests

#[path = "../support/mod.rs"]
mod support;

mod batch_tests;
