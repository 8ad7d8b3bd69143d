//! Integration tests for txguard

mod concurrency;
mod config_integration;
mod notes_workflow;
