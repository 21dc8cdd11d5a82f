//! E2E test suite entry point.

mod fixture;
mod progression_workflow;
