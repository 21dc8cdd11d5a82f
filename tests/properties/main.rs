//! Property-based tests for progression invariants.

mod progression_tests;
mod verification_tests;
