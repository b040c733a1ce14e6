//! Test helpers for reconciler integration tests.

pub mod fake_api;
