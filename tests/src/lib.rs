//! Shared helpers for the HTTP-level test suites.

pub mod containers;
pub mod fixtures;
pub mod setup;
