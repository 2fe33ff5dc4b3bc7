//! Idempotent open-event ingestion for the tally engine.

pub mod fanout;
pub mod processor;

pub use processor::*;
