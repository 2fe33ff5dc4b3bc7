//! Key-value and log store access for the tally engine.
//!
//! Two backends implement [`KvStore`]: a REST pipeline client for an
//! Upstash-compatible service and an in-process keyspace for development and
//! tests.

pub mod client;
pub mod command;
pub mod config;
pub mod health;
pub mod memory;
pub mod ops;
pub mod raw_log;
pub mod store;
pub mod unique;

pub use client::*;
pub use command::*;
pub use config::*;
pub use memory::MemoryStore;
pub use store::*;
