//! Background and operator work over stored aggregates.
//!
//! - Rebuild (raw log → day counters and unique sets)
//! - Legacy migration (flat sets and totals)
//! - Reporting reads with unique attribution
//! - Scheduler (health probe, periodic rebuild)

pub mod aggregate;
pub mod migrate;
pub mod rebuild;
pub mod report;
pub mod scheduler;

pub use aggregate::DayAggregates;
pub use migrate::{LegacyMigrator, MigrationReport};
pub use rebuild::*;
pub use report::{collect_stats, StatsReport};
pub use scheduler::*;
