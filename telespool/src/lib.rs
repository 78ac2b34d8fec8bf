//! # telespool
//!
//! Two-tier buffering core for telemetry routing agents.
//!
//! telespool is a Rust library for agents that sit between telemetry
//! producers and consumers. It keeps per-route FIFO queues in memory under
//! an approximate byte budget, and a periodic scheduler spills overflow to
//! disk as self-describing JSON files — recovering it back into memory
//! when pressure drops — so a slow or absent consumer degrades smoothly
//! instead of growing memory without bound.
//!
//! ## Key Properties
//!
//! - Per-route FIFO queues with O(1) size accounting; enqueue never blocks
//! - Deterministic, schema-aware byte estimation (no serialization on the
//!   hot path)
//! - Bounded disk tier with oldest-first eviction and newest-first recovery
//! - Human-readable budget strings (`"10MB"`, base-1024) and intervals
//!   (`"250ms"`, `"1s"`, ...)
//! - All data loss is deliberate, bounded, and logged
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use telespool::{
//!     BufferConfig, BufferRegistry, DataRecord, ExecutionFormat, SpillScheduler,
//!     SpillTarget, TimeFormat,
//! };
//!
//! # async fn demo() -> telespool::Result<()> {
//! let registry = Arc::new(BufferRegistry::new());
//!
//! // One spill target per route, built from its configuration.
//! let config = BufferConfig::default();
//! let target = SpillTarget::from_config("http_listener_1", &config)?;
//! let scheduler = SpillScheduler::new(
//!     Arc::clone(&registry),
//!     vec![target],
//!     config.interval()?,
//!     ExecutionFormat::Parallel,
//! );
//!
//! // Producers enqueue records; the scheduler balances tiers in the
//! // background until shutdown is signalled.
//! let mut record = DataRecord::new("http_listener_1");
//! record.append_row(
//!     &["temp"],
//!     &[21.5.into()],
//!     chrono::Utc::now(),
//!     TimeFormat::UnixMillis,
//! )?;
//! registry.enqueue("http_listener_1", record);
//!
//! let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! tokio::spawn(async move { scheduler.run(shutdown_rx).await });
//! # drop(shutdown_tx);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`record`] — The [`DataRecord`] payload model
//! - [`timefmt`] — Timestamp format tags and rendering
//! - [`estimate`] — Approximate byte-footprint accounting
//! - [`registry`] — Per-route queues and the registry over them
//! - [`retention`] — On-disk spill tier with retention limits
//! - [`scheduler`] — The periodic memory/disk balancing loop
//! - [`config`] — Per-route configuration and unit parsers
//! - [`error`] — Error types

pub mod config;
pub mod error;
pub mod estimate;
pub mod record;
pub mod registry;
pub mod retention;
pub mod scheduler;
pub mod timefmt;

// Re-export primary API types at crate root for convenience.
pub use config::{format_size, parse_interval, parse_size, BufferConfig, ExecutionFormat};
pub use error::{Result, TelespoolError};
pub use estimate::estimated_size;
pub use record::{DataRecord, Field, FieldValue, TimedSample};
pub use registry::{BufferRegistry, RouteBuffer};
pub use retention::{DirStats, DiskRetentionPolicy, SpoolFile};
pub use scheduler::{SpillScheduler, SpillTarget};
pub use timefmt::TimeFormat;
