//! fleetgrid-state — embedded fleet state store for FleetGrid.
//!
//! Backed by [redb](https://docs.rs/redb), the single source of truth for
//! deployment targets, pipeline runs, rollback records, escalation events,
//! and recent health reports.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Composite keys (`{environment}/{id}`, `{target_id}:{seq}`) enable
//! prefix scans for related records. Every write is a single-record
//! transaction; redb serializes writers, so concurrent writers to the
//! same target serialize and no cross-target atomicity exists or is
//! offered.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by
//! `Arc<Database>`) and is shared across the monitor, dispatcher, and
//! pipeline tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
