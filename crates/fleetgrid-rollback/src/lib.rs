//! fleetgrid-rollback — restore targets to their last-known-good version.
//!
//! Rollback always targets the state store's recorded last-known-good,
//! never a caller-supplied version; rolling back to another bad version
//! is not an available mistake. Calls are idempotent: a target already at
//! last-known-good records a no-op audit entry without issuing a change.
//! A failed apply is fatal, never auto-retried, and escalates straight to
//! the on-call tier.

pub mod engine;

pub use engine::{FleetRollbackReport, RollbackEngine, RollbackError, RollbackResult};
