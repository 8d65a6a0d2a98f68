//! fleetgrid-health — health evaluation for FleetGrid targets.
//!
//! Converts raw per-target health reports into a classified status and
//! emits edge-triggered transitions when the status changes.
//!
//! # Architecture
//!
//! ```text
//! HealthMonitor
//!   ├── Per-target background task
//!   │   ├── ReportFetchFn → Option<HealthReport>
//!   │   ├── classify() → HealthState (fail-closed on missing reports)
//!   │   └── StateStore: report window + health status
//!   └── broadcast<StatusTransition> for the dispatcher and canary bakes
//! ```
//!
//! Classification is deterministic over the typed check set, with no partial
//! credit averaging. A report missing past the grace period is treated as
//! Critical (fail-closed). Transitions are edge-triggered: a status is
//! published only when it differs from the previous one, so a target
//! sitting at Critical does not re-page anyone every poll.

pub mod classifier;
pub mod monitor;

pub use classifier::{CheckPolicy, classify, failed_checks};
pub use monitor::{HealthMonitor, ReportFetchFn, StatusTransition};
