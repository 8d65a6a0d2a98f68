//! fleetgrid-pipeline — the deployment pipeline controller.
//!
//! Drives a deployment request through the fixed stage order
//! `Build → Test → SecurityScan → Push → DeployStaging → Approval →
//! DeployProduction → Canary → Promote`, consulting the canary selector
//! and health transitions for gating and invoking the rollback engine and
//! escalation dispatcher on production failure.
//!
//! # Components
//!
//! - **`locks`** — per-target locking so a target sees at most one
//!   in-flight version change; a second run queues behind the first
//! - **`approval`** — the suspended human approval gate (resume by
//!   external signal, reject, or timeout)
//! - **`controller`** — the run state machine itself

pub mod approval;
pub mod controller;
pub mod locks;

pub use approval::{ApprovalDecision, ApprovalGate, ApprovalOutcome};
pub use controller::{PipelineController, PipelineError, PipelineResult, StageFn};
pub use locks::{TargetLockGuard, TargetLocks};
