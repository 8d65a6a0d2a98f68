//! fleet-core — shared configuration and collaborator seams for FleetGrid.
//!
//! Holds the `fleet.toml` configuration model (rollout policy, health
//! policy, escalation windows, per-environment fleets) and the
//! function-typed seams through which the orchestrator hands side effects
//! to external systems (version switching, stage execution).

pub mod config;
pub mod exec;

pub use config::{
    CanaryPolicy, EnvironmentConfig, EscalationPolicy, FleetConfig, HealthPolicy,
    PipelinePolicy, TargetSeed, parse_duration,
};
pub use exec::{ApplyFn, BoxFuture, logging_applier, noop_applier};
