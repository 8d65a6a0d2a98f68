//! Rollback engine.

use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use fleet_core::ApplyFn;
use fleetgrid_escalate::EscalationDispatcher;
use fleetgrid_state::{
    EscalationTier, EscalationTrigger, RollbackOutcome, RollbackRecord, StateError, StateStore,
    TargetId,
};

/// Result type for rollback operations.
pub type RollbackResult<T> = Result<T, RollbackError>;

/// Errors that can occur rolling a target back.
#[derive(Debug, Error)]
pub enum RollbackError {
    #[error("no last-known-good version recorded for target {0}")]
    NoKnownGood(String),

    #[error("rollback apply failed for target {target_id}: {error}")]
    ApplyFailed { target_id: String, error: String },

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

/// Outcome of rolling back a set of targets in parallel.
#[derive(Debug, Default)]
pub struct FleetRollbackReport {
    pub records: Vec<RollbackRecord>,
    /// Targets that could not be rolled back, with the failure reason.
    pub failures: Vec<(TargetId, String)>,
}

impl FleetRollbackReport {
    /// True only when every affected target was restored.
    pub fn complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Restores targets to their recorded last-known-good version.
#[derive(Clone)]
pub struct RollbackEngine {
    state: StateStore,
    apply: ApplyFn,
    dispatcher: Arc<EscalationDispatcher>,
}

impl RollbackEngine {
    pub fn new(state: StateStore, apply: ApplyFn, dispatcher: Arc<EscalationDispatcher>) -> Self {
        Self {
            state,
            apply,
            dispatcher,
        }
    }

    /// Roll one target back to last-known-good.
    ///
    /// Idempotent: repeat invocations on a target already at
    /// last-known-good succeed as no-ops, each still appending an audit
    /// record.
    pub async fn rollback(
        &self,
        environment: &str,
        target_id: &str,
        reason: &str,
        now: u64,
    ) -> RollbackResult<RollbackRecord> {
        let target = self.state.require_target(environment, target_id)?;
        let Some(known_good) = target.last_known_good.clone() else {
            return Err(RollbackError::NoKnownGood(target_id.to_string()));
        };

        if target.version == known_good {
            // Already there: record the attempt, issue no change.
            let record = self.state.append_rollback(
                environment,
                target_id,
                &target.version,
                &known_good,
                reason,
                RollbackOutcome::NoOp,
                now,
            )?;
            info!(%target_id, version = %known_good, "rollback no-op: already at last-known-good");
            return Ok(record);
        }

        match (self.apply)(target_id.to_string(), known_good.clone()).await {
            Ok(()) => {
                self.state
                    .update_version(environment, target_id, &known_good, false, now)?;
                let record = self.state.append_rollback(
                    environment,
                    target_id,
                    &target.version,
                    &known_good,
                    reason,
                    RollbackOutcome::Applied,
                    now,
                )?;
                info!(
                    %target_id,
                    from = %target.version,
                    to = %known_good,
                    "target rolled back"
                );
                Ok(record)
            }
            Err(e) => {
                // Fatal: automation cannot be trusted further for this
                // target, so skip the automated tier entirely.
                let error = e.to_string();
                self.state.append_rollback(
                    environment,
                    target_id,
                    &target.version,
                    &known_good,
                    reason,
                    RollbackOutcome::Failed {
                        error: error.clone(),
                    },
                    now,
                )?;
                error!(%target_id, %error, "rollback apply failed; escalating on-call");
                if let Err(esc) = self
                    .dispatcher
                    .open_at(
                        EscalationTrigger::RollbackFailure {
                            target_id: target_id.to_string(),
                        },
                        EscalationTier::OnCall,
                        now,
                    )
                    .await
                {
                    error!(%target_id, error = %esc, "failed to open rollback-failure incident");
                }
                Err(RollbackError::ApplyFailed {
                    target_id: target_id.to_string(),
                    error,
                })
            }
        }
    }

    /// Roll a set of targets back in parallel.
    ///
    /// Each target is rolled back independently; partial failure is
    /// recorded per target and surfaced in the report rather than
    /// aborting the rest of the fleet.
    pub async fn rollback_fleet(
        &self,
        environment: &str,
        targets: &[TargetId],
        reason: &str,
        now: u64,
    ) -> FleetRollbackReport {
        let mut tasks = JoinSet::new();
        for target_id in targets {
            let engine = self.clone();
            let environment = environment.to_string();
            let target_id = target_id.clone();
            let reason = reason.to_string();
            tasks.spawn(async move {
                let result = engine.rollback(&environment, &target_id, &reason, now).await;
                (target_id, result)
            });
        }

        let mut report = FleetRollbackReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(record))) => report.records.push(record),
                Ok((target_id, Err(e))) => {
                    warn!(%target_id, error = %e, "fleet rollback: target failed");
                    report.failures.push((target_id, e.to_string()));
                }
                Err(join_err) => {
                    error!(error = %join_err, "fleet rollback task panicked");
                    report
                        .failures
                        .push(("<unknown>".to_string(), join_err.to_string()));
                }
            }
        }
        report
    }
}
