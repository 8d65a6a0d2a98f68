//! Pipeline controller — drives the deployment state machine.
//!
//! A run walks the fixed stage order, retrying only idempotent
//! pre-production stages, suspending at Approval, and gating production
//! on the canary bake. Any failure before Approval aborts without
//! touching production; any failure at or after DeployProduction rolls
//! back every target this run touched and escalates.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use fleet_core::{ApplyFn, BoxFuture, FleetConfig, parse_duration};
use fleetgrid_canary::{CanaryError, CanaryGroup, Verdict, select};
use fleetgrid_escalate::EscalationDispatcher;
use fleetgrid_health::StatusTransition;
use fleetgrid_rollback::RollbackEngine;
use fleetgrid_state::{
    DeploymentRequest, EscalationTrigger, PipelineRun, RunOutcome, Stage, StageOutcome,
    StageRecord, StateError, StateStore, Target, TargetId,
};

use crate::approval::{ApprovalGate, ApprovalOutcome};
use crate::locks::TargetLocks;

/// Runs the work of an external stage (build, test, scan, push, staging
/// deploy) for a request. The CI/CD machinery behind it is not our
/// concern; an `Err` is a stage failure.
pub type StageFn =
    Arc<dyn Fn(Stage, DeploymentRequest) -> BoxFuture<anyhow::Result<()>> + Send + Sync>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors that reject or interrupt a run outright. Stage failures are
/// not errors; they are recorded in the run's history and outcome.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed request, rejected before a run is created.
    #[error("invalid deployment request: {0}")]
    Validation(String),

    #[error("canary selection failed: {0}")]
    Canary(#[from] CanaryError),

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

/// Outcome of executing one stage.
enum StageResult {
    Passed,
    Failed(String),
}

/// Sequences deployment requests through the fixed stages.
pub struct PipelineController {
    state: StateStore,
    config: FleetConfig,
    stage_fn: StageFn,
    apply: ApplyFn,
    rollback: RollbackEngine,
    dispatcher: Arc<EscalationDispatcher>,
    transitions: broadcast::Sender<StatusTransition>,
    approvals: Arc<ApprovalGate>,
    locks: Arc<TargetLocks>,
}

impl PipelineController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: StateStore,
        config: FleetConfig,
        stage_fn: StageFn,
        apply: ApplyFn,
        rollback: RollbackEngine,
        dispatcher: Arc<EscalationDispatcher>,
        transitions: broadcast::Sender<StatusTransition>,
    ) -> Self {
        Self {
            state,
            config,
            stage_fn,
            apply,
            rollback,
            dispatcher,
            transitions,
            approvals: Arc::new(ApprovalGate::new()),
            locks: Arc::new(TargetLocks::new()),
        }
    }

    /// The gate external actors use to resume suspended runs.
    pub fn approvals(&self) -> Arc<ApprovalGate> {
        self.approvals.clone()
    }

    /// Accept and execute a deployment request, returning the completed
    /// run. Stage failures terminate the run with `Aborted` or
    /// `RolledBack`; only request validation and storage problems are
    /// `Err`.
    pub async fn run(&self, request: DeploymentRequest) -> PipelineResult<PipelineRun> {
        // Validation happens before a run exists.
        if request.image_tag.trim().is_empty() {
            return Err(PipelineError::Validation(
                "image tag must not be empty".to_string(),
            ));
        }
        let targets = self.state.list_targets(&request.environment)?;
        if targets.is_empty() {
            return Err(PipelineError::Validation(format!(
                "unknown or empty environment: {}",
                request.environment
            )));
        }
        if targets.len() < 2 {
            return Err(PipelineError::Validation(format!(
                "environment {} needs at least two targets for a canary split",
                request.environment
            )));
        }

        // One in-flight version change per target: a second run over the
        // same fleet queues here until the first completes.
        let ids: Vec<TargetId> = targets.iter().map(|t| t.id.clone()).collect();
        let _fleet_lock = self.locks.acquire(&ids).await;

        let now = epoch_secs();
        let seq = self.state.next_run_seq(&request.environment)?;
        let mut run = PipelineRun {
            id: format!("{}/{seq:06}", request.environment),
            request: request.clone(),
            stage: Some(Stage::Build),
            history: Vec::new(),
            outcome: None,
            created_at: now,
            updated_at: now,
        };
        self.state.put_run(&run)?;
        info!(
            run_id = %run.id,
            environment = %request.environment,
            image_tag = %request.image_tag,
            dry_run = request.dry_run,
            "pipeline run accepted"
        );

        // Subscribe before any production apply so the bake cannot miss
        // a transition that fires between deploy and observation.
        let mut bake_rx = self.transitions.subscribe();

        let mut canary_members: Vec<TargetId> = Vec::new();
        let mut touched: Vec<TargetId> = Vec::new();

        while let Some(stage) = run.stage {
            let started = epoch_secs();
            debug!(run_id = %run.id, %stage, "stage starting");

            let result = match stage {
                Stage::Approval => self.run_approval(&run).await,
                Stage::DeployProduction => {
                    self.deploy_canaries(&run, &targets, &mut canary_members, &mut touched)
                        .await?
                }
                Stage::Canary => self.bake_canaries(&run, &canary_members, &mut bake_rx).await?,
                Stage::Promote => {
                    self.promote(&run, &targets, &canary_members, &mut touched).await?
                }
                external => self.run_external(external, &run.request).await,
            };

            let ended = epoch_secs();
            match result {
                StageResult::Passed => {
                    run.history.push(StageRecord {
                        stage,
                        outcome: StageOutcome::Passed,
                        started_at: started,
                        ended_at: ended,
                    });
                    run.stage = stage.next();
                    run.updated_at = ended;
                    self.state.put_run(&run)?;
                    info!(run_id = %run.id, %stage, "stage passed");
                }
                StageResult::Failed(reason) => {
                    run.history.push(StageRecord {
                        stage,
                        outcome: StageOutcome::Failed {
                            error: reason.clone(),
                        },
                        started_at: started,
                        ended_at: ended,
                    });
                    run.stage = None;
                    run.updated_at = ended;

                    if stage.aborts_without_rollback() {
                        // Non-production impact: report upstream, no
                        // rollback, no escalation.
                        warn!(run_id = %run.id, %stage, %reason, "run aborted before production");
                        run.outcome = Some(RunOutcome::Aborted { reason });
                        self.state.put_run(&run)?;
                        return Ok(run);
                    }

                    let partial = self
                        .handle_production_failure(&run, stage, &reason, &touched)
                        .await?;
                    run.outcome = Some(RunOutcome::RolledBack { partial });
                    self.state.put_run(&run)?;
                    return Ok(run);
                }
            }
        }

        run.outcome = Some(RunOutcome::Succeeded);
        run.updated_at = epoch_secs();
        self.state.put_run(&run)?;
        info!(run_id = %run.id, "pipeline run succeeded");
        Ok(run)
    }

    /// Delegate an external stage to the CI/CD collaborator, retrying
    /// idempotent stages up to the configured count.
    async fn run_external(&self, stage: Stage, request: &DeploymentRequest) -> StageResult {
        let attempts = 1 + if stage.retryable() {
            self.config.pipeline.stage_retries
        } else {
            0
        };

        let mut last_error = String::new();
        for attempt in 1..=attempts {
            match (self.stage_fn)(stage, request.clone()).await {
                Ok(()) => return StageResult::Passed,
                Err(e) => {
                    last_error = e.to_string();
                    warn!(%stage, attempt, attempts, error = %last_error, "stage attempt failed");
                }
            }
        }
        StageResult::Failed(format!(
            "{stage} failed after {attempts} attempt(s): {last_error}"
        ))
    }

    /// Suspend at the approval gate unless the environment auto-approves.
    async fn run_approval(&self, run: &PipelineRun) -> StageResult {
        let auto = self
            .config
            .environments
            .get(&run.request.environment)
            .map(|env| env.auto_approve)
            .unwrap_or(false);
        if auto {
            info!(run_id = %run.id, "approval auto-granted by environment policy");
            return StageResult::Passed;
        }

        let timeout = parse_duration(&self.config.pipeline.approval_timeout);
        match self.approvals.wait(&run.id, timeout).await {
            ApprovalOutcome::Approved { by } => {
                info!(run_id = %run.id, %by, "run approved");
                StageResult::Passed
            }
            ApprovalOutcome::Rejected { by } => {
                StageResult::Failed(format!("approval rejected by {by}"))
            }
            ApprovalOutcome::TimedOut => {
                StageResult::Failed("approval timed out with no decision".to_string())
            }
        }
    }

    /// Select the canary group and push the new version to it, and only
    /// to it. The non-canary majority stays untouched until promotion.
    async fn deploy_canaries(
        &self,
        run: &PipelineRun,
        targets: &[Target],
        members: &mut Vec<TargetId>,
        touched: &mut Vec<TargetId>,
    ) -> PipelineResult<StageResult> {
        *members = select(targets, &self.config.canary)?;
        info!(run_id = %run.id, canaries = ?members, "canary group selected");

        let request = &run.request;
        for id in members.iter() {
            if request.dry_run {
                info!(target_id = %id, image_tag = %request.image_tag, "dry-run: canary version switch suppressed");
                continue;
            }
            touched.push(id.clone());
            if let Err(e) = (self.apply)(id.clone(), request.image_tag.clone()).await {
                return Ok(StageResult::Failed(format!(
                    "canary deploy to {id} failed: {e}"
                )));
            }
            // Deployed, not bake-verified: never marks last-known-good.
            self.state.update_version(
                &request.environment,
                id,
                &request.image_tag,
                false,
                epoch_secs(),
            )?;
        }
        Ok(StageResult::Passed)
    }

    /// Observe the canary group for the bake window. Timed suspension
    /// with early exit: the first Critical member fails the group
    /// immediately, and the window never extends.
    async fn bake_canaries(
        &self,
        run: &PipelineRun,
        members: &[TargetId],
        transitions: &mut broadcast::Receiver<StatusTransition>,
    ) -> PipelineResult<StageResult> {
        let bake = parse_duration(&self.config.canary.bake).unwrap_or(Duration::from_secs(300));
        let now = epoch_secs();
        // Timestamps are second-granular; a sub-second window must still
        // be a window.
        let bake_secs = bake.as_secs().max(1);
        let mut group = CanaryGroup::new(
            &run.id,
            members.to_vec(),
            now,
            bake_secs,
            self.config.canary.degraded_fails_bake,
        );
        info!(run_id = %run.id, bake_secs = bake.as_secs(), "canary bake started");

        // Seed with the fleet's current view: a member that is already
        // Critical fails without waiting for a fresh transition.
        for id in members {
            let target = self.state.require_target(&run.request.environment, id)?;
            group.observe(id, target.health, now);
        }

        let deadline = tokio::time::Instant::now() + bake;
        while group.verdict() == Verdict::Pending {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    group.expire(group.deadline());
                }
                received = transitions.recv() => match received {
                    Ok(transition) => {
                        if transition.environment == run.request.environment {
                            group.observe(&transition.target_id, transition.to, transition.at);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(run_id = %run.id, missed, "canary bake lagged behind transitions");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        // No transitions can arrive anymore; wait out the
                        // remaining window.
                        tokio::time::sleep_until(deadline).await;
                        group.expire(group.deadline());
                    }
                }
            }
        }

        match group.verdict() {
            Verdict::Pass => Ok(StageResult::Passed),
            Verdict::Fail => Ok(StageResult::Failed(
                group
                    .failure()
                    .unwrap_or("canary bake failed")
                    .to_string(),
            )),
            Verdict::Pending => unreachable!("bake loop exits only on a verdict"),
        }
    }

    /// Roll the remainder of the fleet to the new version and mark it
    /// last-known-good everywhere: the version has now survived a full
    /// bake.
    async fn promote(
        &self,
        run: &PipelineRun,
        targets: &[Target],
        members: &[TargetId],
        touched: &mut Vec<TargetId>,
    ) -> PipelineResult<StageResult> {
        let request = &run.request;
        if request.dry_run {
            info!(run_id = %run.id, "dry-run: promotion suppressed");
            return Ok(StageResult::Passed);
        }

        let member_set: HashSet<&TargetId> = members.iter().collect();

        // Switch the non-canary remainder first; last-known-good moves
        // only once every apply has landed, so a failure here still
        // rolls back to the old version.
        for target in targets.iter().filter(|t| !member_set.contains(&t.id)) {
            touched.push(target.id.clone());
            if let Err(e) = (self.apply)(target.id.clone(), request.image_tag.clone()).await {
                return Ok(StageResult::Failed(format!(
                    "promote to {} failed: {e}",
                    target.id
                )));
            }
            self.state.update_version(
                &request.environment,
                &target.id,
                &request.image_tag,
                false,
                epoch_secs(),
            )?;
        }

        let now = epoch_secs();
        for target in targets {
            self.state
                .update_version(&request.environment, &target.id, &request.image_tag, true, now)?;
        }
        info!(run_id = %run.id, image_tag = %request.image_tag, "fleet promoted; version marked known-good");
        Ok(StageResult::Passed)
    }

    /// Failure handling at or after DeployProduction: escalate once for
    /// the run and roll back every touched target. Returns whether the
    /// rollback was partial.
    async fn handle_production_failure(
        &self,
        run: &PipelineRun,
        stage: Stage,
        reason: &str,
        touched: &[TargetId],
    ) -> PipelineResult<bool> {
        if run.request.dry_run {
            info!(run_id = %run.id, %stage, %reason, "dry-run: rollback and escalation suppressed");
            return Ok(false);
        }

        warn!(run_id = %run.id, %stage, %reason, "production failure; rolling back touched targets");
        let now = epoch_secs();
        if let Err(e) = self
            .dispatcher
            .open(
                EscalationTrigger::PipelineFailure {
                    run_id: run.id.clone(),
                    stage,
                },
                now,
            )
            .await
        {
            error!(run_id = %run.id, error = %e, "failed to open pipeline-failure incident");
        }

        if touched.is_empty() {
            return Ok(false);
        }
        let report = self
            .rollback
            .rollback_fleet(&run.request.environment, touched, reason, now)
            .await;
        if !report.complete() {
            warn!(
                run_id = %run.id,
                failed = report.failures.len(),
                "rollback incomplete; run remains partially rolled back"
            );
        }
        Ok(!report.complete())
    }
}

fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
