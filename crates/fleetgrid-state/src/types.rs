//! Domain types for the fleet state store.
//!
//! These types represent the persisted state of deployment targets,
//! pipeline runs, rollback records, escalation events, and health
//! reports. All types are serializable to/from JSON for storage in redb
//! tables; check enums serialize to the exact wire strings targets emit.

use serde::{Deserialize, Serialize};

/// Unique identifier for a deployment target.
pub type TargetId = String;

/// Unique identifier for a pipeline run (environment-scoped).
pub type RunId = String;

/// Unique identifier for an escalation incident.
pub type IncidentId = String;

// ── Target ─────────────────────────────────────────────────────────

/// A deployment target: a cluster service replica set or a remote edge
/// device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Target {
    pub id: TargetId,
    pub environment: String,
    pub kind: TargetKind,
    /// Version currently deployed.
    pub version: String,
    /// Most recent version that survived a full canary bake. Rollback
    /// target of first resort; never overwritten by a merely-deployed
    /// version.
    pub last_known_good: Option<String>,
    pub health: HealthState,
    /// Relative traffic share, used to pick the least impactful canaries.
    pub traffic_share: Option<f64>,
    /// Unix timestamp of last mutation.
    pub updated_at: u64,
}

/// What kind of thing a target is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetKind {
    ClusterService,
    EdgeDevice,
}

impl TargetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetKind::ClusterService => "cluster-service",
            TargetKind::EdgeDevice => "edge-device",
        }
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TargetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cluster-service" => Ok(Self::ClusterService),
            "edge-device" => Ok(Self::EdgeDevice),
            other => Err(format!("unknown target kind: {other}")),
        }
    }
}

/// Classified health status of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
    Critical,
    Unknown,
}

impl HealthState {
    pub fn as_str(self) -> &'static str {
        match self {
            HealthState::Healthy => "healthy",
            HealthState::Degraded => "degraded",
            HealthState::Critical => "critical",
            HealthState::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Deployment request / pipeline run ──────────────────────────────

/// A request to push a version through the pipeline. Immutable once
/// accepted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeploymentRequest {
    pub environment: String,
    pub image_tag: String,
    pub requested_by: String,
    pub dry_run: bool,
    pub created_at: u64,
}

/// Pipeline stages in their fixed execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Build,
    Test,
    SecurityScan,
    Push,
    DeployStaging,
    Approval,
    DeployProduction,
    Canary,
    Promote,
}

impl Stage {
    /// The fixed stage order.
    pub const ORDER: [Stage; 9] = [
        Stage::Build,
        Stage::Test,
        Stage::SecurityScan,
        Stage::Push,
        Stage::DeployStaging,
        Stage::Approval,
        Stage::DeployProduction,
        Stage::Canary,
        Stage::Promote,
    ];

    /// The stage after this one, or None for the last.
    pub fn next(self) -> Option<Stage> {
        let idx = Self::ORDER.iter().position(|s| *s == self)?;
        Self::ORDER.get(idx + 1).copied()
    }

    /// Failures before production abort the run without touching the
    /// Rollback Engine or the dispatcher.
    pub fn aborts_without_rollback(self) -> bool {
        self < Stage::DeployProduction
    }

    /// Idempotent non-production stages may be retried a small fixed
    /// number of times; nothing at or after DeployProduction is.
    pub fn retryable(self) -> bool {
        matches!(
            self,
            Stage::Build | Stage::Test | Stage::SecurityScan | Stage::Push | Stage::DeployStaging
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Build => "build",
            Stage::Test => "test",
            Stage::SecurityScan => "security_scan",
            Stage::Push => "push",
            Stage::DeployStaging => "deploy_staging",
            Stage::Approval => "approval",
            Stage::DeployProduction => "deploy_production",
            Stage::Canary => "canary",
            Stage::Promote => "promote",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one stage attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StageOutcome {
    Passed,
    Failed { error: String },
}

/// One entry in a run's stage history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageRecord {
    pub stage: Stage,
    pub outcome: StageOutcome,
    pub started_at: u64,
    pub ended_at: u64,
}

/// Terminal outcome of a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Reached only after Promote.
    Succeeded,
    /// Production failure handled by rollback; `partial` when some
    /// affected targets could not be reverted.
    RolledBack { partial: bool },
    /// Pre-production failure, approval rejection, or timeout. No
    /// production target was touched.
    Aborted { reason: String },
}

/// A deployment request being driven through the stages. Created when a
/// request is accepted, mutated only by the pipeline controller, and
/// retained after completion for audit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineRun {
    pub id: RunId,
    pub request: DeploymentRequest,
    /// Stage currently executing; None once the run is terminal.
    pub stage: Option<Stage>,
    pub history: Vec<StageRecord>,
    pub outcome: Option<RunOutcome>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl PipelineRun {
    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }

    /// Stages in history order, for prefix-invariant checks.
    pub fn history_stages(&self) -> Vec<Stage> {
        self.history.iter().map(|r| r.stage).collect()
    }
}

// ── Rollback audit ─────────────────────────────────────────────────

/// Outcome of one rollback attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RollbackOutcome {
    /// The target was reverted to last-known-good.
    Applied,
    /// The target was already at last-known-good; recorded for audit,
    /// no change issued.
    NoOp,
    /// The underlying execution step failed. Fatal; escalates on-call.
    Failed { error: String },
}

/// Append-only audit record of a rollback attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RollbackRecord {
    /// Store-assigned id `{environment}/{target_id}:{seq}`.
    pub id: String,
    pub environment: String,
    pub target_id: TargetId,
    pub from_version: String,
    pub to_version: String,
    pub reason: String,
    pub outcome: RollbackOutcome,
    pub at: u64,
}

// ── Escalation ─────────────────────────────────────────────────────

/// Operator response tiers, strictly ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationTier {
    Automated,
    OnCall,
    Senior,
}

impl EscalationTier {
    pub fn as_str(self) -> &'static str {
        match self {
            EscalationTier::Automated => "automated",
            EscalationTier::OnCall => "on_call",
            EscalationTier::Senior => "senior",
        }
    }
}

impl std::fmt::Display for EscalationTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What opened an incident.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EscalationTrigger {
    /// A target transitioned to Critical.
    HealthCritical { target_id: TargetId },
    /// A pipeline run failed at or after production.
    PipelineFailure { run_id: RunId, stage: Stage },
    /// A rollback could not be applied. Enters directly at on-call.
    RollbackFailure { target_id: TargetId },
}

impl EscalationTrigger {
    /// The key an incident is deduplicated on: the target id for health
    /// and rollback triggers, the run id for pipeline failures.
    pub fn subject(&self) -> &str {
        match self {
            EscalationTrigger::HealthCritical { target_id } => target_id,
            EscalationTrigger::PipelineFailure { run_id, .. } => run_id,
            EscalationTrigger::RollbackFailure { target_id } => target_id,
        }
    }

    pub fn reason(&self) -> String {
        match self {
            EscalationTrigger::HealthCritical { target_id } => {
                format!("target {target_id} reported critical")
            }
            EscalationTrigger::PipelineFailure { run_id, stage } => {
                format!("run {run_id} failed at stage {stage}")
            }
            EscalationTrigger::RollbackFailure { target_id } => {
                format!("rollback failed for target {target_id}")
            }
        }
    }
}

/// An open or resolved incident. Records advance forward (tier, then
/// resolution) and are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EscalationEvent {
    pub id: IncidentId,
    pub trigger: EscalationTrigger,
    /// Dedup key; see [`EscalationTrigger::subject`].
    pub subject: String,
    pub tier: EscalationTier,
    pub opened_at: u64,
    pub tier_entered_at: u64,
    pub resolved_at: Option<u64>,
}

impl EscalationEvent {
    pub fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }
}

// ── Health reports ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceCheck {
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadCheck {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GpuCheck {
    Present,
    Absent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeSyncCheck {
    Sync,
    Unsynced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TunnelCheck {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerCheck {
    Reachable,
    Unreachable,
}

/// A raw per-target health report as emitted by the target itself.
///
/// `service`, `workload`, and `disk_usage` are always reported; the
/// remaining checks are optional because they do not apply to every
/// target kind (a cluster replica set has no tunnel or GPU). An absent
/// optional check is skipped by classification; an absent *report* is
/// what fails closed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthReport {
    pub target_id: TargetId,
    /// Unix timestamp the target produced the report.
    pub at: u64,
    pub service: ServiceCheck,
    pub workload: WorkloadCheck,
    /// Disk usage percentage, 0-100.
    pub disk_usage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<GpuCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_sync: Option<TimeSyncCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tunnel: Option<TunnelCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_reachable: Option<PeerCheck>,
}

// ── Keys ───────────────────────────────────────────────────────────

impl Target {
    /// Build the composite key for the targets table.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.environment, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_order_is_fixed() {
        assert_eq!(Stage::Build.next(), Some(Stage::Test));
        assert_eq!(Stage::Canary.next(), Some(Stage::Promote));
        assert_eq!(Stage::Promote.next(), None);
    }

    #[test]
    fn pre_production_stages_abort_without_rollback() {
        assert!(Stage::Build.aborts_without_rollback());
        assert!(Stage::DeployStaging.aborts_without_rollback());
        assert!(Stage::Approval.aborts_without_rollback());
        assert!(!Stage::DeployProduction.aborts_without_rollback());
        assert!(!Stage::Canary.aborts_without_rollback());
        assert!(!Stage::Promote.aborts_without_rollback());
    }

    #[test]
    fn production_stages_never_retry() {
        assert!(Stage::Build.retryable());
        assert!(Stage::Push.retryable());
        assert!(!Stage::Approval.retryable());
        assert!(!Stage::DeployProduction.retryable());
        assert!(!Stage::Canary.retryable());
    }

    #[test]
    fn tiers_are_strictly_ordered() {
        assert!(EscalationTier::Automated < EscalationTier::OnCall);
        assert!(EscalationTier::OnCall < EscalationTier::Senior);
    }

    #[test]
    fn report_parses_wire_shape() {
        // The exact flat shape targets emit.
        let raw = r#"{
            "target_id": "edge-07",
            "at": 1000,
            "service": "running",
            "workload": "healthy",
            "gpu": "present",
            "disk_usage": 42.5,
            "time_sync": "sync",
            "tunnel": "up",
            "peer_reachable": "reachable"
        }"#;
        let report: HealthReport = serde_json::from_str(raw).unwrap();
        assert_eq!(report.service, ServiceCheck::Running);
        assert_eq!(report.tunnel, Some(TunnelCheck::Up));
        assert_eq!(report.disk_usage, 42.5);
    }

    #[test]
    fn report_without_edge_checks_parses() {
        // Cluster services report no gpu/tunnel/peer fields.
        let raw = r#"{
            "target_id": "svc-api-0",
            "at": 1000,
            "service": "running",
            "workload": "unhealthy",
            "disk_usage": 10.0
        }"#;
        let report: HealthReport = serde_json::from_str(raw).unwrap();
        assert_eq!(report.workload, WorkloadCheck::Unhealthy);
        assert!(report.tunnel.is_none());
        assert!(report.gpu.is_none());
    }

    #[test]
    fn trigger_subject_keys() {
        let t = EscalationTrigger::HealthCritical {
            target_id: "edge-07".to_string(),
        };
        assert_eq!(t.subject(), "edge-07");

        let t = EscalationTrigger::PipelineFailure {
            run_id: "staging/000001".to_string(),
            stage: Stage::Canary,
        };
        assert_eq!(t.subject(), "staging/000001");
    }

    #[test]
    fn target_kind_round_trips() {
        let kind: TargetKind = "edge-device".parse().unwrap();
        assert_eq!(kind, TargetKind::EdgeDevice);
        assert_eq!(
            serde_json::to_string(&TargetKind::ClusterService).unwrap(),
            "\"cluster-service\""
        );
        assert!("vm".parse::<TargetKind>().is_err());
    }
}
