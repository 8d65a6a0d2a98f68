//! fleet.toml configuration parser.
//!
//! One file describes the whole deployment: rollout policy (canary quota,
//! bake window), health classification thresholds, escalation windows, and
//! the per-environment target fleets. Durations are human-readable strings
//! ("10s", "5m") parsed with [`parse_duration`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level fleet.toml model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Data directory for the persistent state store.
    pub data_dir: Option<PathBuf>,
    /// Spool directory where targets drop health report JSON files.
    pub reports_dir: Option<PathBuf>,
    pub health: HealthPolicy,
    pub canary: CanaryPolicy,
    pub escalation: EscalationPolicy,
    pub pipeline: PipelinePolicy,
    /// Environment name → fleet definition.
    pub environments: HashMap<String, EnvironmentConfig>,
}

/// Health evaluation policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthPolicy {
    /// Poll interval per target (e.g. "10s").
    pub interval: String,
    /// Grace period without a report before a target is treated as
    /// Critical (fail-closed).
    pub grace: String,
    /// Disk usage percentage at or above which a target is Degraded.
    pub disk_usage_threshold: f64,
    /// Number of recent reports retained per target.
    pub report_window: usize,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            interval: "10s".to_string(),
            grace: "45s".to_string(),
            disk_usage_threshold: 90.0,
            report_window: 5,
        }
    }
}

/// Canary selection and bake policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CanaryPolicy {
    /// Absolute cap on canary group size.
    pub max_targets: u32,
    /// Percentage cap on canary group size (0-100).
    pub max_percent: u32,
    /// Bake observation window (e.g. "5m").
    pub bake: String,
    /// Whether a Degraded report fails the bake. Default: only Critical
    /// fails; Degraded logs a warning.
    pub degraded_fails_bake: bool,
}

impl Default for CanaryPolicy {
    fn default() -> Self {
        Self {
            max_targets: 1,
            max_percent: 25,
            bake: "5m".to_string(),
            degraded_fails_bake: false,
        }
    }
}

/// Escalation tier advancement policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationPolicy {
    /// Wait after automated remediation before advancing to on-call.
    pub automated_wait: String,
    /// SLA window from incident open (customer-impact clock) before
    /// advancing to senior.
    pub sla: String,
    /// Number of incidents within `burst_window` that collapses
    /// notifications into a single aggregate notice.
    pub burst_threshold: usize,
    pub burst_window: String,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            automated_wait: "2m".to_string(),
            sla: "15m".to_string(),
            burst_threshold: 5,
            burst_window: "60s".to_string(),
        }
    }
}

/// Pipeline stage policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelinePolicy {
    /// Retries for idempotent pre-production stages.
    pub stage_retries: u32,
    /// How long the Approval stage waits for a human decision before
    /// aborting the run as if rejected.
    pub approval_timeout: String,
}

impl Default for PipelinePolicy {
    fn default() -> Self {
        Self {
            stage_retries: 2,
            approval_timeout: "30m".to_string(),
        }
    }
}

/// One environment's fleet definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Skip the human approval gate for this environment.
    pub auto_approve: bool,
    pub targets: Vec<TargetSeed>,
}

/// A target as declared in fleet.toml, seeded into the state store on
/// first contact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSeed {
    pub id: String,
    /// "cluster-service" or "edge-device".
    pub kind: String,
    /// Relative traffic share, used to pick the least impactful canaries.
    pub traffic_share: Option<f64>,
}

impl FleetConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: FleetConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Targets declared for an environment, empty if unknown.
    pub fn targets_for(&self, environment: &str) -> &[TargetSeed] {
        self.environments
            .get(environment)
            .map(|env| env.targets.as_slice())
            .unwrap_or(&[])
    }
}

/// Parse a duration string like "5s", "500ms", "2m", "1h".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else if let Some(hours) = s.strip_suffix('h') {
        hours
            .parse::<u64>()
            .ok()
            .map(|h| Duration::from_secs(h * 3600))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("10"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("nope"), None);
    }

    #[test]
    fn defaults_are_sane() {
        let config = FleetConfig::default();
        assert_eq!(config.canary.max_targets, 1);
        assert!(!config.canary.degraded_fails_bake);
        assert_eq!(config.health.disk_usage_threshold, 90.0);
        assert_eq!(config.pipeline.stage_retries, 2);
    }

    #[test]
    fn parses_full_config() {
        let toml = r#"
            data_dir = "/var/lib/fleetgrid"
            reports_dir = "/var/spool/fleetgrid"

            [health]
            interval = "5s"
            grace = "30s"
            disk_usage_threshold = 85.0

            [canary]
            max_targets = 2
            max_percent = 20
            bake = "10m"

            [escalation]
            automated_wait = "90s"
            sla = "20m"

            [environments.staging]
            auto_approve = true

            [[environments.staging.targets]]
            id = "svc-api-0"
            kind = "cluster-service"
            traffic_share = 0.5

            [[environments.staging.targets]]
            id = "edge-07"
            kind = "edge-device"
        "#;

        let config: FleetConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.canary.max_targets, 2);
        assert_eq!(config.health.grace, "30s");
        assert!(config.environments["staging"].auto_approve);

        let targets = config.targets_for("staging");
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].traffic_share, Some(0.5));
        assert_eq!(targets[1].kind, "edge-device");

        assert!(config.targets_for("unknown").is_empty());
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: FleetConfig = toml::from_str("[canary]\nmax_targets = 3\n").unwrap();
        assert_eq!(config.canary.max_targets, 3);
        // Unset sections fall back to defaults.
        assert_eq!(config.canary.max_percent, 25);
        assert_eq!(config.escalation.burst_threshold, 5);
    }
}
