//! Health report classification.
//!
//! A target is Healthy iff all checks pass; Degraded iff a non-critical
//! check fails while the core checks pass; Critical iff any core check
//! fails (service process down, workload unhealthy, required tunnel
//! down). Deterministic given the check set, no averaging.

use fleetgrid_state::{
    GpuCheck, HealthReport, HealthState, PeerCheck, ServiceCheck, TimeSyncCheck, TunnelCheck,
    WorkloadCheck,
};

/// Thresholds for the non-boolean checks.
#[derive(Debug, Clone)]
pub struct CheckPolicy {
    /// Disk usage percentage at or above which a target is Degraded.
    pub disk_usage_threshold: f64,
}

impl Default for CheckPolicy {
    fn default() -> Self {
        Self {
            disk_usage_threshold: 90.0,
        }
    }
}

/// Classify a report into a health status.
pub fn classify(report: &HealthReport, policy: &CheckPolicy) -> HealthState {
    if core_check_failed(report) {
        HealthState::Critical
    } else if degraded_check_failed(report, policy) {
        HealthState::Degraded
    } else {
        HealthState::Healthy
    }
}

/// Names of the checks that failed, for diagnostics and incident reasons.
pub fn failed_checks(report: &HealthReport, policy: &CheckPolicy) -> Vec<&'static str> {
    let mut failed = Vec::new();
    if report.service == ServiceCheck::Stopped {
        failed.push("service");
    }
    if report.workload == WorkloadCheck::Unhealthy {
        failed.push("workload");
    }
    if report.tunnel == Some(TunnelCheck::Down) {
        failed.push("tunnel");
    }
    if report.disk_usage >= policy.disk_usage_threshold {
        failed.push("disk_usage");
    }
    if report.time_sync == Some(TimeSyncCheck::Unsynced) {
        failed.push("time_sync");
    }
    if report.gpu == Some(GpuCheck::Absent) {
        failed.push("gpu");
    }
    if report.peer_reachable == Some(PeerCheck::Unreachable) {
        failed.push("peer_reachable");
    }
    failed
}

/// Core checks: a failure here is Critical on its own.
fn core_check_failed(report: &HealthReport) -> bool {
    report.service == ServiceCheck::Stopped
        || report.workload == WorkloadCheck::Unhealthy
        || report.tunnel == Some(TunnelCheck::Down)
}

/// Non-critical checks: a failure here degrades but does not page.
fn degraded_check_failed(report: &HealthReport, policy: &CheckPolicy) -> bool {
    report.disk_usage >= policy.disk_usage_threshold
        || report.time_sync == Some(TimeSyncCheck::Unsynced)
        || report.gpu == Some(GpuCheck::Absent)
        || report.peer_reachable == Some(PeerCheck::Unreachable)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy_report() -> HealthReport {
        HealthReport {
            target_id: "edge-07".to_string(),
            at: 1000,
            service: ServiceCheck::Running,
            workload: WorkloadCheck::Healthy,
            disk_usage: 40.0,
            gpu: Some(GpuCheck::Present),
            time_sync: Some(TimeSyncCheck::Sync),
            tunnel: Some(TunnelCheck::Up),
            peer_reachable: Some(PeerCheck::Reachable),
        }
    }

    #[test]
    fn all_checks_passing_is_healthy() {
        let status = classify(&healthy_report(), &CheckPolicy::default());
        assert_eq!(status, HealthState::Healthy);
        assert!(failed_checks(&healthy_report(), &CheckPolicy::default()).is_empty());
    }

    #[test]
    fn stopped_service_is_critical() {
        let report = HealthReport {
            service: ServiceCheck::Stopped,
            ..healthy_report()
        };
        assert_eq!(classify(&report, &CheckPolicy::default()), HealthState::Critical);
    }

    #[test]
    fn unhealthy_workload_is_critical() {
        let report = HealthReport {
            workload: WorkloadCheck::Unhealthy,
            ..healthy_report()
        };
        assert_eq!(classify(&report, &CheckPolicy::default()), HealthState::Critical);
    }

    #[test]
    fn tunnel_down_is_critical() {
        let report = HealthReport {
            tunnel: Some(TunnelCheck::Down),
            ..healthy_report()
        };
        assert_eq!(classify(&report, &CheckPolicy::default()), HealthState::Critical);
    }

    #[test]
    fn disk_over_threshold_is_degraded() {
        let report = HealthReport {
            disk_usage: 95.0,
            ..healthy_report()
        };
        assert_eq!(classify(&report, &CheckPolicy::default()), HealthState::Degraded);
        assert_eq!(
            failed_checks(&report, &CheckPolicy::default()),
            vec!["disk_usage"]
        );
    }

    #[test]
    fn disk_threshold_is_configurable() {
        let report = HealthReport {
            disk_usage: 75.0,
            ..healthy_report()
        };
        let strict = CheckPolicy {
            disk_usage_threshold: 70.0,
        };
        assert_eq!(classify(&report, &strict), HealthState::Degraded);
        assert_eq!(classify(&report, &CheckPolicy::default()), HealthState::Healthy);
    }

    #[test]
    fn lost_time_sync_is_degraded() {
        let report = HealthReport {
            time_sync: Some(TimeSyncCheck::Unsynced),
            ..healthy_report()
        };
        assert_eq!(classify(&report, &CheckPolicy::default()), HealthState::Degraded);
    }

    #[test]
    fn absent_gpu_is_degraded() {
        let report = HealthReport {
            gpu: Some(GpuCheck::Absent),
            ..healthy_report()
        };
        assert_eq!(classify(&report, &CheckPolicy::default()), HealthState::Degraded);
    }

    #[test]
    fn unreachable_peer_is_degraded() {
        let report = HealthReport {
            peer_reachable: Some(PeerCheck::Unreachable),
            ..healthy_report()
        };
        assert_eq!(classify(&report, &CheckPolicy::default()), HealthState::Degraded);
    }

    #[test]
    fn critical_wins_over_degraded() {
        // No partial credit: one core failure classifies Critical even
        // with every non-critical check also failing.
        let report = HealthReport {
            service: ServiceCheck::Stopped,
            disk_usage: 99.0,
            time_sync: Some(TimeSyncCheck::Unsynced),
            ..healthy_report()
        };
        assert_eq!(classify(&report, &CheckPolicy::default()), HealthState::Critical);
    }

    #[test]
    fn absent_optional_checks_are_skipped() {
        // A cluster service reports no gpu/tunnel/peer checks at all.
        let report = HealthReport {
            gpu: None,
            time_sync: None,
            tunnel: None,
            peer_reachable: None,
            ..healthy_report()
        };
        assert_eq!(classify(&report, &CheckPolicy::default()), HealthState::Healthy);
    }
}
