//! Default collaborators wired by the CLI.
//!
//! These are the integration points for the external systems the
//! orchestrator deliberately does not own: the CI/CD machinery behind
//! the build/test/push stages, the executor that actually switches a
//! version on a target, and the pager transport. Each default records
//! the action in the structured log where a deployment would invoke the
//! real thing.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use fleetgrid_health::ReportFetchFn;
use fleetgrid_pipeline::StageFn;
use fleetgrid_state::HealthReport;

/// Stage runner: logs each external stage as it would be handed to the
/// CI/CD system (image build, test suite, scanner, registry push,
/// staging deploy).
pub fn stage_runner() -> StageFn {
    Arc::new(|stage, request| {
        Box::pin(async move {
            info!(
                %stage,
                environment = %request.environment,
                image_tag = %request.image_tag,
                dry_run = request.dry_run,
                "executing external stage"
            );
            Ok(())
        })
    })
}

/// Automated remediation: logs the restart request an executor would
/// perform for the affected target.
pub fn remediator() -> fleetgrid_escalate::RemediateFn {
    Arc::new(|subject| {
        Box::pin(async move {
            info!(%subject, "requesting automated service restart");
            Ok(())
        })
    })
}

/// Health report source reading the spool directory: each target drops
/// its latest report at `<reports_dir>/<target_id>.json`. A missing or
/// malformed file is no report at all; after the grace period the
/// evaluator fails closed.
pub fn spool_report_source(reports_dir: PathBuf) -> ReportFetchFn {
    Arc::new(move |target_id| {
        let path = reports_dir.join(format!("{target_id}.json"));
        Box::pin(async move {
            let raw = match tokio::fs::read(&path).await {
                Ok(raw) => raw,
                Err(e) => {
                    debug!(?path, error = %e, "no health report file");
                    return None;
                }
            };
            match serde_json::from_slice::<HealthReport>(&raw) {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!(?path, error = %e, "malformed health report; ignoring");
                    None
                }
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spool_source_reads_wire_reports() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("edge-07.json"),
            r#"{
                "target_id": "edge-07",
                "at": 1000,
                "service": "running",
                "workload": "healthy",
                "gpu": "present",
                "disk_usage": 55.0,
                "time_sync": "sync",
                "tunnel": "up",
                "peer_reachable": "reachable"
            }"#,
        )
        .unwrap();

        let fetch = spool_report_source(dir.path().to_path_buf());
        let report = fetch("edge-07".to_string()).await.unwrap();
        assert_eq!(report.target_id, "edge-07");
        assert_eq!(report.disk_usage, 55.0);

        // Missing and malformed files are both "no report".
        assert!(fetch("edge-99".to_string()).await.is_none());
        std::fs::write(dir.path().join("edge-08.json"), "not json").unwrap();
        assert!(fetch("edge-08".to_string()).await.is_none());
    }
}
