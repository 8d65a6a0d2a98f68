//! `fleet deploy` — run the pipeline for an environment.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use fleet_core::logging_applier;
use fleetgrid_escalate::{EscalationDispatcher, logging_notifier};
use fleetgrid_health::HealthMonitor;
use fleetgrid_pipeline::{PipelineController, PipelineError};
use fleetgrid_rollback::RollbackEngine;
use fleetgrid_state::{DeploymentRequest, RunOutcome};

use crate::collab;

pub async fn run(
    config_path: &Path,
    data_dir: Option<PathBuf>,
    environment: &str,
    image_tag: &str,
    dry_run: bool,
    requested_by: Option<String>,
) -> anyhow::Result<ExitCode> {
    let app = super::open(config_path, data_dir)?;

    let monitor = HealthMonitor::new(
        app.state.clone(),
        app.config.health.clone(),
        collab::spool_report_source(app.reports_dir.clone()),
    );
    let dispatcher = Arc::new(
        EscalationDispatcher::new(app.state.clone(), &app.config.escalation, logging_notifier())
            .with_remediation(collab::remediator()),
    );
    let rollback = RollbackEngine::new(app.state.clone(), logging_applier(), dispatcher.clone());
    let controller = PipelineController::new(
        app.state.clone(),
        app.config.clone(),
        collab::stage_runner(),
        logging_applier(),
        rollback,
        dispatcher.clone(),
        monitor.transition_sender(),
    );

    // Health evaluation and escalation run continuously alongside the
    // pipeline, not driven by it.
    for target in app.state.list_targets(environment)? {
        monitor.start_monitor(environment, &target.id).await;
    }
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let dispatcher_task = {
        let dispatcher = dispatcher.clone();
        let transitions = monitor.subscribe();
        tokio::spawn(async move {
            dispatcher
                .run(transitions, Duration::from_secs(5), shutdown_rx)
                .await;
        })
    };

    let requested_by = requested_by
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "unknown".to_string());
    let request = DeploymentRequest {
        environment: environment.to_string(),
        image_tag: image_tag.to_string(),
        requested_by,
        dry_run,
        created_at: super::epoch_secs(),
    };

    let result = controller.run(request).await;

    let _ = shutdown_tx.send(true);
    monitor.stop_all().await;
    let _ = dispatcher_task.await;

    match result {
        Ok(run) => match run.outcome {
            Some(RunOutcome::Succeeded) => {
                println!("run {}: succeeded", run.id);
                Ok(ExitCode::SUCCESS)
            }
            Some(RunOutcome::Aborted { reason }) => {
                println!("run {}: aborted: {reason}", run.id);
                Ok(ExitCode::from(1))
            }
            Some(RunOutcome::RolledBack { partial }) => {
                if partial {
                    println!("run {}: rolled back (partial; see open incidents)", run.id);
                } else {
                    println!("run {}: rolled back", run.id);
                }
                Ok(ExitCode::from(2))
            }
            None => {
                // The controller always terminates a returned run.
                println!("run {}: no terminal outcome recorded", run.id);
                Ok(ExitCode::from(2))
            }
        },
        Err(PipelineError::Validation(reason)) => {
            eprintln!("fleet: {reason}");
            Ok(ExitCode::from(1))
        }
        Err(e) => Err(e.into()),
    }
}
