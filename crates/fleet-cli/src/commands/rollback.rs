//! `fleet rollback` — direct rollback invocation, bypassing the pipeline.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use fleet_core::logging_applier;
use fleetgrid_escalate::{EscalationDispatcher, logging_notifier};
use fleetgrid_rollback::{RollbackEngine, RollbackError};
use fleetgrid_state::{RollbackOutcome, StateError};

pub async fn run(
    config_path: &Path,
    data_dir: Option<PathBuf>,
    environment: &str,
    target: Option<&str>,
) -> anyhow::Result<ExitCode> {
    let app = super::open(config_path, data_dir)?;

    let dispatcher = Arc::new(EscalationDispatcher::new(
        app.state.clone(),
        &app.config.escalation,
        logging_notifier(),
    ));
    let engine = RollbackEngine::new(app.state.clone(), logging_applier(), dispatcher);
    let now = super::epoch_secs();

    match target {
        Some(target_id) => {
            match engine
                .rollback(environment, target_id, "manual rollback", now)
                .await
            {
                Ok(record) => {
                    match record.outcome {
                        RollbackOutcome::NoOp => println!(
                            "{target_id}: already at last-known-good {}",
                            record.to_version
                        ),
                        _ => println!("{target_id}: rolled back to {}", record.to_version),
                    }
                    Ok(ExitCode::SUCCESS)
                }
                Err(RollbackError::NoKnownGood(id)) => {
                    eprintln!("fleet: no last-known-good version recorded for {id}");
                    Ok(ExitCode::from(1))
                }
                Err(RollbackError::State(StateError::NotFound(what))) => {
                    eprintln!("fleet: {what} not found");
                    Ok(ExitCode::from(1))
                }
                Err(e @ RollbackError::ApplyFailed { .. }) => {
                    eprintln!("fleet: {e}");
                    Ok(ExitCode::from(2))
                }
                Err(e) => Err(e.into()),
            }
        }
        None => {
            let ids: Vec<String> = app
                .state
                .list_targets(environment)?
                .into_iter()
                .map(|t| t.id)
                .collect();
            if ids.is_empty() {
                eprintln!("fleet: unknown or empty environment: {environment}");
                return Ok(ExitCode::from(1));
            }

            let report = engine
                .rollback_fleet(environment, &ids, "manual rollback", now)
                .await;
            for record in &report.records {
                match record.outcome {
                    RollbackOutcome::NoOp => println!(
                        "{}: already at last-known-good {}",
                        record.target_id, record.to_version
                    ),
                    _ => println!("{}: rolled back to {}", record.target_id, record.to_version),
                }
            }
            if report.complete() {
                println!("{environment}: fleet at last-known-good");
                Ok(ExitCode::SUCCESS)
            } else {
                for (target_id, error) in &report.failures {
                    eprintln!("fleet: {target_id}: {error}");
                }
                Ok(ExitCode::from(2))
            }
        }
    }
}
