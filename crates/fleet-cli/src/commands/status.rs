//! `fleet status` — current target and run snapshot.
//!
//! Always reads the store directly so an operator polling during an
//! incident sees tier escalation and rollback progress live, never a
//! cached view.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use fleetgrid_state::{EscalationEvent, HealthState, PipelineRun, RunOutcome, Target};

pub async fn run(
    config_path: &Path,
    data_dir: Option<PathBuf>,
    environment: &str,
    format: &str,
) -> anyhow::Result<ExitCode> {
    let app = super::open(config_path, data_dir)?;

    let targets = app.state.list_targets(environment)?;
    if targets.is_empty() {
        eprintln!("fleet: unknown or empty environment: {environment}");
        return Ok(ExitCode::from(1));
    }
    let latest_run = app.state.latest_run(environment)?;
    let run_prefix = format!("{environment}/");
    let incidents: Vec<EscalationEvent> = app
        .state
        .list_open_escalations()?
        .into_iter()
        .filter(|e| {
            e.subject.starts_with(&run_prefix) || targets.iter().any(|t| t.id == e.subject)
        })
        .collect();

    match format {
        "json" => {
            let snapshot = serde_json::json!({
                "environment": environment,
                "targets": targets,
                "latest_run": latest_run,
                "open_incidents": incidents,
            });
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        _ => print_text(environment, &targets, latest_run.as_ref(), &incidents),
    }

    Ok(ExitCode::from(health_exit_code(&targets)))
}

fn print_text(
    environment: &str,
    targets: &[Target],
    latest_run: Option<&PipelineRun>,
    incidents: &[EscalationEvent],
) {
    println!("environment: {environment}");
    println!(
        "{:<16} {:<16} {:<14} {:<14} {}",
        "TARGET", "KIND", "VERSION", "KNOWN-GOOD", "HEALTH"
    );
    for target in targets {
        println!(
            "{:<16} {:<16} {:<14} {:<14} {}",
            target.id,
            target.kind,
            target.version,
            target.last_known_good.as_deref().unwrap_or("-"),
            target.health,
        );
    }

    if let Some(run) = latest_run {
        let outcome = match &run.outcome {
            Some(RunOutcome::Succeeded) => "succeeded".to_string(),
            Some(RunOutcome::RolledBack { partial: true }) => "rolled back (partial)".to_string(),
            Some(RunOutcome::RolledBack { partial: false }) => "rolled back".to_string(),
            Some(RunOutcome::Aborted { reason }) => format!("aborted: {reason}"),
            None => match run.stage {
                Some(stage) => format!("in progress at {stage}"),
                None => "in progress".to_string(),
            },
        };
        println!();
        println!(
            "latest run {} ({}): {outcome}",
            run.id, run.request.image_tag
        );
    }

    for incident in incidents {
        println!(
            "open incident {}: {} at tier {}",
            incident.id, incident.subject, incident.tier
        );
    }
}

/// Exit code from the worst health in the fleet: 0 healthy, 1 degraded
/// or not yet evaluated, 2 critical.
fn health_exit_code(targets: &[Target]) -> u8 {
    targets
        .iter()
        .map(|t| match t.health {
            HealthState::Critical => 2,
            HealthState::Degraded | HealthState::Unknown => 1,
            HealthState::Healthy => 0,
        })
        .max()
        .unwrap_or(0)
}
