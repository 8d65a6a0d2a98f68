use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod collab;
mod commands;

#[derive(Parser)]
#[command(
    name = "fleet",
    about = "FleetGrid — deployment rollout and fleet health orchestrator",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Path to fleet.toml.
    #[arg(long, global = true, default_value = "fleet.toml")]
    config: PathBuf,

    /// Override the data directory from the config.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Push an image tag through the deployment pipeline.
    ///
    /// Creates a pipeline run, gates production on the canary bake, and
    /// exits with the run's terminal outcome: 0 succeeded, 1 aborted,
    /// 2 rolled back.
    Deploy {
        #[arg(long)]
        environment: String,
        #[arg(long)]
        image_tag: String,
        /// Execute every stage's decision logic without switching any
        /// versions.
        #[arg(long)]
        dry_run: bool,
        /// Recorded on the run; defaults to $USER.
        #[arg(long)]
        requested_by: Option<String>,
    },
    /// Revert targets to their last-known-good version, bypassing the
    /// pipeline.
    Rollback {
        #[arg(long)]
        environment: String,
        /// A single target; the whole fleet when omitted.
        #[arg(long)]
        target: Option<String>,
    },
    /// Show the current target and run snapshot for an environment.
    Status {
        #[arg(long)]
        environment: String,
        /// Output format: text or json.
        #[arg(long, default_value = "text")]
        format: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,fleet=debug,fleetgrid=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Deploy {
            environment,
            image_tag,
            dry_run,
            requested_by,
        } => {
            commands::deploy::run(
                &cli.config,
                cli.data_dir,
                &environment,
                &image_tag,
                dry_run,
                requested_by,
            )
            .await
        }
        Commands::Rollback {
            environment,
            target,
        } => commands::rollback::run(&cli.config, cli.data_dir, &environment, target.as_deref()).await,
        Commands::Status {
            environment,
            format,
        } => commands::status::run(&cli.config, cli.data_dir, &environment, &format).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("fleet: {e:#}");
            ExitCode::from(2)
        }
    }
}
