//! fleet subcommands.

pub mod deploy;
pub mod rollback;
pub mod status;

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::info;

use fleet_core::FleetConfig;
use fleetgrid_state::{HealthState, StateStore, Target};

/// Shared command context: parsed config, opened store, seeded fleet.
pub(crate) struct App {
    pub config: FleetConfig,
    pub state: StateStore,
    pub reports_dir: PathBuf,
}

pub(crate) fn open(config_path: &Path, data_dir_override: Option<PathBuf>) -> anyhow::Result<App> {
    let config = FleetConfig::from_file(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;

    let data_dir = data_dir_override
        .or_else(|| config.data_dir.clone())
        .unwrap_or_else(|| PathBuf::from("./fleetgrid-data"));
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;

    let state = StateStore::open(&data_dir.join("fleetgrid.redb"))?;
    let reports_dir = config
        .reports_dir
        .clone()
        .unwrap_or_else(|| data_dir.join("reports"));

    seed_targets(&config, &state)?;
    Ok(App {
        config,
        state,
        reports_dir,
    })
}

/// Register configured targets that the store has not seen yet. Known
/// targets keep their recorded version, health, and history.
fn seed_targets(config: &FleetConfig, state: &StateStore) -> anyhow::Result<()> {
    for (environment, env) in &config.environments {
        for seed in &env.targets {
            if state.get_target(environment, &seed.id)?.is_some() {
                continue;
            }
            let kind = seed
                .kind
                .parse()
                .map_err(|e: String| anyhow::anyhow!("target {}: {e}", seed.id))?;
            state.put_target(&Target {
                id: seed.id.clone(),
                environment: environment.clone(),
                kind,
                version: "unknown".to_string(),
                last_known_good: None,
                health: HealthState::Unknown,
                traffic_share: seed.traffic_share,
                updated_at: epoch_secs(),
            })?;
            info!(%environment, target_id = %seed.id, "target registered");
        }
    }
    Ok(())
}

pub(crate) fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path) -> PathBuf {
        let path = dir.join("fleet.toml");
        std::fs::write(
            &path,
            format!(
                r#"
                data_dir = "{}"

                [environments.staging]
                auto_approve = true

                [[environments.staging.targets]]
                id = "edge-07"
                kind = "edge-device"
                traffic_share = 0.1

                [[environments.staging.targets]]
                id = "svc-api-0"
                kind = "cluster-service"
                "#,
                dir.join("data").display()
            ),
        )
        .unwrap();
        path
    }

    #[test]
    fn open_seeds_configured_targets_once() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = write_config(dir.path());

        let app = open(&config_path, None).unwrap();
        let targets = app.state.list_targets("staging").unwrap();
        assert_eq!(targets.len(), 2);

        let edge = app.state.get_target("staging", "edge-07").unwrap().unwrap();
        assert_eq!(edge.version, "unknown");
        assert_eq!(edge.last_known_good, None);
        assert_eq!(edge.traffic_share, Some(0.1));
        drop(app);

        // Reopening keeps recorded state instead of reseeding.
        let app = open(&config_path, None).unwrap();
        app.state
            .update_version("staging", "edge-07", "v3", true, 2000)
            .unwrap();
        drop(app);

        let app = open(&config_path, None).unwrap();
        let edge = app.state.get_target("staging", "edge-07").unwrap().unwrap();
        assert_eq!(edge.version, "v3");
    }

    #[test]
    fn open_rejects_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        assert!(open(&dir.path().join("absent.toml"), None).is_err());
    }
}
