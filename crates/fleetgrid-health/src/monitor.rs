//! Health monitor — background evaluation loop per target.
//!
//! The `HealthMonitor` spawns one task per target that periodically pulls
//! a report through the injected fetch callback, classifies it, persists
//! report and status to the state store, and publishes edge-triggered
//! transitions on a broadcast channel. Polling is continuous and
//! independent of any pipeline run.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{RwLock, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use fleet_core::{BoxFuture, HealthPolicy, parse_duration};
use fleetgrid_state::{HealthReport, HealthState, StateStore};

use crate::classifier::{CheckPolicy, classify, failed_checks};

/// Fetches the most recent report for a target, `None` when the target
/// has not reported. How reports arrive (spool file, push queue, probe)
/// is the collaborator's business.
pub type ReportFetchFn =
    Arc<dyn Fn(String) -> BoxFuture<Option<HealthReport>> + Send + Sync>;

/// An edge-triggered status change for a single target.
#[derive(Debug, Clone)]
pub struct StatusTransition {
    pub environment: String,
    pub target_id: String,
    pub from: HealthState,
    pub to: HealthState,
    pub at: u64,
}

impl StatusTransition {
    pub fn is_critical(&self) -> bool {
        self.to == HealthState::Critical
    }

    pub fn is_healthy(&self) -> bool {
        self.to == HealthState::Healthy
    }
}

/// Per-target monitor state.
struct MonitorSlot {
    /// Handle to the background evaluation task.
    handle: JoinHandle<()>,
    /// Shutdown signal for this monitor.
    shutdown_tx: watch::Sender<bool>,
}

/// Manages the background evaluation loops for all monitored targets.
pub struct HealthMonitor {
    state: StateStore,
    policy: HealthPolicy,
    fetch: ReportFetchFn,
    transitions: broadcast::Sender<StatusTransition>,
    /// Active monitors: target_id → slot.
    monitors: Arc<RwLock<HashMap<String, MonitorSlot>>>,
}

impl HealthMonitor {
    pub fn new(state: StateStore, policy: HealthPolicy, fetch: ReportFetchFn) -> Self {
        let (transitions, _) = broadcast::channel(256);
        Self {
            state,
            policy,
            fetch,
            transitions,
            monitors: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Subscribe to status transitions. Every subscriber sees every
    /// transition published after the call.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusTransition> {
        self.transitions.subscribe()
    }

    /// A handle to the transition channel, for components that need to
    /// open their own subscriptions later (the pipeline subscribes per
    /// canary bake).
    pub fn transition_sender(&self) -> broadcast::Sender<StatusTransition> {
        self.transitions.clone()
    }

    /// Start monitoring a target. Replaces any existing monitor for the
    /// same target.
    pub async fn start_monitor(&self, environment: &str, target_id: &str) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let environment = environment.to_string();
        let target = target_id.to_string();
        let policy = self.policy.clone();
        let fetch = self.fetch.clone();
        let state = self.state.clone();
        let transitions = self.transitions.clone();

        let handle = tokio::spawn(async move {
            run_health_loop(
                &environment,
                &target,
                &policy,
                fetch,
                state,
                transitions,
                shutdown_rx,
            )
            .await;
        });

        let mut monitors = self.monitors.write().await;
        if let Some(old) = monitors.insert(
            target_id.to_string(),
            MonitorSlot {
                handle,
                shutdown_tx,
            },
        ) {
            // Stop the old monitor if one was running.
            let _ = old.shutdown_tx.send(true);
            old.handle.abort();
        }

        info!(%target_id, "health monitor started");
    }

    /// Stop monitoring a target.
    pub async fn stop_monitor(&self, target_id: &str) {
        let mut monitors = self.monitors.write().await;
        if let Some(slot) = monitors.remove(target_id) {
            let _ = slot.shutdown_tx.send(true);
            slot.handle.abort();
            info!(%target_id, "health monitor stopped");
        }
    }

    /// Stop all monitors (for graceful shutdown).
    pub async fn stop_all(&self) {
        let mut monitors = self.monitors.write().await;
        for (id, slot) in monitors.drain() {
            let _ = slot.shutdown_tx.send(true);
            slot.handle.abort();
            debug!(target_id = %id, "health monitor stopped");
        }
        info!("all health monitors stopped");
    }

    /// List target IDs with active monitors.
    pub async fn active_monitors(&self) -> Vec<String> {
        let monitors = self.monitors.read().await;
        monitors.keys().cloned().collect()
    }

    /// Check if a target has an active monitor.
    pub async fn is_monitoring(&self, target_id: &str) -> bool {
        let monitors = self.monitors.read().await;
        monitors.contains_key(target_id)
    }
}

/// The evaluation loop for a single target.
async fn run_health_loop(
    environment: &str,
    target_id: &str,
    policy: &HealthPolicy,
    fetch: ReportFetchFn,
    state: StateStore,
    transitions: broadcast::Sender<StatusTransition>,
    mut shutdown: watch::Receiver<bool>,
) {
    let interval = parse_duration(&policy.interval).unwrap_or(Duration::from_secs(10));
    let grace = parse_duration(&policy.grace).unwrap_or(Duration::from_secs(45));
    let checks = CheckPolicy {
        disk_usage_threshold: policy.disk_usage_threshold,
    };

    // The grace clock starts when monitoring starts; a target that never
    // reports at all still fails closed.
    let started = Instant::now();
    let mut last_seen: Option<Instant> = None;

    debug!(%target_id, interval = %policy.interval, grace = %policy.grace, "health loop starting");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let report = (fetch)(target_id.to_string()).await;
                let now = epoch_secs();

                let status = match report {
                    Some(report) => {
                        last_seen = Some(Instant::now());
                        let status = classify(&report, &checks);
                        if status != HealthState::Healthy {
                            debug!(
                                %target_id,
                                ?status,
                                failed = ?failed_checks(&report, &checks),
                                "target checks failing"
                            );
                        }
                        if let Err(e) = state.put_report(&report, policy.report_window) {
                            error!(%target_id, error = %e, "failed to store health report");
                        }
                        status
                    }
                    None => {
                        let silent_for = last_seen.map_or(started.elapsed(), |t| t.elapsed());
                        if silent_for < grace {
                            // Still within grace; keep the previous status.
                            continue;
                        }
                        // Fail-closed: no report within the grace period.
                        warn!(
                            %target_id,
                            silent_secs = silent_for.as_secs(),
                            "no health report within grace period, treating as critical"
                        );
                        HealthState::Critical
                    }
                };

                let previous = match state.update_health(environment, target_id, status, now) {
                    Ok(previous) => previous,
                    Err(e) => {
                        error!(%target_id, error = %e, "failed to update health status in store");
                        continue;
                    }
                };

                // Edge-triggered: only a change is worth reporting.
                if previous != status {
                    info!(%target_id, from = ?previous, to = ?status, "health status transition");
                    let _ = transitions.send(StatusTransition {
                        environment: environment.to_string(),
                        target_id: target_id.to_string(),
                        from: previous,
                        to: status,
                        at: now,
                    });
                }
            }
            _ = shutdown.changed() => {
                debug!(%target_id, "health loop shutting down");
                break;
            }
        }
    }
}

fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
