//! StateStore — redb-backed persistence for the fleet.
//!
//! Typed CRUD over targets, pipeline runs, rollback records, escalation
//! events, and health report windows. All values are JSON-serialized into
//! redb's `&[u8]` value columns. The store supports both on-disk and
//! in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Next zero-padded sequence for keys of the form `{prefix}{seq:06}`:
/// one past the highest existing sequence under the prefix. Works on any
/// open table, read or write.
macro_rules! next_seq {
    ($table:expr, $prefix:expr) => {{
        let mut max: Option<u64> = None;
        for entry in $table.iter().map_err(map_err!(Read))? {
            let (key, _) = entry.map_err(map_err!(Read))?;
            if let Some(rest) = key.value().strip_prefix($prefix) {
                if let Ok(seq) = rest.parse::<u64>() {
                    max = Some(max.map_or(seq, |m| m.max(seq)));
                }
            }
        }
        max.map_or(0u64, |m| m + 1)
    }};
}

/// Thread-safe fleet state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(TARGETS).map_err(map_err!(Table))?;
        txn.open_table(RUNS).map_err(map_err!(Table))?;
        txn.open_table(ROLLBACKS).map_err(map_err!(Table))?;
        txn.open_table(ESCALATIONS).map_err(map_err!(Table))?;
        txn.open_table(REPORTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Targets ────────────────────────────────────────────────────

    /// Insert or update a target.
    pub fn put_target(&self, target: &Target) -> StateResult<()> {
        let key = target.table_key();
        let value = serde_json::to_vec(target).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(TARGETS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, "target stored");
        Ok(())
    }

    /// Get a target by environment and id.
    pub fn get_target(&self, environment: &str, id: &str) -> StateResult<Option<Target>> {
        let key = format!("{environment}/{id}");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(TARGETS).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let target: Target =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(target))
            }
            None => Ok(None),
        }
    }

    /// Get a target, erroring when it does not exist.
    pub fn require_target(&self, environment: &str, id: &str) -> StateResult<Target> {
        self.get_target(environment, id)?
            .ok_or_else(|| StateError::NotFound(format!("target {environment}/{id}")))
    }

    /// List all targets in an environment.
    pub fn list_targets(&self, environment: &str) -> StateResult<Vec<Target>> {
        let prefix = format!("{environment}/");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(TARGETS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let target: Target =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(target);
            }
        }
        Ok(results)
    }

    /// Set a target's current version in a single transaction. With
    /// `mark_good` the version also becomes last-known-good; callers only
    /// pass that after a full bake with verdict pass.
    pub fn update_version(
        &self,
        environment: &str,
        id: &str,
        version: &str,
        mark_good: bool,
        at: u64,
    ) -> StateResult<Target> {
        let key = format!("{environment}/{id}");
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let updated;
        {
            let mut table = txn.open_table(TARGETS).map_err(map_err!(Table))?;
            let mut target: Target = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => return Err(StateError::NotFound(format!("target {key}"))),
            };
            target.version = version.to_string();
            if mark_good {
                target.last_known_good = Some(version.to_string());
            }
            target.updated_at = at;
            let value = serde_json::to_vec(&target).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
            updated = target;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, %version, mark_good, "target version updated");
        Ok(updated)
    }

    /// Set a target's health status, returning the previous status.
    pub fn update_health(
        &self,
        environment: &str,
        id: &str,
        health: HealthState,
        at: u64,
    ) -> StateResult<HealthState> {
        let key = format!("{environment}/{id}");
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let previous;
        {
            let mut table = txn.open_table(TARGETS).map_err(map_err!(Table))?;
            let mut target: Target = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => return Err(StateError::NotFound(format!("target {key}"))),
            };
            previous = target.health;
            target.health = health;
            target.updated_at = at;
            let value = serde_json::to_vec(&target).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(previous)
    }

    // ── Pipeline runs ──────────────────────────────────────────────

    /// Next run sequence number for an environment.
    pub fn next_run_seq(&self, environment: &str) -> StateResult<u64> {
        let prefix = format!("{environment}/");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RUNS).map_err(map_err!(Table))?;
        Ok(next_seq!(table, prefix.as_str()))
    }

    /// Insert or update a pipeline run (keyed by its id).
    pub fn put_run(&self, run: &PipelineRun) -> StateResult<()> {
        let value = serde_json::to_vec(run).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(RUNS).map_err(map_err!(Table))?;
            table
                .insert(run.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Get a run by id.
    pub fn get_run(&self, id: &str) -> StateResult<Option<PipelineRun>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RUNS).map_err(map_err!(Table))?;
        match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => {
                let run: PipelineRun =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(run))
            }
            None => Ok(None),
        }
    }

    /// List all runs for an environment, oldest first.
    pub fn list_runs(&self, environment: &str) -> StateResult<Vec<PipelineRun>> {
        let prefix = format!("{environment}/");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RUNS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let run: PipelineRun =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(run);
            }
        }
        Ok(results)
    }

    /// The most recent run for an environment, if any.
    pub fn latest_run(&self, environment: &str) -> StateResult<Option<PipelineRun>> {
        Ok(self.list_runs(environment)?.pop())
    }

    // ── Rollback audit trail ───────────────────────────────────────

    /// Append a rollback record, assigning the next sequence id for the
    /// target. Records are never updated or deleted.
    #[allow(clippy::too_many_arguments)]
    pub fn append_rollback(
        &self,
        environment: &str,
        target_id: &str,
        from_version: &str,
        to_version: &str,
        reason: &str,
        outcome: RollbackOutcome,
        at: u64,
    ) -> StateResult<RollbackRecord> {
        let prefix = format!("{environment}/{target_id}:");
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let record;
        {
            let mut table = txn.open_table(ROLLBACKS).map_err(map_err!(Table))?;
            let seq = next_seq!(table, prefix.as_str());
            record = RollbackRecord {
                id: format!("{prefix}{seq:06}"),
                environment: environment.to_string(),
                target_id: target_id.to_string(),
                from_version: from_version.to_string(),
                to_version: to_version.to_string(),
                reason: reason.to_string(),
                outcome,
                at,
            };
            let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
            table
                .insert(record.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(id = %record.id, "rollback recorded");
        Ok(record)
    }

    /// List rollback records for a target, oldest first.
    pub fn list_rollbacks(
        &self,
        environment: &str,
        target_id: &str,
    ) -> StateResult<Vec<RollbackRecord>> {
        let prefix = format!("{environment}/{target_id}:");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ROLLBACKS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let record: RollbackRecord =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(record);
            }
        }
        Ok(results)
    }

    // ── Escalation events ──────────────────────────────────────────

    /// Next incident sequence number.
    pub fn next_incident_seq(&self) -> StateResult<u64> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ESCALATIONS).map_err(map_err!(Table))?;
        Ok(next_seq!(table, "inc-"))
    }

    /// Insert or update an escalation event (keyed by incident id).
    /// Events only move forward; callers never delete them.
    pub fn put_escalation(&self, event: &EscalationEvent) -> StateResult<()> {
        let value = serde_json::to_vec(event).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(ESCALATIONS).map_err(map_err!(Table))?;
            table
                .insert(event.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Get an escalation event by incident id.
    pub fn get_escalation(&self, id: &str) -> StateResult<Option<EscalationEvent>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ESCALATIONS).map_err(map_err!(Table))?;
        match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => {
                let event: EscalationEvent =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(event))
            }
            None => Ok(None),
        }
    }

    /// The open incident for a subject, if one exists. At most one
    /// incident is open per subject at a time.
    pub fn open_escalation_for(&self, subject: &str) -> StateResult<Option<EscalationEvent>> {
        Ok(self
            .list_escalations()?
            .into_iter()
            .find(|e| e.is_open() && e.subject == subject))
    }

    /// List all escalation events, oldest first.
    pub fn list_escalations(&self) -> StateResult<Vec<EscalationEvent>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ESCALATIONS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let event: EscalationEvent =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(event);
        }
        Ok(results)
    }

    /// List open escalation events.
    pub fn list_open_escalations(&self) -> StateResult<Vec<EscalationEvent>> {
        Ok(self
            .list_escalations()?
            .into_iter()
            .filter(|e| e.is_open())
            .collect())
    }

    // ── Health report window ───────────────────────────────────────

    /// Append a health report for its target, pruning the rolling window
    /// down to `window` entries in the same transaction.
    pub fn put_report(&self, report: &HealthReport, window: usize) -> StateResult<()> {
        let prefix = format!("{}:", report.target_id);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(REPORTS).map_err(map_err!(Table))?;
            let seq = next_seq!(table, prefix.as_str());
            let key = format!("{prefix}{seq:06}");
            let value = serde_json::to_vec(report).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;

            // Prune beyond the rolling window, oldest first.
            let keys: Vec<String> = table
                .iter()
                .map_err(map_err!(Read))?
                .filter_map(|entry| {
                    let (key, _) = entry.ok()?;
                    let k = key.value().to_string();
                    k.starts_with(&prefix).then_some(k)
                })
                .collect();
            if keys.len() > window {
                for key in &keys[..keys.len() - window] {
                    table.remove(key.as_str()).map_err(map_err!(Write))?;
                }
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// The most recent report for a target.
    pub fn latest_report(&self, target_id: &str) -> StateResult<Option<HealthReport>> {
        Ok(self.list_reports(target_id)?.pop())
    }

    /// The retained report window for a target, oldest first.
    pub fn list_reports(&self, target_id: &str) -> StateResult<Vec<HealthReport>> {
        let prefix = format!("{target_id}:");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(REPORTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let report: HealthReport =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(report);
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_target(environment: &str, id: &str, version: &str) -> Target {
        Target {
            id: id.to_string(),
            environment: environment.to_string(),
            kind: TargetKind::EdgeDevice,
            version: version.to_string(),
            last_known_good: Some("v1".to_string()),
            health: HealthState::Unknown,
            traffic_share: None,
            updated_at: 1000,
        }
    }

    fn test_report(target_id: &str, at: u64) -> HealthReport {
        HealthReport {
            target_id: target_id.to_string(),
            at,
            service: ServiceCheck::Running,
            workload: WorkloadCheck::Healthy,
            disk_usage: 40.0,
            gpu: None,
            time_sync: None,
            tunnel: Some(TunnelCheck::Up),
            peer_reachable: None,
        }
    }

    fn test_run(id: &str, environment: &str) -> PipelineRun {
        PipelineRun {
            id: id.to_string(),
            request: DeploymentRequest {
                environment: environment.to_string(),
                image_tag: "v2".to_string(),
                requested_by: "ops".to_string(),
                dry_run: false,
                created_at: 1000,
            },
            stage: Some(Stage::Build),
            history: Vec::new(),
            outcome: None,
            created_at: 1000,
            updated_at: 1000,
        }
    }

    // ── Target CRUD ────────────────────────────────────────────────

    #[test]
    fn target_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let target = test_target("staging", "edge-07", "v1");

        store.put_target(&target).unwrap();
        let retrieved = store.get_target("staging", "edge-07").unwrap();

        assert_eq!(retrieved, Some(target));
    }

    #[test]
    fn target_get_nonexistent_returns_none() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.get_target("staging", "nope").unwrap().is_none());
    }

    #[test]
    fn require_target_errors_when_missing() {
        let store = StateStore::open_in_memory().unwrap();
        let err = store.require_target("staging", "nope").unwrap_err();
        assert!(matches!(err, StateError::NotFound(_)));
    }

    #[test]
    fn target_list_scoped_to_environment() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_target(&test_target("staging", "a", "v1")).unwrap();
        store.put_target(&test_target("staging", "b", "v1")).unwrap();
        store.put_target(&test_target("production", "c", "v1")).unwrap();

        assert_eq!(store.list_targets("staging").unwrap().len(), 2);
        assert_eq!(store.list_targets("production").unwrap().len(), 1);
        assert!(store.list_targets("dev").unwrap().is_empty());
    }

    #[test]
    fn update_version_without_mark_good_keeps_lkg() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_target(&test_target("staging", "edge-07", "v1")).unwrap();

        let updated = store
            .update_version("staging", "edge-07", "v2", false, 2000)
            .unwrap();

        // Deployed but not bake-verified: last-known-good untouched.
        assert_eq!(updated.version, "v2");
        assert_eq!(updated.last_known_good, Some("v1".to_string()));
        assert_eq!(updated.updated_at, 2000);
    }

    #[test]
    fn update_version_mark_good_advances_lkg() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_target(&test_target("staging", "edge-07", "v1")).unwrap();

        let updated = store
            .update_version("staging", "edge-07", "v2", true, 2000)
            .unwrap();

        assert_eq!(updated.version, "v2");
        assert_eq!(updated.last_known_good, Some("v2".to_string()));
    }

    #[test]
    fn update_version_missing_target_is_not_found() {
        let store = StateStore::open_in_memory().unwrap();
        let err = store
            .update_version("staging", "ghost", "v2", false, 2000)
            .unwrap_err();
        assert!(matches!(err, StateError::NotFound(_)));
    }

    #[test]
    fn update_health_returns_previous() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_target(&test_target("staging", "edge-07", "v1")).unwrap();

        let previous = store
            .update_health("staging", "edge-07", HealthState::Healthy, 2000)
            .unwrap();
        assert_eq!(previous, HealthState::Unknown);

        let previous = store
            .update_health("staging", "edge-07", HealthState::Critical, 2001)
            .unwrap();
        assert_eq!(previous, HealthState::Healthy);

        let target = store.get_target("staging", "edge-07").unwrap().unwrap();
        assert_eq!(target.health, HealthState::Critical);
    }

    // ── Runs ───────────────────────────────────────────────────────

    #[test]
    fn run_seq_increments_per_environment() {
        let store = StateStore::open_in_memory().unwrap();
        assert_eq!(store.next_run_seq("staging").unwrap(), 0);

        store.put_run(&test_run("staging/000000", "staging")).unwrap();
        assert_eq!(store.next_run_seq("staging").unwrap(), 1);
        // Other environments have their own sequence.
        assert_eq!(store.next_run_seq("production").unwrap(), 0);
    }

    #[test]
    fn run_put_get_and_latest() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_run(&test_run("staging/000000", "staging")).unwrap();

        let mut second = test_run("staging/000001", "staging");
        second.outcome = Some(RunOutcome::Succeeded);
        store.put_run(&second).unwrap();

        assert!(store.get_run("staging/000000").unwrap().is_some());
        assert_eq!(store.list_runs("staging").unwrap().len(), 2);

        let latest = store.latest_run("staging").unwrap().unwrap();
        assert_eq!(latest.id, "staging/000001");
        assert_eq!(latest.outcome, Some(RunOutcome::Succeeded));
    }

    // ── Rollback audit trail ───────────────────────────────────────

    #[test]
    fn rollback_records_append_in_order() {
        let store = StateStore::open_in_memory().unwrap();

        let first = store
            .append_rollback(
                "staging",
                "edge-07",
                "v2",
                "v1",
                "canary failed",
                RollbackOutcome::Applied,
                2000,
            )
            .unwrap();
        let second = store
            .append_rollback(
                "staging",
                "edge-07",
                "v1",
                "v1",
                "manual",
                RollbackOutcome::NoOp,
                2001,
            )
            .unwrap();

        assert_eq!(first.id, "staging/edge-07:000000");
        assert_eq!(second.id, "staging/edge-07:000001");

        let records = store.list_rollbacks("staging", "edge-07").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].outcome, RollbackOutcome::Applied);
        assert_eq!(records[1].outcome, RollbackOutcome::NoOp);
    }

    #[test]
    fn rollback_records_scoped_per_target() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .append_rollback("staging", "a", "v2", "v1", "x", RollbackOutcome::Applied, 1)
            .unwrap();
        store
            .append_rollback("staging", "b", "v2", "v1", "x", RollbackOutcome::Applied, 1)
            .unwrap();

        assert_eq!(store.list_rollbacks("staging", "a").unwrap().len(), 1);
        assert_eq!(store.list_rollbacks("staging", "b").unwrap().len(), 1);
    }

    // ── Escalations ────────────────────────────────────────────────

    fn test_event(seq: u64, subject: &str) -> EscalationEvent {
        EscalationEvent {
            id: format!("inc-{seq:06}"),
            trigger: EscalationTrigger::HealthCritical {
                target_id: subject.to_string(),
            },
            subject: subject.to_string(),
            tier: EscalationTier::Automated,
            opened_at: 1000,
            tier_entered_at: 1000,
            resolved_at: None,
        }
    }

    #[test]
    fn escalation_open_lookup_by_subject() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_escalation(&test_event(0, "edge-07")).unwrap();

        let mut resolved = test_event(1, "edge-08");
        resolved.resolved_at = Some(2000);
        store.put_escalation(&resolved).unwrap();

        let open = store.open_escalation_for("edge-07").unwrap().unwrap();
        assert_eq!(open.id, "inc-000000");
        assert!(store.open_escalation_for("edge-08").unwrap().is_none());
        assert_eq!(store.list_open_escalations().unwrap().len(), 1);
        assert_eq!(store.list_escalations().unwrap().len(), 2);
    }

    #[test]
    fn incident_seq_increments() {
        let store = StateStore::open_in_memory().unwrap();
        assert_eq!(store.next_incident_seq().unwrap(), 0);
        store.put_escalation(&test_event(0, "edge-07")).unwrap();
        assert_eq!(store.next_incident_seq().unwrap(), 1);
    }

    // ── Report window ──────────────────────────────────────────────

    #[test]
    fn report_window_prunes_oldest() {
        let store = StateStore::open_in_memory().unwrap();

        for at in 1000..1006 {
            store.put_report(&test_report("edge-07", at), 3).unwrap();
        }

        let reports = store.list_reports("edge-07").unwrap();
        assert_eq!(reports.len(), 3);
        // Oldest pruned; window keeps the most recent three.
        assert_eq!(reports[0].at, 1003);
        assert_eq!(reports[2].at, 1005);
        assert_eq!(store.latest_report("edge-07").unwrap().unwrap().at, 1005);
    }

    #[test]
    fn report_windows_are_per_target() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_report(&test_report("edge-07", 1000), 5).unwrap();
        store.put_report(&test_report("edge-08", 1001), 5).unwrap();

        assert_eq!(store.list_reports("edge-07").unwrap().len(), 1);
        assert_eq!(store.latest_report("edge-08").unwrap().unwrap().at, 1001);
        assert!(store.latest_report("edge-09").unwrap().is_none());
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.put_target(&test_target("production", "edge-07", "v1")).unwrap();
            store
                .append_rollback(
                    "production",
                    "edge-07",
                    "v2",
                    "v1",
                    "manual",
                    RollbackOutcome::Applied,
                    1000,
                )
                .unwrap();
        }

        // Reopen the same database file.
        let store = StateStore::open(&db_path).unwrap();
        let target = store.get_target("production", "edge-07").unwrap();
        assert!(target.is_some());
        assert_eq!(store.list_rollbacks("production", "edge-07").unwrap().len(), 1);
        // Sequence continues past the reopened records.
        assert_eq!(
            store
                .append_rollback(
                    "production",
                    "edge-07",
                    "v1",
                    "v1",
                    "manual",
                    RollbackOutcome::NoOp,
                    1001,
                )
                .unwrap()
                .id,
            "production/edge-07:000001"
        );
    }

    // ── Edge cases ─────────────────────────────────────────────────

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.list_targets("any").unwrap().is_empty());
        assert!(store.list_runs("any").unwrap().is_empty());
        assert!(store.latest_run("any").unwrap().is_none());
        assert!(store.list_rollbacks("any", "x").unwrap().is_empty());
        assert!(store.list_escalations().unwrap().is_empty());
        assert!(store.latest_report("x").unwrap().is_none());
    }
}
