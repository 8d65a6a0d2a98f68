//! Canary group — bake-period outcome tracking.
//!
//! A group is created when the canary subset receives the new version and
//! discarded once resolved; the verdict is persisted through the owning
//! pipeline run. Judging is fail-fast and the deadline never extends.

use tracing::{info, warn};

use fleetgrid_state::{HealthState, RunId, TargetId};

/// Aggregated bake verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pending,
    Pass,
    Fail,
}

/// A canary subset under observation for one pipeline run.
#[derive(Debug, Clone)]
pub struct CanaryGroup {
    run_id: RunId,
    targets: Vec<TargetId>,
    /// Unix timestamp at which the bake window closes.
    deadline: u64,
    /// Whether a Degraded member fails the bake (default: warn only).
    degraded_fails_bake: bool,
    verdict: Verdict,
    failure: Option<String>,
}

impl CanaryGroup {
    pub fn new(
        run_id: &str,
        targets: Vec<TargetId>,
        now: u64,
        bake_secs: u64,
        degraded_fails_bake: bool,
    ) -> Self {
        Self {
            run_id: run_id.to_string(),
            targets,
            deadline: now + bake_secs,
            degraded_fails_bake,
            verdict: Verdict::Pending,
            failure: None,
        }
    }

    pub fn targets(&self) -> &[TargetId] {
        &self.targets
    }

    pub fn contains(&self, target_id: &str) -> bool {
        self.targets.iter().any(|t| t == target_id)
    }

    pub fn deadline(&self) -> u64 {
        self.deadline
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    /// Why the group failed, when it did.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Feed one member status observation into the group.
    ///
    /// A single Critical before the deadline fails the group immediately:
    /// there is no waiting out the rest of the window and no averaging.
    /// Observations for non-members or after resolution are ignored.
    pub fn observe(&mut self, target_id: &str, status: HealthState, at: u64) -> Verdict {
        if self.verdict != Verdict::Pending || !self.contains(target_id) {
            return self.verdict;
        }
        if at >= self.deadline {
            // The window already closed clean; late reports cannot
            // retroactively fail it.
            return self.expire(at);
        }

        match status {
            HealthState::Critical => {
                self.verdict = Verdict::Fail;
                self.failure = Some(format!("canary {target_id} reported critical during bake"));
                warn!(run_id = %self.run_id, %target_id, "canary bake failed");
            }
            HealthState::Degraded if self.degraded_fails_bake => {
                self.verdict = Verdict::Fail;
                self.failure = Some(format!("canary {target_id} reported degraded during bake"));
                warn!(run_id = %self.run_id, %target_id, "canary bake failed on degraded policy");
            }
            HealthState::Degraded => {
                warn!(
                    run_id = %self.run_id,
                    %target_id,
                    "canary degraded during bake; not blocking promotion"
                );
            }
            HealthState::Healthy | HealthState::Unknown => {}
        }
        self.verdict
    }

    /// Close the window: a group still pending at its deadline passes.
    /// The deadline never extends.
    pub fn expire(&mut self, now: u64) -> Verdict {
        if self.verdict == Verdict::Pending && now >= self.deadline {
            self.verdict = Verdict::Pass;
            info!(run_id = %self.run_id, targets = self.targets.len(), "canary bake passed");
        }
        self.verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(degraded_fails: bool) -> CanaryGroup {
        CanaryGroup::new(
            "staging/000000",
            vec!["edge-07".to_string()],
            1000,
            300,
            degraded_fails,
        )
    }

    #[test]
    fn single_critical_fails_immediately() {
        let mut g = group(false);
        let verdict = g.observe("edge-07", HealthState::Critical, 1010);
        assert_eq!(verdict, Verdict::Fail);
        assert!(g.failure().unwrap().contains("critical"));

        // Fail-fast: expiry later cannot flip it to pass.
        assert_eq!(g.expire(2000), Verdict::Fail);
    }

    #[test]
    fn healthy_through_window_passes_on_expiry() {
        let mut g = group(false);
        assert_eq!(g.observe("edge-07", HealthState::Healthy, 1010), Verdict::Pending);
        assert_eq!(g.observe("edge-07", HealthState::Healthy, 1200), Verdict::Pending);

        // Not before the deadline...
        assert_eq!(g.expire(1299), Verdict::Pending);
        // ...but exactly at it.
        assert_eq!(g.expire(1300), Verdict::Pass);
    }

    #[test]
    fn degraded_warns_but_passes_by_default() {
        let mut g = group(false);
        assert_eq!(g.observe("edge-07", HealthState::Degraded, 1010), Verdict::Pending);
        assert_eq!(g.expire(1300), Verdict::Pass);
    }

    #[test]
    fn degraded_fails_when_policy_strict() {
        let mut g = group(true);
        assert_eq!(g.observe("edge-07", HealthState::Degraded, 1010), Verdict::Fail);
    }

    #[test]
    fn non_members_are_ignored() {
        let mut g = group(false);
        assert_eq!(g.observe("edge-99", HealthState::Critical, 1010), Verdict::Pending);
        assert_eq!(g.expire(1300), Verdict::Pass);
    }

    #[test]
    fn late_critical_cannot_fail_a_clean_window() {
        let mut g = group(false);
        // First observation arrives after the deadline: window closed clean.
        assert_eq!(g.observe("edge-07", HealthState::Critical, 1301), Verdict::Pass);
    }

    #[test]
    fn resolved_group_is_sticky() {
        let mut g = group(false);
        g.observe("edge-07", HealthState::Critical, 1010);
        assert_eq!(g.observe("edge-07", HealthState::Healthy, 1020), Verdict::Fail);
        assert_eq!(g.verdict(), Verdict::Fail);
    }
}
