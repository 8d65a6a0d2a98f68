//! The human approval gate.
//!
//! The Approval stage is a cooperative suspension: the run parks on a
//! oneshot channel and resumes when an external actor decides, or when
//! the optional timeout fires (aborting as if rejected). No polling.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{Mutex, oneshot};
use tracing::{debug, info};

use fleetgrid_state::RunId;

/// An external decision on a suspended run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approved { by: String },
    Rejected { by: String },
}

/// How the approval wait ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Approved { by: String },
    Rejected { by: String },
    TimedOut,
}

/// Routes external approval decisions to suspended runs.
#[derive(Default)]
pub struct ApprovalGate {
    pending: Mutex<HashMap<RunId, oneshot::Sender<ApprovalDecision>>>,
}

impl ApprovalGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspend until a decision arrives for the run, or until `timeout`
    /// elapses. `None` waits indefinitely.
    pub async fn wait(&self, run_id: &str, timeout: Option<Duration>) -> ApprovalOutcome {
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(run_id.to_string(), tx);
        }
        info!(%run_id, "run suspended awaiting approval");

        let decision = match timeout {
            Some(timeout) => tokio::time::timeout(timeout, rx).await.ok().and_then(Result::ok),
            None => rx.await.ok(),
        };

        // Clean up the slot on the timeout path so a late decision does
        // not land on a finished run.
        {
            let mut pending = self.pending.lock().await;
            pending.remove(run_id);
        }

        match decision {
            Some(ApprovalDecision::Approved { by }) => ApprovalOutcome::Approved { by },
            Some(ApprovalDecision::Rejected { by }) => ApprovalOutcome::Rejected { by },
            None => ApprovalOutcome::TimedOut,
        }
    }

    /// Deliver a decision to a suspended run. Returns false when no run
    /// with that id is waiting.
    pub async fn decide(&self, run_id: &str, decision: ApprovalDecision) -> bool {
        let tx = {
            let mut pending = self.pending.lock().await;
            pending.remove(run_id)
        };
        match tx {
            Some(tx) => tx.send(decision).is_ok(),
            None => {
                debug!(%run_id, "approval decision for a run that is not waiting");
                false
            }
        }
    }

    /// Run ids currently suspended at the gate.
    pub async fn pending_runs(&self) -> Vec<RunId> {
        let pending = self.pending.lock().await;
        pending.keys().cloned().collect()
    }
}
