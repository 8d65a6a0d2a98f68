//! Escalation dispatcher — per-incident tier state machine.
//!
//! Tier advancement is driven by two clocks: the automated tier advances
//! after a configured wait with no recovery, and the senior tier keys off
//! the customer-impact clock (time since the incident opened), not the
//! time since automation ran.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use fleet_core::{EscalationPolicy, parse_duration};
use fleetgrid_health::StatusTransition;
use fleetgrid_state::{
    EscalationEvent, EscalationTier, EscalationTrigger, StateResult, StateStore,
};

use crate::notify::{EscalationNotice, NotifyFn, RemediateFn};

/// Dispatches incidents through operator tiers and hands notices to the
/// delivery collaborator.
pub struct EscalationDispatcher {
    state: StateStore,
    notify: NotifyFn,
    remediate: Option<RemediateFn>,
    automated_wait: Duration,
    sla: Duration,
    burst_threshold: usize,
    burst_window: Duration,
    /// Open timestamps inside the burst window, for page batching.
    recent_opens: Mutex<VecDeque<u64>>,
}

impl EscalationDispatcher {
    pub fn new(state: StateStore, policy: &EscalationPolicy, notify: NotifyFn) -> Self {
        Self {
            state,
            notify,
            remediate: None,
            automated_wait: parse_duration(&policy.automated_wait)
                .unwrap_or(Duration::from_secs(120)),
            sla: parse_duration(&policy.sla).unwrap_or(Duration::from_secs(900)),
            burst_threshold: policy.burst_threshold,
            burst_window: parse_duration(&policy.burst_window).unwrap_or(Duration::from_secs(60)),
            recent_opens: Mutex::new(VecDeque::new()),
        }
    }

    /// Set the automated remediation collaborator.
    pub fn with_remediation(mut self, remediate: RemediateFn) -> Self {
        self.remediate = Some(remediate);
        self
    }

    /// Open an incident at the automated tier. A subject with an incident
    /// already open is left alone; churn on a sustained Critical status
    /// never re-pages.
    pub async fn open(
        &self,
        trigger: EscalationTrigger,
        now: u64,
    ) -> StateResult<Option<EscalationEvent>> {
        self.open_at(trigger, EscalationTier::Automated, now).await
    }

    /// Open an incident at a specific entry tier. Rollback failures enter
    /// directly at on-call: automation has already proven untrustworthy,
    /// so the automated tier (and its remediation) is skipped.
    pub async fn open_at(
        &self,
        trigger: EscalationTrigger,
        tier: EscalationTier,
        now: u64,
    ) -> StateResult<Option<EscalationEvent>> {
        let subject = trigger.subject().to_string();
        if let Some(existing) = self.state.open_escalation_for(&subject)? {
            debug!(%subject, incident = %existing.id, "incident already open; not reopening");
            return Ok(None);
        }

        let seq = self.state.next_incident_seq()?;
        let event = EscalationEvent {
            id: format!("inc-{seq:06}"),
            trigger,
            subject: subject.clone(),
            tier,
            opened_at: now,
            tier_entered_at: now,
            resolved_at: None,
        };
        self.state.put_escalation(&event)?;
        info!(incident = %event.id, %subject, %tier, "incident opened");

        // Automated remediation runs exactly once, when the incident
        // enters at the automated tier. Fire-and-forget: its outcome is
        // observed through subsequent health reports.
        if tier == EscalationTier::Automated {
            if let Some(remediate) = self.remediate.clone() {
                let incident = event.id.clone();
                let subject = subject.clone();
                tokio::spawn(async move {
                    match remediate(subject.clone()).await {
                        Ok(()) => info!(%incident, %subject, "automated remediation dispatched"),
                        Err(e) => {
                            warn!(%incident, %subject, error = %e, "automated remediation failed")
                        }
                    }
                });
            }
        }

        self.deliver_open(&event, now).await;
        Ok(Some(event))
    }

    /// Resolve the open incident for a subject, if any. Called on any
    /// Healthy transition: recovery closes the incident regardless of
    /// how far it escalated.
    pub async fn resolve_for(&self, subject: &str, now: u64) -> StateResult<Option<EscalationEvent>> {
        let Some(mut event) = self.state.open_escalation_for(subject)? else {
            return Ok(None);
        };
        event.resolved_at = Some(now);
        self.state.put_escalation(&event)?;
        info!(incident = %event.id, %subject, tier = %event.tier, "incident resolved");
        Ok(Some(event))
    }

    /// Advance overdue open incidents one tier forward. Tiers only move
    /// forward; resolution is the only other exit.
    pub async fn advance_due(&self, now: u64) -> StateResult<Vec<EscalationEvent>> {
        let mut advanced = Vec::new();
        for mut event in self.state.list_open_escalations()? {
            let next = match event.tier {
                EscalationTier::Automated
                    if now.saturating_sub(event.tier_entered_at)
                        >= self.automated_wait.as_secs() =>
                {
                    EscalationTier::OnCall
                }
                // Senior keys off the customer-impact clock: time since
                // the incident opened, not since the last tier change.
                EscalationTier::OnCall
                    if now.saturating_sub(event.opened_at) >= self.sla.as_secs() =>
                {
                    EscalationTier::Senior
                }
                _ => continue,
            };

            event.tier = next;
            event.tier_entered_at = now;
            self.state.put_escalation(&event)?;
            warn!(incident = %event.id, subject = %event.subject, tier = %next, "incident escalated");
            self.deliver(&event, now).await;
            advanced.push(event);
        }
        Ok(advanced)
    }

    /// Consume health transitions and drive tier advancement until
    /// shutdown. Critical opens incidents, Healthy resolves them.
    pub async fn run(
        &self,
        mut transitions: broadcast::Receiver<StatusTransition>,
        tick: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                received = transitions.recv() => match received {
                    Ok(transition) if transition.is_critical() => {
                        let trigger = EscalationTrigger::HealthCritical {
                            target_id: transition.target_id.clone(),
                        };
                        if let Err(e) = self.open(trigger, transition.at).await {
                            error!(target_id = %transition.target_id, error = %e, "failed to open incident");
                        }
                    }
                    Ok(transition) if transition.is_healthy() => {
                        if let Err(e) = self.resolve_for(&transition.target_id, transition.at).await {
                            error!(target_id = %transition.target_id, error = %e, "failed to resolve incident");
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "escalation dispatcher lagged behind transitions");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = tokio::time::sleep(tick) => {
                    if let Err(e) = self.advance_due(epoch_secs()).await {
                        error!(error = %e, "failed to advance overdue incidents");
                    }
                }
                _ = shutdown.changed() => {
                    debug!("escalation dispatcher shutting down");
                    break;
                }
            }
        }
    }

    /// Deliver the opening notice, collapsing bursts into one aggregate
    /// page. Thresholds are policy, not invariants.
    async fn deliver_open(&self, event: &EscalationEvent, now: u64) {
        let burst = {
            let mut opens = self.recent_opens.lock().unwrap_or_else(|e| e.into_inner());
            let horizon = now.saturating_sub(self.burst_window.as_secs());
            while opens.front().is_some_and(|&at| at < horizon) {
                opens.pop_front();
            }
            opens.push_back(now);
            opens.len()
        };

        if burst == self.burst_threshold {
            let aggregate = EscalationNotice {
                incident_id: event.id.clone(),
                tier: event.tier,
                target_id: "*".to_string(),
                reason: format!(
                    "{burst} incidents within {}s; batching further pages",
                    self.burst_window.as_secs()
                ),
                timestamp: now,
            };
            self.send(aggregate).await;
        } else if burst > self.burst_threshold {
            debug!(incident = %event.id, burst, "notice suppressed inside burst window");
        } else {
            self.deliver(event, now).await;
        }
    }

    async fn deliver(&self, event: &EscalationEvent, now: u64) {
        let notice = EscalationNotice {
            incident_id: event.id.clone(),
            tier: event.tier,
            target_id: event.subject.clone(),
            reason: event.trigger.reason(),
            timestamp: now,
        };
        self.send(notice).await;
    }

    async fn send(&self, notice: EscalationNotice) {
        // Delivery failure is logged and swallowed: the incident stays
        // open in state even when the page never went out.
        if let Err(e) = (self.notify)(notice).await {
            warn!(error = %e, "escalation delivery failed; incident remains open");
        }
    }
}

fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
