//! Notification and remediation seams.
//!
//! The dispatcher emits structured notices; turning them into pages,
//! chat messages, or tickets is the transport collaborator's job.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use fleet_core::BoxFuture;
use fleetgrid_state::EscalationTier;

/// Structured escalation notice handed to the delivery collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct EscalationNotice {
    pub incident_id: String,
    pub tier: EscalationTier,
    pub target_id: String,
    pub reason: String,
    pub timestamp: u64,
}

/// Delivers a notice to the outside world (pager, chat, ticket queue).
pub type NotifyFn = Arc<dyn Fn(EscalationNotice) -> BoxFuture<anyhow::Result<()>> + Send + Sync>;

/// Runs the configured automated remediation action for a subject
/// (service restart, instance replacement). Invoked exactly once per
/// incident that enters the automated tier.
pub type RemediateFn = Arc<dyn Fn(String) -> BoxFuture<anyhow::Result<()>> + Send + Sync>;

/// A notifier that serializes each notice into the structured log,
/// the integration point for a real transport.
pub fn logging_notifier() -> NotifyFn {
    Arc::new(|notice| {
        Box::pin(async move {
            let payload = serde_json::to_string(&notice)?;
            info!(%payload, "escalation notice");
            Ok(())
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notice_serializes_to_wire_shape() {
        let notice = EscalationNotice {
            incident_id: "inc-000000".to_string(),
            tier: EscalationTier::OnCall,
            target_id: "edge-07".to_string(),
            reason: "target edge-07 reported critical".to_string(),
            timestamp: 1000,
        };
        let json = serde_json::to_value(&notice).unwrap();
        assert_eq!(json["incident_id"], "inc-000000");
        assert_eq!(json["tier"], "on_call");
        assert_eq!(json["target_id"], "edge-07");
        assert_eq!(json["timestamp"], 1000);
    }
}
