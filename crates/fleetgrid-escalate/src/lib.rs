//! fleetgrid-escalate — escalation dispatch for FleetGrid incidents.
//!
//! Maps sustained Critical status or pipeline failure into ordered
//! operator tiers: `automated → on_call → senior → resolved`. The
//! dispatcher decides *that* and *when* an escalation fires; delivery is
//! an injected collaborator, and a delivery failure never blocks the
//! state machine.
//!
//! One incident is open per subject (target id, or run id for pipeline
//! failures) at a time; any Healthy transition for the subject resolves
//! it regardless of tier. Bursts of incidents inside a configurable
//! window collapse into a single aggregate notice so operators are not
//! paged once per target.

pub mod dispatcher;
pub mod notify;

pub use dispatcher::EscalationDispatcher;
pub use notify::{EscalationNotice, NotifyFn, RemediateFn, logging_notifier};
