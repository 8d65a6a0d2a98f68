//! Deterministic canary selection.
//!
//! The group size is the smaller of the absolute and percentage quotas,
//! clamped so the group is never empty and never the whole fleet. A
//! non-canary majority stays unaffected until promotion.

use thiserror::Error;

use fleet_core::CanaryPolicy;
use fleetgrid_state::{Target, TargetId};

/// Result type for canary operations.
pub type CanaryResult<T> = Result<T, CanaryError>;

/// Errors that can occur selecting a canary group.
#[derive(Debug, Error)]
pub enum CanaryError {
    #[error("fleet of {size} target(s) is too small for a canary split")]
    FleetTooSmall { size: usize },
}

/// Pick the canary subset of a fleet.
///
/// Ordering is deterministic, never random: ascending `traffic_share`
/// where the metadata exists (least impactful first; targets without the
/// metadata sort last; unknown impact is not assumed low), then target
/// id for a stable, reproducible tie-break.
pub fn select(targets: &[Target], policy: &CanaryPolicy) -> CanaryResult<Vec<TargetId>> {
    let fleet = targets.len();
    if fleet < 2 {
        return Err(CanaryError::FleetTooSmall { size: fleet });
    }

    let by_percent = (policy.max_percent as usize * fleet) / 100;
    let quota = (policy.max_targets as usize)
        .min(by_percent)
        .clamp(1, fleet - 1);

    let mut ordered: Vec<&Target> = targets.iter().collect();
    ordered.sort_by(|a, b| {
        let share_a = a.traffic_share.unwrap_or(f64::INFINITY);
        let share_b = b.traffic_share.unwrap_or(f64::INFINITY);
        share_a
            .total_cmp(&share_b)
            .then_with(|| a.id.cmp(&b.id))
    });

    Ok(ordered[..quota].iter().map(|t| t.id.clone()).collect())
}
