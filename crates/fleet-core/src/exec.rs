//! Collaborator seams for side-effecting actions.
//!
//! The orchestrator never switches a version itself. It hands the action
//! to an injected [`ApplyFn`] (kubectl, SSH, OTA push). Callbacks are
//! function-typed rather than traits so call sites stay decoupled and
//! tests can inject closures.

use std::sync::Arc;

use tracing::info;

/// Boxed future returned by collaborator callbacks.
pub type BoxFuture<T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send>>;

/// Applies a version to a target: `(target_id, version)`.
///
/// An `Err` means the underlying execution step failed; the caller decides
/// whether that aborts, rolls back, or escalates.
pub type ApplyFn = Arc<dyn Fn(String, String) -> BoxFuture<anyhow::Result<()>> + Send + Sync>;

/// An applier that records the intent in the log and succeeds without
/// touching anything. Used for dry-run rehearsals and tests.
pub fn noop_applier() -> ApplyFn {
    Arc::new(|target_id, version| {
        Box::pin(async move {
            info!(%target_id, %version, "dry-run: version switch suppressed");
            Ok(())
        })
    })
}

/// An applier that logs the switch as the integration point for the real
/// executor (kubectl set image / edge OTA push).
pub fn logging_applier() -> ApplyFn {
    Arc::new(|target_id, version| {
        Box::pin(async move {
            info!(%target_id, %version, "switching target to version");
            Ok(())
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_applier_succeeds() {
        let apply = noop_applier();
        assert!(apply("edge-07".to_string(), "v2".to_string()).await.is_ok());
    }
}
