//! Background cleanup of idle sessions.

use promptline_core::SessionRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Spawn the idle reaper: every `interval`, sessions idle for at least
/// `max_idle` are terminated and removed.
pub fn spawn_idle_reaper(
    registry: Arc<SessionRegistry>,
    max_idle: Duration,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let removed = registry.reap_idle(max_idle).await;
            if removed.is_empty() {
                tracing::trace!(target: "promptline::reaper", "No idle sessions");
            } else {
                tracing::info!(
                    target: "promptline::reaper",
                    "Reaped {} idle sessions: {:?}",
                    removed.len(),
                    removed
                );
            }
        }
    })
}
