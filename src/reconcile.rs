use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::Engine;

/// Background task that periodically repairs room statuses that drifted
/// from the booking set.
pub async fn run_reconciler(engine: Arc<Engine>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        match engine.reconcile_room_statuses().await {
            Ok(report) if report.changes.is_empty() => {
                debug!("reconcile: {} rooms occupied, nothing to fix", report.occupied);
            }
            Ok(report) => info!("reconcile: fixed {} room statuses", report.changes.len()),
            Err(e) => warn!("reconcile failed: {e}"),
        }
    }
}
