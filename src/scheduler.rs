//! Periodic refresh trigger.
//!
//! Fires a refresh request every `interval` for the life of the process.
//! Missed ticks are skipped rather than replayed, and because requests go
//! through the single-writer refresher a slow run delays the next one instead
//! of overlapping it. Nothing is persisted; a restart starts a fresh timer.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::pipeline::RefreshTrigger;
use crate::refresher::RefreshHandle;

/// Start the periodic trigger. Abort the returned handle to stop it.
///
/// With `run_on_start` the first refresh is requested immediately (as
/// [`RefreshTrigger::Startup`]); otherwise the first one fires after one
/// full interval.
pub fn spawn_periodic(
    handle: RefreshHandle,
    interval: Duration,
    run_on_start: bool,
) -> JoinHandle<()> {
    info!(interval_secs = interval.as_secs(), run_on_start, "periodic refresh enabled");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // The first tick completes immediately.
        ticker.tick().await;
        if run_on_start {
            handle.request(RefreshTrigger::Startup);
        }

        loop {
            ticker.tick().await;
            let queued = handle.request(RefreshTrigger::Scheduled);
            debug!(queued, "scheduled refresh tick");
        }
    })
}
