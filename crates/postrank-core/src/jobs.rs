//! Periodic job runner.
//!
//! Each run is awaited inside the loop, so a job never overlaps itself, and
//! `MissedTickBehavior::Skip` drops ticks that fell due while it was running.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Run `job` every `period` forever. Errors are logged and the next tick
/// runs as usual.
pub async fn run_periodic<F, Fut>(name: &'static str, period: Duration, mut job: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        debug!("Running job {}", name);
        if let Err(e) = job().await {
            warn!("Job {} failed: {}", name, e);
        }
    }
}
