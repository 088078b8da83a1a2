//! ============================================================================
//! Stream Supervisor - keep a subscription alive forever
//! ============================================================================
//! Disconnected -> Connecting -> Streaming; any failure (connect error, read
//! error, handler error, or the stream simply ending) moves to Backoff and
//! then back to Connecting. Retries never stop. The attempt counter resets
//! only after a connection stayed up for `healthy_after`, so a server that
//! accepts and immediately drops still escalates to the backoff cap.
//!
//! Items are handed to the worker pool one at a time; the next frame is read
//! only after the current item finished.
//!
//! If the retry loop itself ever exits (it should not; a panic would do it),
//! the subscription is restarted after a fixed delay. Aborting the
//! supervisor task aborts the retry loop with it.
//! ============================================================================

use anyhow::{anyhow, Result};
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::retry::{calculate_delay, BackoffConfig};
use super::router::PayloadHandler;
use super::worker_pool::WorkerPool;
use crate::platform::EventSource;
use crate::types::StreamKind;

/// Subscription lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Disconnected,
    Connecting,
    Streaming,
    Backoff,
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub backoff: BackoffConfig,
    /// Delay before restarting a subscription whose retry loop exited
    pub restart_delay: Duration,
    /// Uptime after which a connection counts as healthy and backoff resets
    pub healthy_after: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffConfig::default(),
            restart_delay: Duration::from_secs(30),
            healthy_after: Duration::from_secs(60),
        }
    }
}

/// Aborts the wrapped task when dropped
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub struct StreamSupervisor {
    source: Arc<dyn EventSource>,
    handler: Arc<dyn PayloadHandler>,
    pool: WorkerPool,
    config: SupervisorConfig,
    states: Mutex<HashMap<StreamKind, SupervisorState>>,
}

impl StreamSupervisor {
    pub fn new(
        source: Arc<dyn EventSource>,
        handler: Arc<dyn PayloadHandler>,
        pool: WorkerPool,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            source,
            handler,
            pool,
            config,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn state(&self, kind: StreamKind) -> SupervisorState {
        self.states
            .lock()
            .ok()
            .and_then(|states| states.get(&kind).copied())
            .unwrap_or(SupervisorState::Disconnected)
    }

    fn set_state(&self, kind: StreamKind, state: SupervisorState) {
        debug!("{} stream -> {:?}", kind, state);
        if let Ok(mut states) = self.states.lock() {
            states.insert(kind, state);
        }
    }

    /// Spawn the supervised subscription for `kind`
    pub fn spawn(self: &Arc<Self>, kind: StreamKind) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move { this.supervise(kind).await })
    }

    /// Outer loop: restart the retry loop whenever it exits
    pub async fn supervise(self: Arc<Self>, kind: StreamKind) {
        loop {
            let this = self.clone();
            let mut inner = AbortOnDrop(tokio::spawn(async move { this.retry_loop(kind).await }));

            match (&mut inner.0).await {
                Ok(()) => warn!("{} subscription loop exited", kind),
                Err(e) => error!("{} subscription loop crashed: {}", kind, e),
            }

            self.set_state(kind, SupervisorState::Disconnected);
            info!("Restarting {} subscription in {:?}", kind, self.config.restart_delay);
            tokio::time::sleep(self.config.restart_delay).await;
        }
    }

    /// Connect, consume until failure, back off, repeat
    async fn retry_loop(&self, kind: StreamKind) {
        let mut attempt: u32 = 0;
        loop {
            self.set_state(kind, SupervisorState::Connecting);

            let mut connected_at = None;
            let err = match self.consume(kind, &mut connected_at).await {
                Ok(()) => anyhow!("{} stream ended", kind),
                Err(e) => e,
            };

            let healthy = connected_at
                .map(|since: Instant| since.elapsed() >= self.config.healthy_after)
                .unwrap_or(false);
            if healthy {
                attempt = 0;
            }
            let delay = calculate_delay(attempt, &self.config.backoff);
            attempt = attempt.saturating_add(1);

            self.set_state(kind, SupervisorState::Backoff);
            warn!("{} stream failed: {} (retry {} in {:?})", kind, err, attempt, delay);
            tokio::time::sleep(delay).await;
        }
    }

    /// One connection. Returns Ok only when the stream ends on its own.
    async fn consume(&self, kind: StreamKind, connected_at: &mut Option<Instant>) -> Result<()> {
        let mut stream = self.source.connect(kind).await?;
        *connected_at = Some(Instant::now());
        self.set_state(kind, SupervisorState::Streaming);
        info!("{} stream connected", kind);

        while let Some(item) = stream.next().await {
            let payload = item?;

            let handler = self.handler.clone();
            self.pool
                .run(async move { handler.handle(kind, payload).await })
                .await??;
        }
        Ok(())
    }
}
