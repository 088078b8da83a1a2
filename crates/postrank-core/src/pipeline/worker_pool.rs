//! Bounded pool for per-item work.
//!
//! Consumers call `run(..).await`, so the next stream frame is only read
//! after the current item has finished on a worker.

use anyhow::{anyhow, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `work` on a pooled task and wait for its result.
    /// A panic inside `work` surfaces as an error.
    pub async fn run<F, T>(&self, work: F) -> Result<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| anyhow!("Worker pool closed: {}", e))?;

        let handle = tokio::spawn(async move {
            let _permit = permit;
            work.await
        });

        handle.await.map_err(|e| anyhow!("Worker task failed: {}", e))
    }
}
