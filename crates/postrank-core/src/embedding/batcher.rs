//! ============================================================================
//! Embedding Batcher - rate-limited vector generation for stored posts
//! ============================================================================
//! Each tick:
//! - skips entirely when the provider quota for the trailing window is used up
//! - picks the oldest posts without a vector (batch of at most `batch_size`)
//! - records the call in the log, then invokes the provider once
//! - writes vector `i` to post `i`
//!
//! A provider failure aborts the tick before anything is written; the same
//! posts are picked again on the next tick.
//! ============================================================================

use anyhow::{anyhow, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::service::EmbeddingProvider;
use crate::db::{blocking, EmbeddingCall, PostStore};

/// Provider call budget
#[derive(Debug, Clone)]
pub struct QuotaPolicy {
    pub batch_size: usize,
    pub max_calls: usize,
    pub window: Duration,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            batch_size: 3,
            max_calls: 3,
            window: Duration::from_secs(10 * 60),
        }
    }
}

/// What a tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Quota exhausted for the window
    QuotaExhausted { calls_in_window: usize },
    /// Nothing to embed
    Idle,
    /// Vectors written for this many posts
    Embedded(usize),
}

pub struct EmbeddingBatcher {
    store: Arc<dyn PostStore>,
    provider: Arc<dyn EmbeddingProvider>,
    quota: QuotaPolicy,
}

impl EmbeddingBatcher {
    pub fn new(store: Arc<dyn PostStore>, provider: Arc<dyn EmbeddingProvider>, quota: QuotaPolicy) -> Self {
        Self { store, provider, quota }
    }

    pub async fn tick(&self) -> Result<BatchOutcome> {
        self.tick_at(Utc::now().timestamp_millis()).await
    }

    /// Run one tick as if the current time were `now_ms`
    pub async fn tick_at(&self, now_ms: i64) -> Result<BatchOutcome> {
        let model = self.provider.model().to_string();
        let window_start = now_ms - self.quota.window.as_millis() as i64;

        let counted = model.clone();
        let calls_in_window = blocking(&self.store, move |store| {
            store.count_embedding_calls_since(&counted, window_start)
        })
        .await?;
        if calls_in_window >= self.quota.max_calls {
            debug!(
                "Embedding quota used ({} calls in window), skipping tick",
                calls_in_window
            );
            return Ok(BatchOutcome::QuotaExhausted { calls_in_window });
        }

        let batch_size = self.quota.batch_size;
        let posts: Vec<_> = blocking(&self.store, move |store| store.posts_missing_embedding(batch_size))
            .await?
            .into_iter()
            .filter(|p| p.has_embeddable_text())
            .collect();
        if posts.is_empty() {
            return Ok(BatchOutcome::Idle);
        }

        let texts: Vec<String> = posts.iter().map(|p| p.embedding_text()).collect();

        // The attempt counts against the quota whether or not it succeeds.
        let call = EmbeddingCall::new(&model, now_ms, texts.join("\n"));
        blocking(&self.store, move |store| store.record_embedding_call(&call)).await?;

        let vectors = self
            .provider
            .embed(texts.clone())
            .await
            .map_err(|e| anyhow!("Embedding batch of {} failed: {}", texts.len(), e))?;

        if vectors.len() != posts.len() {
            return Err(anyhow!(
                "Embedding provider returned {} vectors for {} posts",
                vectors.len(),
                posts.len()
            ));
        }

        let mut written = 0;
        for ((post, text), vector) in posts.iter().zip(texts.iter()).zip(vectors.iter()) {
            let (id, text, vector, model) =
                (post.platform_id.clone(), text.clone(), vector.clone(), model.clone());
            let stale = blocking(&self.store, move |store| {
                let mut stale = false;
                store.modify(&id, &mut |stored| {
                    // Text changed underneath us (e.g. no_url feedback): leave it
                    // for the next tick.
                    if stored.embedding.is_some() || stored.embedding_text() != text {
                        stale = true;
                        return;
                    }
                    stored.set_vector(&vector, &model);
                })?;
                Ok(stale)
            })
            .await?;

            if stale {
                warn!("Post {} changed during embedding, discarding vector", post.platform_id);
            } else {
                written += 1;
            }
        }

        info!("Embedded {} posts with {}", written, model);
        Ok(BatchOutcome::Embedded(written))
    }
}
