//! ============================================================================
//! Relevance Scorer
//! ============================================================================
//! Scores every embedded-but-unscored post by cosine similarity to the
//! current interest profile. The profile is rebuilt from the store each tick:
//! liked posts pull towards themselves, negatively weighted posts push away.
//! ============================================================================

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::db::{blocking, Post, PostStore};
use crate::platform::{PlatformClient, Visibility};
use crate::vector::{build_profile, cosine_similarity, is_usable, WeightedVector};

/// Profile from the store's weighted posts. Posts whose vector cannot be
/// decoded are skipped.
pub fn current_profile(store: &dyn PostStore) -> Result<Vec<f64>> {
    let mut positive = Vec::new();
    let mut negative = Vec::new();

    for post in store.weighted_posts()? {
        let vector = match post.vector() {
            Ok(Some(v)) if !v.is_empty() => v,
            Ok(_) => continue,
            Err(e) => {
                warn!("Skipping profile example {}: {}", post.platform_id, e);
                continue;
            }
        };

        if post.liked {
            positive.push(WeightedVector::new(vector.clone(), 1.0));
        }
        if let Some(weight) = post.negative_weight {
            negative.push(WeightedVector::new(vector, weight));
        }
    }

    debug!(
        "Building profile from {} positive / {} negative examples",
        positive.len(),
        negative.len()
    );
    Ok(build_profile(&positive, &negative))
}

/// Automatic boosting of high-scoring posts
#[derive(Debug, Clone)]
pub struct BoostPolicy {
    pub enabled: bool,
    /// Boost when the score is strictly above this
    pub threshold: f64,
}

impl Default for BoostPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreOutcome {
    pub scored: usize,
    pub skipped: usize,
    pub boosted: usize,
    /// No usable profile; nothing was attempted
    pub no_profile: bool,
}

pub struct RelevanceScorer {
    store: Arc<dyn PostStore>,
    platform: Arc<dyn PlatformClient>,
    boost: BoostPolicy,
}

impl RelevanceScorer {
    pub fn new(store: Arc<dyn PostStore>, platform: Arc<dyn PlatformClient>, boost: BoostPolicy) -> Self {
        Self { store, platform, boost }
    }

    pub async fn tick(&self) -> Result<ScoreOutcome> {
        let pending = blocking(&self.store, |store| store.posts_pending_score()).await?;
        if pending.is_empty() {
            return Ok(ScoreOutcome::default());
        }

        let profile = blocking(&self.store, |store| current_profile(store)).await?;
        if !is_usable(&profile) {
            debug!("No usable interest profile yet, {} posts wait", pending.len());
            return Ok(ScoreOutcome {
                no_profile: true,
                ..Default::default()
            });
        }

        let mut outcome = ScoreOutcome::default();
        for post in pending {
            let Some(mut score) = self.similarity(&post, &profile) else {
                outcome.skipped += 1;
                continue;
            };

            if self.boost.enabled && score > self.boost.threshold {
                match self.platform.boost(&post.platform_id, Visibility::Private).await {
                    Ok(()) => outcome.boosted += 1,
                    Err(e) => {
                        warn!("Boost of {} failed, demoting: {}", post.platform_id, e);
                        score = f64::NEG_INFINITY;
                    }
                }
            }

            let id = post.platform_id.clone();
            let expected = post.embedding.clone();
            let stored = blocking(&self.store, move |store| {
                store.modify(&id, &mut |p| {
                    // Vector may have been cleared by feedback since we read it
                    if p.embedding == expected {
                        p.score = Some(score);
                    }
                })
            })
            .await?;
            if stored.map(|p| p.score == Some(score)).unwrap_or(false) {
                outcome.scored += 1;
            }
        }

        info!(
            "Scored {} posts ({} skipped, {} boosted)",
            outcome.scored, outcome.skipped, outcome.boosted
        );
        Ok(outcome)
    }

    fn similarity(&self, post: &Post, profile: &[f64]) -> Option<f64> {
        let vector = match post.vector() {
            Ok(Some(v)) => v,
            Ok(None) => return None,
            Err(e) => {
                warn!("Post {} has an unreadable vector: {}", post.platform_id, e);
                return None;
            }
        };

        match cosine_similarity(&vector, profile) {
            Ok(score) => Some(score),
            Err(e) => {
                warn!("Not scoring post {}: {}", post.platform_id, e);
                None
            }
        }
    }
}
