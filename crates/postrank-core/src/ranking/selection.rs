//! ============================================================================
//! Selection Scheduler - act on the best unacted post
//! ============================================================================
//! Per tick: check the daily cap, pick the highest-scored candidate, wait the
//! configured delay, claim it with `mark_acted_upon`, then hand its text
//! (with the linked article, unless `no_url` is set) to the generator. The claim happens before generation, so a generator
//! failure leaves the post marked and it is not retried.
//! ============================================================================

use anyhow::{anyhow, Result};
use chrono::{Local, TimeZone};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::commentary::CommentaryGenerator;
use super::schedule::DelayStrategy;
use crate::db::{blocking, PostStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionOutcome {
    NoCandidate,
    DailyCapReached,
    /// Someone else claimed the post during the delay
    AlreadyTaken { platform_id: String },
    /// Post had no topic text; marked so it is not picked again
    SkippedBlank { platform_id: String },
    Selected { platform_id: String, generated: bool },
}

pub struct SelectionScheduler {
    store: Arc<dyn PostStore>,
    generator: Arc<dyn CommentaryGenerator>,
    delay: DelayStrategy,
    max_per_day: Option<usize>,
}

impl SelectionScheduler {
    pub fn new(
        store: Arc<dyn PostStore>,
        generator: Arc<dyn CommentaryGenerator>,
        delay: DelayStrategy,
        max_per_day: Option<usize>,
    ) -> Self {
        Self {
            store,
            generator,
            delay,
            max_per_day,
        }
    }

    pub async fn tick(&self) -> Result<SelectionOutcome> {
        if let Some(max) = self.max_per_day {
            let since = start_of_local_day_ms()?;
            let acted_today = blocking(&self.store, move |store| store.count_acted_since(since)).await?;
            if acted_today >= max {
                debug!("Daily cap of {} reached", max);
                return Ok(SelectionOutcome::DailyCapReached);
            }
        }

        let best = blocking(&self.store, |store| store.ranked_candidates(1)).await?;
        let Some(candidate) = best.into_iter().next() else {
            debug!("No selection candidate");
            return Ok(SelectionOutcome::NoCandidate);
        };

        let delay = self
            .delay
            .delay_from(Local::now().naive_local(), &mut rand::thread_rng())?;
        if !delay.is_zero() {
            info!(
                "Selected post {} (score {:?}), acting in {:?}",
                candidate.platform_id, candidate.score, delay
            );
            tokio::time::sleep(delay).await;
        }

        let platform_id = candidate.platform_id.clone();
        let id = platform_id.clone();
        if !blocking(&self.store, move |store| store.mark_acted_upon(&id)).await? {
            info!("Post {} was already acted upon", platform_id);
            return Ok(SelectionOutcome::AlreadyTaken { platform_id });
        }

        let topic = candidate.embedding_text();
        let topic = topic.trim();
        if topic.is_empty() {
            info!("Post {} has no topic text, skipping", platform_id);
            return Ok(SelectionOutcome::SkippedBlank { platform_id });
        }

        let generated = match self.generator.generate(topic).await {
            Ok(output) => {
                info!("Generated output for post {} ({} chars)", platform_id, output.len());
                true
            }
            Err(e) => {
                warn!("Generation for post {} failed, post stays marked: {}", platform_id, e);
                false
            }
        };

        Ok(SelectionOutcome::Selected { platform_id, generated })
    }
}

fn start_of_local_day_ms() -> Result<i64> {
    let midnight = Local::now().date_naive().and_time(chrono::NaiveTime::MIN);
    Local
        .from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.timestamp_millis())
        .ok_or_else(|| anyhow!("Local midnight does not exist"))
}
