//! ============================================================================
//! Feedback Processor - operator "negativ" commands
//! ============================================================================
//! A direct message containing `negativ <weight> [no_url]` in reply to a post
//! marks that post as a negative example:
//! - the post is loaded, or fetched from the platform and stored
//! - `no_url` newly set drops the article text from the embedding input and
//!   clears the vector so it is re-embedded
//! - the weight is stored and the interest profile is rebuilt
//! - any boost of the post is withdrawn and the command message deleted,
//!   both best-effort
//! ============================================================================

use anyhow::{anyhow, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::{blocking, InsertOutcome, Post, PostStore};
use crate::pipeline::ingest::post_from_status;
use crate::platform::html::html_to_text;
use crate::platform::{ArticleSource, PlatformClient, Status};
use crate::ranking::scorer::current_profile;
use crate::types::FeedbackError;
use crate::vector::magnitude;

/// Keyword that marks a message as feedback
pub const FEEDBACK_KEYWORD: &str = "negativ";

const NO_URL_MARKER: &[u8] = b"no_url";

/// A parsed feedback command
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Feedback {
    pub weight: f64,
    pub no_url: bool,
}

/// What processing a feedback message did
#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackOutcome {
    /// Message was not a feedback command
    NotFeedback,
    /// Command was malformed; nothing changed
    Invalid(FeedbackError),
    Applied {
        platform_id: String,
        weight: f64,
        no_url: bool,
        vector_cleared: bool,
    },
}

fn remove_no_url(segment: &str) -> String {
    let bytes = segment.as_bytes();
    let mut out = String::with_capacity(segment.len());
    let mut i = 0;
    let mut start = 0;
    while i + NO_URL_MARKER.len() <= bytes.len() {
        if bytes[i..i + NO_URL_MARKER.len()].eq_ignore_ascii_case(NO_URL_MARKER) {
            out.push_str(&segment[start..i]);
            i += NO_URL_MARKER.len();
            start = i;
        } else {
            i += 1;
        }
    }
    out.push_str(&segment[start..]);
    out
}

fn contains_no_url(text: &str) -> bool {
    text.as_bytes()
        .windows(NO_URL_MARKER.len())
        .any(|w| w.eq_ignore_ascii_case(NO_URL_MARKER))
}

/// Parse a feedback command from plain message text.
///
/// `Ok(None)` when the text does not contain the keyword. The weight is the
/// text after the last keyword with any `no_url` marker removed.
pub fn parse_feedback(text: &str) -> Result<Option<Feedback>, FeedbackError> {
    if !text.contains(FEEDBACK_KEYWORD) {
        return Ok(None);
    }

    let last = text.rsplit(FEEDBACK_KEYWORD).next().unwrap_or_default();
    let cleaned = remove_no_url(last);
    let cleaned = cleaned.trim();

    let weight: f64 = cleaned
        .parse()
        .map_err(|_| FeedbackError::InvalidWeight(cleaned.to_string()))?;
    if !weight.is_finite() {
        return Err(FeedbackError::InvalidWeight(cleaned.to_string()));
    }

    Ok(Some(Feedback {
        weight,
        no_url: contains_no_url(text),
    }))
}

pub struct FeedbackProcessor {
    store: Arc<dyn PostStore>,
    platform: Arc<dyn PlatformClient>,
    articles: Arc<dyn ArticleSource>,
}

impl FeedbackProcessor {
    pub fn new(
        store: Arc<dyn PostStore>,
        platform: Arc<dyn PlatformClient>,
        articles: Arc<dyn ArticleSource>,
    ) -> Self {
        Self {
            store,
            platform,
            articles,
        }
    }

    /// Handle a direct message. Storage errors propagate; malformed commands
    /// are reported in the outcome.
    pub async fn process_message(&self, message: &Status) -> Result<FeedbackOutcome> {
        let text = html_to_text(&message.content);

        let feedback = match parse_feedback(&text) {
            Ok(Some(f)) => f,
            Ok(None) => return Ok(FeedbackOutcome::NotFeedback),
            Err(e) => {
                warn!("Ignoring feedback message {}: {}", message.id, e);
                return Ok(FeedbackOutcome::Invalid(e));
            }
        };

        let Some(target) = message.in_reply_to_id.as_deref() else {
            warn!("Feedback message {} is not a reply", message.id);
            return Ok(FeedbackOutcome::Invalid(FeedbackError::MissingTarget));
        };

        let outcome = self.apply(target, feedback).await?;

        if let Err(e) = self.platform.delete_status(&message.id).await {
            warn!("Could not delete feedback message {}: {}", message.id, e);
        }

        Ok(outcome)
    }

    /// Apply feedback to a post by platform id
    pub async fn apply(&self, platform_id: &str, feedback: Feedback) -> Result<FeedbackOutcome> {
        self.load_or_fetch(platform_id).await?;

        let id = platform_id.to_string();
        let (updated, vector_cleared) = blocking(&self.store, move |store| {
            let mut vector_cleared = false;
            let updated = store.modify(&id, &mut |post| {
                if feedback.no_url && !post.no_url {
                    post.no_url = true;
                    if post.embedding.is_some() {
                        vector_cleared = true;
                    }
                    post.clear_vector();
                }
                post.negative_weight = Some(feedback.weight);
            })?;
            Ok((updated, vector_cleared))
        })
        .await?;
        let updated =
            updated.ok_or_else(|| anyhow!("Post {} vanished while applying feedback", platform_id))?;

        info!(
            "Negative feedback {} on post {} (no_url: {})",
            feedback.weight, platform_id, updated.no_url
        );

        if let Err(e) = self.platform.unboost(platform_id).await {
            warn!("Unboost of {} failed: {}", platform_id, e);
        }

        self.log_profile().await;

        Ok(FeedbackOutcome::Applied {
            platform_id: platform_id.to_string(),
            weight: feedback.weight,
            no_url: updated.no_url,
            vector_cleared,
        })
    }

    /// Resolve a post by its public URL, then apply feedback to it
    pub async fn apply_to_url(&self, url: &str, feedback: Feedback) -> Result<FeedbackOutcome> {
        let status = self
            .platform
            .search_status(url)
            .await?
            .ok_or_else(|| anyhow!("No status found for {}", url))?;

        self.store_status(&status).await?;
        self.apply(&status.id, feedback).await
    }

    async fn load_or_fetch(&self, platform_id: &str) -> Result<Post> {
        let id = platform_id.to_string();
        if let Some(post) = blocking(&self.store, move |store| store.find_by_platform_id(&id)).await? {
            return Ok(post);
        }

        info!("Post {} not stored yet, fetching from platform", platform_id);
        let status = self.platform.fetch_status(platform_id).await?;
        self.store_status(&status).await
    }

    async fn store_status(&self, status: &Status) -> Result<Post> {
        let post = post_from_status(status, self.articles.as_ref()).await;
        blocking(&self.store, move |store| match store.insert_if_absent(&post)? {
            InsertOutcome::Inserted => Ok(post),
            InsertOutcome::AlreadyExists => store
                .find_by_platform_id(&post.platform_id)?
                .ok_or_else(|| anyhow!("Post {} missing after insert race", post.platform_id)),
        })
        .await
    }

    async fn log_profile(&self) {
        match blocking(&self.store, |store| current_profile(store)).await {
            Ok(profile) => info!(
                "Interest profile rebuilt: {} dimensions, magnitude {:.3}",
                profile.len(),
                magnitude(&profile)
            ),
            Err(e) => warn!("Failed to rebuild interest profile: {}", e),
        }
    }
}
