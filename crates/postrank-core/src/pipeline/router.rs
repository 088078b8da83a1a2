//! ============================================================================
//! Ingestion Router - decode stream payloads and dispatch them
//! ============================================================================
//! Payloads are decoded into a tagged event, trying in order: status object,
//! conversation object, bare numeric id (delete). Anything else is Unknown.
//!
//! Public stream: statuses are stored (deduplicated by platform id), deletes
//! are only logged. Direct stream: messages containing the feedback keyword
//! go to the feedback processor. Decode problems never fail the caller;
//! storage problems do.
//! ============================================================================

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::ingest::{post_from_status, AccountFilter};
use crate::db::{blocking, InsertOutcome, PostStore};
use crate::feedback::{FeedbackOutcome, FeedbackProcessor, FEEDBACK_KEYWORD};
use crate::platform::html::html_to_text;
use crate::platform::{ArticleSource, Conversation, Status};
use crate::types::StreamKind;

/// A decoded stream payload
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    NewPost(Box<Status>),
    Conversation(Box<Conversation>),
    Delete(u64),
    Unknown(String),
}

/// Decode a payload string. Never fails; unrecognised input is `Unknown`.
pub fn decode_event(payload: &str) -> StreamEvent {
    if let Ok(status) = serde_json::from_str::<Status>(payload) {
        return StreamEvent::NewPost(Box::new(status));
    }
    if let Ok(conversation) = serde_json::from_str::<Conversation>(payload) {
        return StreamEvent::Conversation(Box::new(conversation));
    }
    let bare = payload.trim().trim_matches('"');
    if let Ok(id) = bare.parse::<u64>() {
        return StreamEvent::Delete(id);
    }
    StreamEvent::Unknown(payload.to_string())
}

/// What routing did with a payload
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    Stored { platform_id: String },
    Duplicate { platform_id: String },
    Excluded { account: String },
    Deleted { id: u64 },
    Feedback(FeedbackOutcome),
    Ignored,
}

/// Receives payloads from a stream consumer
#[async_trait]
pub trait PayloadHandler: Send + Sync {
    async fn handle(&self, kind: StreamKind, payload: String) -> Result<()>;
}

pub struct IngestionRouter {
    store: Arc<dyn PostStore>,
    articles: Arc<dyn ArticleSource>,
    feedback: Arc<FeedbackProcessor>,
    filter: AccountFilter,
}

impl IngestionRouter {
    pub fn new(
        store: Arc<dyn PostStore>,
        articles: Arc<dyn ArticleSource>,
        feedback: Arc<FeedbackProcessor>,
        filter: AccountFilter,
    ) -> Self {
        Self {
            store,
            articles,
            feedback,
            filter,
        }
    }

    pub async fn route(&self, kind: StreamKind, payload: &str) -> Result<RouteOutcome> {
        let event = decode_event(payload);
        match (kind, event) {
            (StreamKind::Public, StreamEvent::NewPost(status)) => self.ingest(&status).await,
            (StreamKind::Public, StreamEvent::Delete(id)) => {
                info!("Post {} deleted upstream (kept locally)", id);
                Ok(RouteOutcome::Deleted { id })
            }
            (StreamKind::Direct, StreamEvent::NewPost(status)) => self.direct_message(&status).await,
            (StreamKind::Direct, StreamEvent::Conversation(conversation)) => {
                match conversation.last_status.as_ref() {
                    Some(status) => self.direct_message(status).await,
                    None => {
                        debug!("Conversation {} has no last status", conversation.id);
                        Ok(RouteOutcome::Ignored)
                    }
                }
            }
            (kind, StreamEvent::Unknown(raw)) => {
                warn!(
                    "Undecodable {} payload dropped: {}",
                    kind,
                    raw.chars().take(120).collect::<String>()
                );
                Ok(RouteOutcome::Ignored)
            }
            (kind, other) => {
                debug!("Ignoring {} event on {} stream", event_name(&other), kind);
                Ok(RouteOutcome::Ignored)
            }
        }
    }

    async fn ingest(&self, status: &Status) -> Result<RouteOutcome> {
        if self.filter.is_excluded(status) {
            debug!("Skipping post {} from excluded account {}", status.id, status.account.acct);
            return Ok(RouteOutcome::Excluded {
                account: status.account.acct.clone(),
            });
        }

        // Cheap pre-check; insert_if_absent is what actually guarantees uniqueness
        let id = status.id.clone();
        if blocking(&self.store, move |store| store.find_by_platform_id(&id))
            .await?
            .is_some()
        {
            return Ok(RouteOutcome::Duplicate {
                platform_id: status.id.clone(),
            });
        }

        let post = post_from_status(status, self.articles.as_ref()).await;
        let record = post.clone();
        match blocking(&self.store, move |store| store.insert_if_absent(&record)).await? {
            InsertOutcome::Inserted => {
                debug!("Stored post {} from {}", post.platform_id, post.account);
                Ok(RouteOutcome::Stored {
                    platform_id: post.platform_id,
                })
            }
            InsertOutcome::AlreadyExists => Ok(RouteOutcome::Duplicate {
                platform_id: post.platform_id,
            }),
        }
    }

    async fn direct_message(&self, status: &Status) -> Result<RouteOutcome> {
        let text = html_to_text(&status.content);
        if !text.contains(FEEDBACK_KEYWORD) {
            debug!("Direct message {} is not feedback", status.id);
            return Ok(RouteOutcome::Ignored);
        }
        let outcome = self.feedback.process_message(status).await?;
        Ok(RouteOutcome::Feedback(outcome))
    }
}

fn event_name(event: &StreamEvent) -> &'static str {
    match event {
        StreamEvent::NewPost(_) => "status",
        StreamEvent::Conversation(_) => "conversation",
        StreamEvent::Delete(_) => "delete",
        StreamEvent::Unknown(_) => "unknown",
    }
}

#[async_trait]
impl PayloadHandler for IngestionRouter {
    async fn handle(&self, kind: StreamKind, payload: String) -> Result<()> {
        self.route(kind, &payload).await.map(|_| ())
    }
}
