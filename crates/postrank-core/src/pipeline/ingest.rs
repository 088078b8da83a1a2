//! Turning platform statuses into stored posts.

use std::collections::HashSet;
use tracing::{debug, warn};

use crate::db::Post;
use crate::platform::html::html_to_text;
use crate::platform::{ArticleSource, Status};

/// Build a post record, pulling the linked article when the status has a card.
/// Article failures are logged and the post is kept without one.
pub async fn post_from_status(status: &Status, articles: &dyn ArticleSource) -> Post {
    let mut post = Post::new(&status.id, &status.account.acct, html_to_text(&status.content));
    post.url = status.url.clone();
    post.created_at = status.created_at.timestamp_millis();

    if let Some(card) = &status.card {
        match articles.article_text(&card.url).await {
            Ok(Some(text)) => {
                debug!("Extracted {} chars of article text for {}", text.len(), status.id);
                post.article_text = Some(text);
            }
            Ok(None) => debug!("No article text at {}", card.url),
            Err(e) => warn!("Article extraction failed for {}: {}", card.url, e),
        }
    }

    post
}

/// Accounts whose posts are never stored; matched on `acct` and `username`
#[derive(Debug, Clone, Default)]
pub struct AccountFilter {
    excluded: HashSet<String>,
}

impl AccountFilter {
    pub fn new<I, S>(accounts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            excluded: accounts
                .into_iter()
                .map(|a| a.as_ref().trim().trim_start_matches('@').to_lowercase())
                .filter(|a| !a.is_empty())
                .collect(),
        }
    }

    pub fn is_excluded(&self, status: &Status) -> bool {
        self.excluded.contains(&status.account.acct.to_lowercase())
            || self.excluded.contains(&status.account.username.to_lowercase())
    }
}
