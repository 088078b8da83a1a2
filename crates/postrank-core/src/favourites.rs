//! ============================================================================
//! Favourites Collector - operator favourites become positive examples
//! ============================================================================
//! Polls the account's favourites. Known posts get `liked` set; unknown ones
//! are stored first (with article text) and then marked.
//! ============================================================================

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};

use crate::db::{blocking, InsertOutcome, PostStore};
use crate::pipeline::ingest::post_from_status;
use crate::platform::{ArticleSource, PlatformClient};

/// Favourites fetched per poll
pub const FAVOURITES_PAGE: u32 = 40;

pub struct FavouritesCollector {
    store: Arc<dyn PostStore>,
    platform: Arc<dyn PlatformClient>,
    articles: Arc<dyn ArticleSource>,
}

impl FavouritesCollector {
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

    /// Returns how many posts were newly marked as liked
    pub async fn tick(&self) -> Result<usize> {
        let favourites = self.platform.favourites(FAVOURITES_PAGE).await?;
        let mut marked = 0;

        for status in favourites {
            let id = status.id.clone();
            let known = blocking(&self.store, move |store| store.find_by_platform_id(&id)).await?;
            if known.is_none() {
                let mut post = post_from_status(&status, self.articles.as_ref()).await;
                post.liked = true;
                if blocking(&self.store, move |store| store.insert_if_absent(&post)).await?
                    == InsertOutcome::Inserted
                {
                    debug!("Stored favourite {}", status.id);
                    marked += 1;
                    continue;
                }
            }

            let id = status.id.clone();
            let newly = blocking(&self.store, move |store| {
                let mut newly = false;
                store.modify(&id, &mut |post| {
                    if !post.liked {
                        post.liked = true;
                        newly = true;
                    }
                })?;
                Ok(newly)
            })
            .await?;
            if newly {
                marked += 1;
            }
        }

        if marked > 0 {
            info!("Marked {} favourites as liked", marked);
        }
        Ok(marked)
    }
}
