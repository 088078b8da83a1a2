//! ============================================================================
//! Runtime - wire every component together and run until Ctrl-C
//! ============================================================================
//! Two supervised stream subscriptions (public, direct) share one worker
//! pool. The periodic jobs (embedding, scoring, selection, favourites) each
//! run in their own task with skip-if-busy ticks.
//! ============================================================================

use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::Config;
use crate::db::{PostDb, PostStore};
use crate::embedding::{EmbeddingBatcher, EmbeddingProvider, EmbeddingService};
use crate::favourites::FavouritesCollector;
use crate::feedback::FeedbackProcessor;
use crate::jobs::run_periodic;
use crate::pipeline::{AccountFilter, IngestionRouter, StreamSupervisor, WorkerPool};
use crate::platform::{
    ArticleSource, EventSource, HttpArticleSource, MastodonClient, PlatformClient, WebSocketSource,
};
use crate::ranking::{CommentaryGenerator, LoggingGenerator, RelevanceScorer, SelectionScheduler};
use crate::types::StreamKind;

/// Every long-lived component, built from configuration
pub struct Pipeline {
    config: Config,
    pub store: Arc<dyn PostStore>,
    pub platform: Arc<dyn PlatformClient>,
    pub feedback: Arc<FeedbackProcessor>,
    supervisor: Arc<StreamSupervisor>,
    batcher: Arc<EmbeddingBatcher>,
    scorer: Arc<RelevanceScorer>,
    selector: Arc<SelectionScheduler>,
    favourites: Arc<FavouritesCollector>,
}

impl Pipeline {
    /// Build the production pipeline: redb store, Mastodon client and stream,
    /// HTTP embedding service, logging generator.
    pub fn from_config(config: Config) -> Result<Self> {
        let store: Arc<dyn PostStore> = Arc::new(PostDb::open(config.db_path.as_deref())?);
        let platform: Arc<dyn PlatformClient> = Arc::new(MastodonClient::new(
            &config.instance_url,
            config.access_token.clone(),
            config.http_timeout,
        )?);
        let source: Arc<dyn EventSource> = Arc::new(WebSocketSource::new(
            &config.instance_url,
            config.access_token.clone(),
        ));
        let articles: Arc<dyn ArticleSource> = Arc::new(HttpArticleSource::new(config.http_timeout)?);

        let api_key = config
            .embedding
            .api_key
            .clone()
            .ok_or_else(|| anyhow!("POSTRANK_EMBEDDING_API_KEY must be set to run the pipeline"))?;
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(
            EmbeddingService::new_custom(
                api_key,
                config.embedding.base_url.clone(),
                config.embedding.model.clone(),
                config.embedding.dimensions,
            )
            .with_timeout(config.http_timeout)?,
        );

        Ok(Self::assemble(config, store, platform, source, articles, provider, Arc::new(LoggingGenerator)))
    }

    /// Build from explicit parts
    pub fn assemble(
        config: Config,
        store: Arc<dyn PostStore>,
        platform: Arc<dyn PlatformClient>,
        source: Arc<dyn EventSource>,
        articles: Arc<dyn ArticleSource>,
        provider: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn CommentaryGenerator>,
    ) -> Self {
        let feedback = Arc::new(FeedbackProcessor::new(
            store.clone(),
            platform.clone(),
            articles.clone(),
        ));
        let router = Arc::new(IngestionRouter::new(
            store.clone(),
            articles.clone(),
            feedback.clone(),
            AccountFilter::new(&config.excluded_accounts),
        ));
        let supervisor = Arc::new(StreamSupervisor::new(
            source,
            router,
            WorkerPool::new(config.worker_pool_size),
            config.supervisor.clone(),
        ));
        let batcher = Arc::new(EmbeddingBatcher::new(
            store.clone(),
            provider,
            config.embedding.quota.clone(),
        ));
        let scorer = Arc::new(RelevanceScorer::new(
            store.clone(),
            platform.clone(),
            config.boost.clone(),
        ));
        let selector = Arc::new(SelectionScheduler::new(
            store.clone(),
            generator,
            config.selection_delay.clone(),
            config.max_actions_per_day,
        ));
        let favourites = Arc::new(FavouritesCollector::new(store.clone(), platform.clone(), articles));

        Self {
            config,
            store,
            platform,
            feedback,
            supervisor,
            batcher,
            scorer,
            selector,
            favourites,
        }
    }

    /// Start every task. The handles run until aborted.
    pub fn spawn(&self) -> Vec<JoinHandle<()>> {
        let mut handles = vec![
            self.supervisor.spawn(StreamKind::Public),
            self.supervisor.spawn(StreamKind::Direct),
        ];

        let batcher = self.batcher.clone();
        handles.push(tokio::spawn(run_periodic("embedding", self.config.embed_interval, move || {
            let batcher = batcher.clone();
            async move { batcher.tick().await.map(|_| ()) }
        })));

        let scorer = self.scorer.clone();
        handles.push(tokio::spawn(run_periodic("scoring", self.config.score_interval, move || {
            let scorer = scorer.clone();
            async move { scorer.tick().await.map(|_| ()) }
        })));

        let selector = self.selector.clone();
        handles.push(tokio::spawn(run_periodic("selection", self.config.selection_interval, move || {
            let selector = selector.clone();
            async move { selector.tick().await.map(|_| ()) }
        })));

        if let Some(period) = self.config.favourites_interval {
            let favourites = self.favourites.clone();
            handles.push(tokio::spawn(run_periodic("favourites", period, move || {
                let favourites = favourites.clone();
                async move { favourites.tick().await.map(|_| ()) }
            })));
        }

        handles
    }

    /// Run until Ctrl-C
    pub async fn run(self) -> Result<()> {
        info!("Starting postrank pipeline for {}", self.config.instance_url);
        let handles = self.spawn();

        tokio::signal::ctrl_c()
            .await
            .map_err(|e| anyhow!("Failed to listen for shutdown signal: {}", e))?;

        info!("Shutting down");
        for handle in handles {
            handle.abort();
        }
        Ok(())
    }
}
