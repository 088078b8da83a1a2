//! End-to-end scenarios over a real redb store with fake platform and
//! embedding provider.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use postrank_core::embedding::{BatchOutcome, EmbeddingBatcher, EmbeddingProvider, QuotaPolicy};
use postrank_core::favourites::FavouritesCollector;
use postrank_core::pipeline::{AccountFilter, IngestionRouter, RouteOutcome};
use postrank_core::platform::{Account, Card, NoArticles, PlatformClient, Status, Visibility};
use postrank_core::ranking::{
    BoostPolicy, DelayStrategy, LoggingGenerator, RelevanceScorer, SelectionOutcome,
    SelectionScheduler,
};
use postrank_core::{
    Feedback, FeedbackError, FeedbackOutcome, FeedbackProcessor, Post, PostDb, PostStore,
    StreamKind,
};

// ----------------------------------------------------------------------------
// Fakes
// ----------------------------------------------------------------------------

#[derive(Default)]
struct FakePlatform {
    statuses: Mutex<HashMap<String, Status>>,
    favourites: Mutex<Vec<Status>>,
    boosted: Mutex<Vec<String>>,
    unboosted: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
    fail_boost: bool,
    fail_unboost: bool,
}

#[async_trait]
impl PlatformClient for FakePlatform {
    async fn fetch_status(&self, id: &str) -> Result<Status> {
        self.statuses
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("404 status {}", id))
    }

    async fn delete_status(&self, id: &str) -> Result<()> {
        self.deleted.lock().unwrap().push(id.to_string());
        Ok(())
    }

    async fn boost(&self, id: &str, visibility: Visibility) -> Result<()> {
        assert_eq!(visibility, Visibility::Private);
        if self.fail_boost {
            return Err(anyhow!("422 boost rejected"));
        }
        self.boosted.lock().unwrap().push(id.to_string());
        Ok(())
    }

    async fn unboost(&self, id: &str) -> Result<()> {
        if self.fail_unboost {
            return Err(anyhow!("500 unboost failed"));
        }
        self.unboosted.lock().unwrap().push(id.to_string());
        Ok(())
    }

    async fn search_status(&self, url: &str) -> Result<Option<Status>> {
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .values()
            .find(|s| s.url.as_deref() == Some(url))
            .cloned())
    }

    async fn favourites(&self, _limit: u32) -> Result<Vec<Status>> {
        Ok(self.favourites.lock().unwrap().clone())
    }
}

/// Two-dimensional "topic" embedding: how much a text is about rust vs cats
struct TopicEmbedder;

#[async_trait]
impl EmbeddingProvider for TopicEmbedder {
    fn model(&self) -> &str {
        "topic-test"
    }

    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let t = t.to_lowercase();
                vec![
                    t.matches("rust").count() as f32 + 0.1,
                    t.matches("cat").count() as f32 + 0.1,
                ]
            })
            .collect())
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    db: Arc<PostDb>,
    platform: Arc<FakePlatform>,
}

impl Harness {
    fn new(platform: FakePlatform) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(PostDb::open(Some(dir.path().join("it.redb").to_str().unwrap())).unwrap());
        Self {
            _dir: dir,
            db,
            platform: Arc::new(platform),
        }
    }

    fn feedback(&self) -> Arc<FeedbackProcessor> {
        Arc::new(FeedbackProcessor::new(
            self.db.clone(),
            self.platform.clone(),
            Arc::new(NoArticles),
        ))
    }

    fn router(&self, excluded: &[&str]) -> IngestionRouter {
        IngestionRouter::new(
            self.db.clone(),
            Arc::new(NoArticles),
            self.feedback(),
            AccountFilter::new(excluded),
        )
    }

    fn scorer(&self, boost: BoostPolicy) -> RelevanceScorer {
        RelevanceScorer::new(self.db.clone(), self.platform.clone(), boost)
    }

    fn post(&self, id: &str) -> Post {
        self.db.find_by_platform_id(id).unwrap().unwrap()
    }
}

fn status(id: &str, acct: &str, content: &str) -> Status {
    Status {
        id: id.to_string(),
        url: Some(format!("https://m.example/@{}/{}", acct, id)),
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap(),
        account: Account {
            id: format!("acc-{}", acct),
            username: acct.split('@').next().unwrap().to_string(),
            acct: acct.to_string(),
        },
        content: content.to_string(),
        visibility: Some("public".to_string()),
        card: None,
        in_reply_to_id: None,
    }
}

fn dm(id: &str, reply_to: &str, text: &str) -> Status {
    let mut s = status(id, "operator", &format!("<p>{}</p>", text));
    s.visibility = Some("direct".to_string());
    s.in_reply_to_id = Some(reply_to.to_string());
    s
}

fn embedded(id: &str, text: &str, vector: &[f32]) -> Post {
    let mut post = Post::new(id, "alice", text);
    post.set_vector(vector, "topic-test");
    post
}

// ----------------------------------------------------------------------------
// Ingestion
// ----------------------------------------------------------------------------

#[tokio::test]
async fn public_post_is_stored_as_plain_text_without_vector() {
    let h = Harness::new(FakePlatform::default());
    let router = h.router(&[]);
    let payload = serde_json::to_string(&status("123", "alice", "<p>Hello #ai</p>")).unwrap();

    let outcome = router.route(StreamKind::Public, &payload).await.unwrap();
    assert_eq!(outcome, RouteOutcome::Stored { platform_id: "123".into() });

    let post = h.post("123");
    assert_eq!(post.text, "Hello #ai");
    assert!(post.embedding.is_none());
    assert!(post.score.is_none());
    assert_eq!(post.created_at, Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap().timestamp_millis());

    let again = router.route(StreamKind::Public, &payload).await.unwrap();
    assert_eq!(again, RouteOutcome::Duplicate { platform_id: "123".into() });
    assert_eq!(h.db.list_posts().unwrap().len(), 1);
}

#[tokio::test]
async fn excluded_accounts_and_noise_are_dropped() {
    let h = Harness::new(FakePlatform::default());
    let router = h.router(&["spam@bots.example"]);

    let spam = serde_json::to_string(&status("1", "spam@bots.example", "<p>buy</p>")).unwrap();
    assert_eq!(
        router.route(StreamKind::Public, &spam).await.unwrap(),
        RouteOutcome::Excluded { account: "spam@bots.example".into() }
    );
    assert_eq!(
        router.route(StreamKind::Public, "98765").await.unwrap(),
        RouteOutcome::Deleted { id: 98765 }
    );
    assert_eq!(
        router.route(StreamKind::Public, "{not json").await.unwrap(),
        RouteOutcome::Ignored
    );
    assert!(h.db.list_posts().unwrap().is_empty());
}

#[tokio::test]
async fn direct_message_without_keyword_is_ignored() {
    let h = Harness::new(FakePlatform::default());
    let router = h.router(&[]);
    let payload = serde_json::to_string(&dm("900", "1", "thanks!")).unwrap();

    assert_eq!(
        router.route(StreamKind::Direct, &payload).await.unwrap(),
        RouteOutcome::Ignored
    );
    assert!(h.platform.deleted.lock().unwrap().is_empty());
}

// ----------------------------------------------------------------------------
// Feedback
// ----------------------------------------------------------------------------

#[tokio::test]
async fn no_url_feedback_clears_vector_and_unboosts() {
    let h = Harness::new(FakePlatform::default());
    let mut post = embedded("p1", "Some news", &[1.0, 0.0]);
    post.article_text = Some("Long article body".into());
    post.score = Some(0.8);
    h.db.insert_if_absent(&post).unwrap();

    let router = h.router(&[]);
    let payload = serde_json::to_string(&dm("900", "p1", "@bot negativ 3.5 no_url")).unwrap();
    let outcome = router.route(StreamKind::Direct, &payload).await.unwrap();

    assert_eq!(
        outcome,
        RouteOutcome::Feedback(FeedbackOutcome::Applied {
            platform_id: "p1".into(),
            weight: 3.5,
            no_url: true,
            vector_cleared: true,
        })
    );

    let stored = h.post("p1");
    assert!(stored.no_url);
    assert!(stored.embedding.is_none());
    assert!(stored.score.is_none());
    assert_eq!(stored.negative_weight, Some(3.5));
    assert_eq!(stored.embedding_text(), "Some news");
    assert_eq!(*h.platform.unboosted.lock().unwrap(), vec!["p1"]);
    assert_eq!(*h.platform.deleted.lock().unwrap(), vec!["900"]);
}

#[tokio::test]
async fn feedback_without_no_url_keeps_vector() {
    let h = Harness::new(FakePlatform {
        fail_unboost: true,
        ..Default::default()
    });
    h.db.insert_if_absent(&embedded("p1", "news", &[1.0, 0.0])).unwrap();

    let outcome = h
        .feedback()
        .process_message(&dm("901", "p1", "negativ 2"))
        .await
        .unwrap();

    assert!(matches!(outcome, FeedbackOutcome::Applied { vector_cleared: false, .. }));
    let stored = h.post("p1");
    assert!(stored.embedding.is_some());
    assert_eq!(stored.negative_weight, Some(2.0));
}

#[tokio::test]
async fn feedback_for_unknown_post_fetches_it() {
    let platform = FakePlatform::default();
    platform
        .statuses
        .lock()
        .unwrap()
        .insert("555".into(), status("555", "bob@other.example", "<p>remote post</p>"));
    let h = Harness::new(platform);

    h.feedback()
        .process_message(&dm("902", "555", "negativ 1"))
        .await
        .unwrap();

    let stored = h.post("555");
    assert_eq!(stored.text, "remote post");
    assert_eq!(stored.account, "bob@other.example");
    assert_eq!(stored.negative_weight, Some(1.0));
}

#[tokio::test]
async fn invalid_feedback_changes_nothing() {
    let h = Harness::new(FakePlatform::default());
    h.db.insert_if_absent(&embedded("p1", "news", &[1.0, 0.0])).unwrap();

    let outcome = h
        .feedback()
        .process_message(&dm("903", "p1", "negativ abc"))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        FeedbackOutcome::Invalid(FeedbackError::InvalidWeight("abc".into()))
    );
    assert!(h.post("p1").negative_weight.is_none());
    assert!(h.platform.deleted.lock().unwrap().is_empty());

    let mut orphan = dm("904", "x", "negativ 2");
    orphan.in_reply_to_id = None;
    assert_eq!(
        h.feedback().process_message(&orphan).await.unwrap(),
        FeedbackOutcome::Invalid(FeedbackError::MissingTarget)
    );
}

#[tokio::test]
async fn feedback_by_url_resolves_through_search() {
    let platform = FakePlatform::default();
    let target = status("777", "carol", "<p>found by url</p>");
    let url = target.url.clone().unwrap();
    platform.statuses.lock().unwrap().insert("777".into(), target);
    let h = Harness::new(platform);

    h.feedback()
        .apply_to_url(&url, Feedback { weight: 5.0, no_url: false })
        .await
        .unwrap();
    assert_eq!(h.post("777").negative_weight, Some(5.0));
}

// ----------------------------------------------------------------------------
// Scoring and selection
// ----------------------------------------------------------------------------

#[tokio::test]
async fn scorer_waits_for_a_profile() {
    let h = Harness::new(FakePlatform::default());
    h.db.insert_if_absent(&embedded("a", "rust", &[1.0, 0.0])).unwrap();

    let outcome = h.scorer(BoostPolicy::default()).tick().await.unwrap();
    assert!(outcome.no_profile);
    assert!(h.post("a").score.is_none());
}

#[tokio::test]
async fn scorer_skips_dimension_mismatch() {
    let h = Harness::new(FakePlatform::default());
    let mut liked = embedded("liked", "rust", &[1.0, 0.0]);
    liked.liked = true;
    h.db.insert_if_absent(&liked).unwrap();
    h.db.insert_if_absent(&embedded("odd", "3d", &[1.0, 0.0, 0.0])).unwrap();
    h.db.insert_if_absent(&embedded("ok", "rust again", &[0.5, 0.5])).unwrap();

    let outcome = h.scorer(BoostPolicy::default()).tick().await.unwrap();
    assert_eq!(outcome.skipped, 1);
    assert!(h.post("odd").score.is_none());
    assert!((h.post("ok").score.unwrap() - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-6);
}

#[tokio::test]
async fn negative_feedback_pushes_scores_down() {
    let h = Harness::new(FakePlatform::default());
    let mut liked = embedded("liked", "rust", &[1.0, 0.0]);
    liked.liked = true;
    h.db.insert_if_absent(&liked).unwrap();
    let mut disliked = embedded("disliked", "cats", &[0.0, 1.0]);
    disliked.negative_weight = Some(1.0);
    h.db.insert_if_absent(&disliked).unwrap();
    h.db.insert_if_absent(&embedded("cat-post", "more cats", &[0.0, 1.0])).unwrap();

    h.scorer(BoostPolicy::default()).tick().await.unwrap();
    assert!(h.post("cat-post").score.unwrap() < 0.0);
}

#[tokio::test]
async fn boost_above_threshold_and_failed_boost_demotes() {
    let ok = Harness::new(FakePlatform::default());
    let failing = Harness::new(FakePlatform {
        fail_boost: true,
        ..Default::default()
    });
    let boost = BoostPolicy {
        enabled: true,
        threshold: 0.5,
    };

    for h in [&ok, &failing] {
        let mut liked = embedded("liked", "rust", &[1.0, 0.0]);
        liked.liked = true;
        h.db.insert_if_absent(&liked).unwrap();
        h.db.insert_if_absent(&embedded("close", "rust", &[0.9, 0.1])).unwrap();
        h.db.insert_if_absent(&embedded("far", "cats", &[0.1, 0.9])).unwrap();
        h.scorer(boost.clone()).tick().await.unwrap();
    }

    let boosted = ok.platform.boosted.lock().unwrap().clone();
    assert!(boosted.contains(&"close".to_string()));
    assert!(!boosted.contains(&"far".to_string()));

    assert_eq!(failing.post("close").score, Some(f64::NEG_INFINITY));
    assert!(failing.post("far").score.unwrap().is_finite());
    let best = failing.db.ranked_candidates(1).unwrap();
    assert_eq!(best[0].platform_id, "far");
}

#[tokio::test]
async fn ingest_embed_score_select_end_to_end() {
    let h = Harness::new(FakePlatform::default());
    let router = h.router(&[]);

    for (id, html) in [
        ("1", "<p>Rust is great</p>"),
        ("2", "<p>Learning rust today</p>"),
        ("3", "<p>My cat sleeps</p>"),
    ] {
        let payload = serde_json::to_string(&status(id, "alice", html)).unwrap();
        router.route(StreamKind::Public, &payload).await.unwrap();
    }
    h.db.modify("1", &mut |p| p.liked = true).unwrap();

    let batcher = EmbeddingBatcher::new(h.db.clone(), Arc::new(TopicEmbedder), QuotaPolicy::default());
    assert_eq!(batcher.tick().await.unwrap(), BatchOutcome::Embedded(3));

    let outcome = h.scorer(BoostPolicy::default()).tick().await.unwrap();
    assert_eq!(outcome.scored, 3);
    assert!(h.post("2").score.unwrap() > h.post("3").score.unwrap());

    let selector = SelectionScheduler::new(h.db.clone(), Arc::new(LoggingGenerator), DelayStrategy::None, Some(5));
    assert_eq!(
        selector.tick().await.unwrap(),
        SelectionOutcome::Selected { platform_id: "2".into(), generated: true }
    );
    assert_eq!(
        selector.tick().await.unwrap(),
        SelectionOutcome::Selected { platform_id: "3".into(), generated: true }
    );
    assert_eq!(selector.tick().await.unwrap(), SelectionOutcome::NoCandidate);
}

#[tokio::test]
async fn favourites_become_liked_posts() {
    let platform = FakePlatform::default();
    let mut fav = status("42", "dave", "<p>favourite with link</p>");
    fav.card = Some(Card {
        url: "https://news.example/a".into(),
    });
    *platform.favourites.lock().unwrap() = vec![fav, status("43", "erin", "<p>known</p>")];
    let h = Harness::new(platform);
    h.db.insert_if_absent(&Post::new("43", "erin", "known")).unwrap();

    let collector = FavouritesCollector::new(h.db.clone(), h.platform.clone(), Arc::new(NoArticles));
    assert_eq!(collector.tick().await.unwrap(), 2);
    assert!(h.post("42").liked);
    assert!(h.post("43").liked);
    assert_eq!(collector.tick().await.unwrap(), 0);
}
