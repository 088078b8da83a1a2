// ============================================================================
// PostDb - Embedded Database (redb)
// ============================================================================
// Persistent store for ingested posts and the embedding call log.
// Default path: ~/.postrank/postrank.redb (override via POSTRANK_DB_PATH)
// ============================================================================

pub mod types;

pub use types::{EmbeddingCall, InsertOutcome, Post, StoreStats};

use anyhow::{anyhow, Result};
use redb::{Database, ReadableTable, TableDefinition};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

// Table definitions
const POSTS: TableDefinition<&str, &[u8]> = TableDefinition::new("posts");
const EMBEDDING_CALLS: TableDefinition<&str, &[u8]> = TableDefinition::new("embedding_calls");

/// Storage seam for every pipeline component.
///
/// Implementations must make `insert_if_absent` and `mark_acted_upon` atomic
/// with respect to concurrent callers.
pub trait PostStore: Send + Sync {
    fn find_by_platform_id(&self, platform_id: &str) -> Result<Option<Post>>;

    /// Insert unless a post with the same platform id exists. Never errors on
    /// a duplicate.
    fn insert_if_absent(&self, post: &Post) -> Result<InsertOutcome>;

    /// Replace an existing post
    fn update(&self, post: &Post) -> Result<()>;

    /// Read-modify-write inside one transaction. Returns the stored result,
    /// or None if the post does not exist.
    fn modify(&self, platform_id: &str, f: &mut dyn FnMut(&mut Post)) -> Result<Option<Post>>;

    /// Flip `acted_upon` false -> true. Returns false if it was already set
    /// or the post is unknown.
    fn mark_acted_upon(&self, platform_id: &str) -> Result<bool>;

    /// Oldest posts without a vector that have something to embed
    fn posts_missing_embedding(&self, limit: usize) -> Result<Vec<Post>>;

    /// Posts with a vector but no score
    fn posts_pending_score(&self) -> Result<Vec<Post>>;

    /// Selection candidates, best score first
    fn ranked_candidates(&self, limit: usize) -> Result<Vec<Post>>;

    /// Liked or negatively weighted posts that carry a vector
    fn weighted_posts(&self) -> Result<Vec<Post>>;

    fn record_embedding_call(&self, call: &EmbeddingCall) -> Result<()>;

    fn count_embedding_calls_since(&self, model: &str, since_ms: i64) -> Result<usize>;

    fn count_acted_since(&self, since_ms: i64) -> Result<usize>;

    fn list_posts(&self) -> Result<Vec<Post>>;

    /// Drop every score so the scorer recomputes them. Returns the count.
    fn clear_scores(&self) -> Result<usize>;

    fn stats(&self) -> Result<StoreStats>;
}

/// Run a store operation on tokio's blocking pool.
///
/// redb commits fsync, so async callers go through here instead of calling
/// the store on a runtime worker thread.
pub async fn blocking<T, F>(store: &Arc<dyn PostStore>, op: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn PostStore) -> Result<T> + Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || op(store.as_ref()))
        .await
        .map_err(|e| anyhow!("Store task failed: {}", e))?
}

/// Embedded post database
pub struct PostDb {
    db: Database,
    path: PathBuf,
}

fn post_key(platform_id: &str) -> String {
    format!("posts:{}", platform_id)
}

fn call_key(call: &EmbeddingCall) -> String {
    format!("calls:{:020}:{}", call.requested_at.max(0), call.id)
}

fn encode_post(post: &Post) -> Result<Vec<u8>> {
    bincode::serialize(post).map_err(|e| anyhow!("Failed to serialize post: {}", e))
}

fn decode_post(bytes: &[u8]) -> Result<Post> {
    bincode::deserialize(bytes).map_err(|e| anyhow!("Failed to deserialize post: {}", e))
}

impl PostDb {
    /// Open (or create) the database at the given path.
    /// If `path` is None, uses POSTRANK_DB_PATH env var or ~/.postrank/postrank.redb
    pub fn open(path: Option<&str>) -> Result<Self> {
        let db_path = if let Some(p) = path {
            PathBuf::from(p)
        } else if let Ok(env_path) = std::env::var("POSTRANK_DB_PATH") {
            PathBuf::from(env_path)
        } else {
            let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))?;
            let dir = home.join(".postrank");
            std::fs::create_dir_all(&dir)
                .map_err(|e| anyhow!("Failed to create .postrank directory: {}", e))?;
            dir.join("postrank.redb")
        };

        info!("Opening database at: {}", db_path.display());

        let db = Database::create(&db_path)
            .map_err(|e| anyhow!("Failed to open database: {}", e))?;

        // Ensure tables exist by doing a write transaction
        let write_txn = db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            let _ = write_txn.open_table(POSTS).map_err(|e| anyhow!("Failed to create posts table: {}", e))?;
            let _ = write_txn
                .open_table(EMBEDDING_CALLS)
                .map_err(|e| anyhow!("Failed to create embedding_calls table: {}", e))?;
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit init: {}", e))?;

        info!("Database ready");

        Ok(Self { db, path: db_path })
    }

    /// Get the database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn scan_posts(&self, mut keep: impl FnMut(&Post) -> bool) -> Result<Vec<Post>> {
        let read_txn = self.db.begin_read()
            .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
        let table = read_txn.open_table(POSTS)
            .map_err(|e| anyhow!("Failed to open posts table: {}", e))?;

        let mut results = Vec::new();
        let iter = table.range::<&str>(..)
            .map_err(|e| anyhow!("Failed to iterate posts: {}", e))?;
        for entry in iter {
            let (_key, value) = entry.map_err(|e| anyhow!("Failed to read entry: {}", e))?;
            let post = decode_post(value.value())?;
            if keep(&post) {
                results.push(post);
            }
        }
        Ok(results)
    }

    fn scan_calls(&self) -> Result<Vec<EmbeddingCall>> {
        let read_txn = self.db.begin_read()
            .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
        let table = read_txn.open_table(EMBEDDING_CALLS)
            .map_err(|e| anyhow!("Failed to open embedding_calls table: {}", e))?;

        let mut results = Vec::new();
        let iter = table.range::<&str>(..)
            .map_err(|e| anyhow!("Failed to iterate embedding calls: {}", e))?;
        for entry in iter {
            let (_key, value) = entry.map_err(|e| anyhow!("Failed to read entry: {}", e))?;
            let call: EmbeddingCall = bincode::deserialize(value.value())
                .map_err(|e| anyhow!("Failed to deserialize embedding call: {}", e))?;
            results.push(call);
        }
        Ok(results)
    }
}

impl PostStore for PostDb {
    fn find_by_platform_id(&self, platform_id: &str) -> Result<Option<Post>> {
        let key = post_key(platform_id);

        let read_txn = self.db.begin_read()
            .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
        let table = read_txn.open_table(POSTS)
            .map_err(|e| anyhow!("Failed to open posts table: {}", e))?;

        match table.get(key.as_str()).map_err(|e| anyhow!("Failed to get post: {}", e))? {
            Some(value) => Ok(Some(decode_post(value.value())?)),
            None => Ok(None),
        }
    }

    fn insert_if_absent(&self, post: &Post) -> Result<InsertOutcome> {
        let key = post_key(&post.platform_id);
        let value = encode_post(post)?;

        // redb allows one write transaction at a time, so check-then-insert
        // inside it cannot interleave with another writer.
        let write_txn = self.db.begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        let outcome;
        {
            let mut table = write_txn.open_table(POSTS)
                .map_err(|e| anyhow!("Failed to open posts table: {}", e))?;
            let exists = table
                .get(key.as_str())
                .map_err(|e| anyhow!("Failed to get post: {}", e))?
                .is_some();
            if exists {
                outcome = InsertOutcome::AlreadyExists;
            } else {
                table.insert(key.as_str(), value.as_slice())
                    .map_err(|e| anyhow!("Failed to insert post: {}", e))?;
                outcome = InsertOutcome::Inserted;
            }
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit: {}", e))?;

        debug!("Insert post {}: {:?}", post.platform_id, outcome);
        Ok(outcome)
    }

    fn update(&self, post: &Post) -> Result<()> {
        let replaced = self.modify(&post.platform_id, &mut |stored| *stored = post.clone())?;
        if replaced.is_none() {
            return Err(anyhow!("Post not found: {}", post.platform_id));
        }
        Ok(())
    }

    fn modify(&self, platform_id: &str, f: &mut dyn FnMut(&mut Post)) -> Result<Option<Post>> {
        let key = post_key(platform_id);

        let write_txn = self.db.begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        let result;
        {
            let mut table = write_txn.open_table(POSTS)
                .map_err(|e| anyhow!("Failed to open posts table: {}", e))?;
            let existing = table
                .get(key.as_str())
                .map_err(|e| anyhow!("Failed to get post: {}", e))?
                .map(|v| v.value().to_vec());

            result = match existing {
                Some(bytes) => {
                    let mut post = decode_post(&bytes)?;
                    f(&mut post);
                    let value = encode_post(&post)?;
                    table.insert(key.as_str(), value.as_slice())
                        .map_err(|e| anyhow!("Failed to update post: {}", e))?;
                    Some(post)
                }
                None => None,
            };
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit: {}", e))?;

        if result.is_some() {
            debug!("Updated post: {}", platform_id);
        }
        Ok(result)
    }

    fn mark_acted_upon(&self, platform_id: &str) -> Result<bool> {
        let mut transitioned = false;
        self.modify(platform_id, &mut |post| {
            if !post.acted_upon {
                post.acted_upon = true;
                post.acted_at = Some(chrono::Utc::now().timestamp_millis());
                transitioned = true;
            }
        })?;
        Ok(transitioned)
    }

    fn posts_missing_embedding(&self, limit: usize) -> Result<Vec<Post>> {
        let mut posts = self.scan_posts(|p| p.embedding.is_none() && p.has_embeddable_text())?;
        posts.sort_by(|a, b| {
            a.ingested_at
                .cmp(&b.ingested_at)
                .then_with(|| a.platform_id.cmp(&b.platform_id))
        });
        posts.truncate(limit);
        Ok(posts)
    }

    fn posts_pending_score(&self) -> Result<Vec<Post>> {
        self.scan_posts(|p| p.embedding.is_some() && p.score.is_none())
    }

    fn ranked_candidates(&self, limit: usize) -> Result<Vec<Post>> {
        let mut posts = self.scan_posts(Post::is_candidate)?;
        posts.sort_by(|a, b| {
            let (sa, sb) = (a.score.unwrap_or(f64::NEG_INFINITY), b.score.unwrap_or(f64::NEG_INFINITY));
            sb.partial_cmp(&sa)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.platform_id.cmp(&b.platform_id))
        });
        posts.truncate(limit);
        Ok(posts)
    }

    fn weighted_posts(&self) -> Result<Vec<Post>> {
        self.scan_posts(Post::is_weighted)
    }

    fn record_embedding_call(&self, call: &EmbeddingCall) -> Result<()> {
        let key = call_key(call);
        let value = bincode::serialize(call)
            .map_err(|e| anyhow!("Failed to serialize embedding call: {}", e))?;

        let write_txn = self.db.begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            let mut table = write_txn.open_table(EMBEDDING_CALLS)
                .map_err(|e| anyhow!("Failed to open embedding_calls table: {}", e))?;
            table.insert(key.as_str(), value.as_slice())
                .map_err(|e| anyhow!("Failed to insert embedding call: {}", e))?;
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit: {}", e))?;

        debug!("Recorded embedding call {} for model {}", call.id, call.model);
        Ok(())
    }

    fn count_embedding_calls_since(&self, model: &str, since_ms: i64) -> Result<usize> {
        Ok(self
            .scan_calls()?
            .iter()
            .filter(|c| c.model == model && c.requested_at >= since_ms)
            .count())
    }

    fn count_acted_since(&self, since_ms: i64) -> Result<usize> {
        Ok(self
            .scan_posts(|p| p.acted_at.map(|t| t >= since_ms).unwrap_or(false))?
            .len())
    }

    fn list_posts(&self) -> Result<Vec<Post>> {
        self.scan_posts(|_| true)
    }

    fn clear_scores(&self) -> Result<usize> {
        let write_txn = self.db.begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        let cleared;
        {
            let mut table = write_txn.open_table(POSTS)
                .map_err(|e| anyhow!("Failed to open posts table: {}", e))?;

            let mut scored = Vec::new();
            for entry in table.range::<&str>(..).map_err(|e| anyhow!("Failed to iterate posts: {}", e))? {
                let (key, value) = entry.map_err(|e| anyhow!("Failed to read entry: {}", e))?;
                let post = decode_post(value.value())?;
                if post.score.is_some() {
                    scored.push((key.value().to_string(), post));
                }
            }

            for (key, mut post) in scored.iter().cloned() {
                post.score = None;
                let value = encode_post(&post)?;
                table.insert(key.as_str(), value.as_slice())
                    .map_err(|e| anyhow!("Failed to update post: {}", e))?;
            }
            cleared = scored.len();
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit: {}", e))?;

        info!("Cleared {} scores", cleared);
        Ok(cleared)
    }

    fn stats(&self) -> Result<StoreStats> {
        let posts = self.list_posts()?;
        let calls = self.scan_calls()?;

        let mut calls_by_model = HashMap::new();
        for call in &calls {
            *calls_by_model.entry(call.model.clone()).or_insert(0usize) += 1;
        }

        Ok(StoreStats {
            total_posts: posts.len(),
            embedded: posts.iter().filter(|p| p.embedding.is_some()).count(),
            scored: posts.iter().filter(|p| p.score.is_some()).count(),
            acted_upon: posts.iter().filter(|p| p.acted_upon).count(),
            liked: posts.iter().filter(|p| p.liked).count(),
            negative: posts.iter().filter(|p| p.negative_weight.is_some()).count(),
            embedding_calls: calls.len(),
            calls_by_model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db() -> (tempfile::TempDir, PostDb) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.redb");
        let db = PostDb::open(Some(path.to_str().unwrap())).unwrap();
        (dir, db)
    }

    fn scored(id: &str, score: f64) -> Post {
        let mut post = Post::new(id, "alice", format!("post {}", id));
        post.set_vector(&[1.0, 0.0], "test-model");
        post.score = Some(score);
        post
    }

    #[test]
    fn test_insert_if_absent() {
        let (_dir, db) = temp_db();
        let post = Post::new("42", "alice", "hello");
        assert_eq!(db.insert_if_absent(&post).unwrap(), InsertOutcome::Inserted);
        assert_eq!(db.insert_if_absent(&post).unwrap(), InsertOutcome::AlreadyExists);
        assert_eq!(db.list_posts().unwrap().len(), 1);
        assert_eq!(db.find_by_platform_id("42").unwrap().unwrap().text, "hello");
        assert!(db.find_by_platform_id("43").unwrap().is_none());
    }

    #[test]
    fn test_concurrent_duplicate_inserts() {
        let (_dir, db) = temp_db();
        let db = Arc::new(db);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let db = db.clone();
                std::thread::spawn(move || {
                    let post = Post::new("dup", format!("writer{}", i), "same post");
                    db.insert_if_absent(&post).unwrap()
                })
            })
            .collect();

        let outcomes: Vec<InsertOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let inserted = outcomes.iter().filter(|o| **o == InsertOutcome::Inserted).count();
        assert_eq!(inserted, 1);
        assert_eq!(db.list_posts().unwrap().len(), 1);
    }

    #[test]
    fn test_mark_acted_upon_once() {
        let (_dir, db) = temp_db();
        db.insert_if_absent(&Post::new("1", "alice", "x")).unwrap();
        assert!(db.mark_acted_upon("1").unwrap());
        assert!(!db.mark_acted_upon("1").unwrap());
        assert!(!db.mark_acted_upon("missing").unwrap());
        assert_eq!(db.count_acted_since(0).unwrap(), 1);
    }

    #[test]
    fn test_update_requires_existing() {
        let (_dir, db) = temp_db();
        let post = Post::new("1", "alice", "x");
        assert!(db.update(&post).is_err());
        db.insert_if_absent(&post).unwrap();
        let mut changed = post.clone();
        changed.text = "y".to_string();
        db.update(&changed).unwrap();
        assert_eq!(db.find_by_platform_id("1").unwrap().unwrap().text, "y");
    }

    #[test]
    fn test_missing_embedding_oldest_first() {
        let (_dir, db) = temp_db();
        for (id, ts) in [("a", 300), ("b", 100), ("c", 200), ("d", 50)] {
            let mut post = Post::new(id, "alice", format!("text {}", id));
            post.ingested_at = ts;
            db.insert_if_absent(&post).unwrap();
        }
        let mut blank = Post::new("blank", "alice", "   ");
        blank.ingested_at = 0;
        db.insert_if_absent(&blank).unwrap();
        let mut done = Post::new("done", "alice", "embedded");
        done.ingested_at = 1;
        done.set_vector(&[1.0], "m");
        db.insert_if_absent(&done).unwrap();

        let ids: Vec<String> = db
            .posts_missing_embedding(3)
            .unwrap()
            .into_iter()
            .map(|p| p.platform_id)
            .collect();
        assert_eq!(ids, vec!["d", "b", "c"]);
    }

    #[test]
    fn test_ranked_candidates_order_and_filters() {
        let (_dir, db) = temp_db();
        db.insert_if_absent(&scored("low", 0.1)).unwrap();
        db.insert_if_absent(&scored("high", 0.9)).unwrap();
        db.insert_if_absent(&scored("mid", 0.5)).unwrap();

        let mut liked = scored("liked", 0.99);
        liked.liked = true;
        db.insert_if_absent(&liked).unwrap();
        db.insert_if_absent(&scored("failed-boost", f64::NEG_INFINITY)).unwrap();

        let ids: Vec<String> = db
            .ranked_candidates(10)
            .unwrap()
            .into_iter()
            .map(|p| p.platform_id)
            .collect();
        assert_eq!(ids, vec!["high", "mid", "low"]);

        db.mark_acted_upon("high").unwrap();
        let best = db.ranked_candidates(1).unwrap();
        assert_eq!(best[0].platform_id, "mid");
    }

    #[test]
    fn test_embedding_call_window() {
        let (_dir, db) = temp_db();
        db.record_embedding_call(&EmbeddingCall::new("m", 1_000, "a".into())).unwrap();
        db.record_embedding_call(&EmbeddingCall::new("m", 5_000, "b".into())).unwrap();
        db.record_embedding_call(&EmbeddingCall::new("other", 5_000, "c".into())).unwrap();

        assert_eq!(db.count_embedding_calls_since("m", 0).unwrap(), 2);
        assert_eq!(db.count_embedding_calls_since("m", 2_000).unwrap(), 1);
        assert_eq!(db.count_embedding_calls_since("other", 0).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_blocking_runs_off_runtime_thread() {
        let (_dir, db) = temp_db();
        let store: Arc<dyn PostStore> = Arc::new(db);
        let runtime_thread = std::thread::current().id();

        let (outcome, store_thread) = blocking(&store, |store| {
            let outcome = store.insert_if_absent(&Post::new("7", "alice", "hello"))?;
            Ok((outcome, std::thread::current().id()))
        })
        .await
        .unwrap();

        assert_eq!(outcome, InsertOutcome::Inserted);
        assert_ne!(store_thread, runtime_thread);

        let missing = blocking(&store, |store| store.find_by_platform_id("nope")).await.unwrap();
        assert!(missing.is_none());
        let err = blocking(&store, |store| store.update(&Post::new("nope", "a", "b"))).await;
        assert!(err.is_err());
    }

    #[test]
    fn test_clear_scores_and_stats() {
        let (_dir, db) = temp_db();
        db.insert_if_absent(&scored("a", 0.2)).unwrap();
        db.insert_if_absent(&scored("b", 0.7)).unwrap();
        db.insert_if_absent(&Post::new("c", "bob", "plain")).unwrap();

        assert_eq!(db.clear_scores().unwrap(), 2);
        assert_eq!(db.posts_pending_score().unwrap().len(), 2);

        let stats = db.stats().unwrap();
        assert_eq!(stats.total_posts, 3);
        assert_eq!(stats.embedded, 2);
        assert_eq!(stats.scored, 0);
    }
}
