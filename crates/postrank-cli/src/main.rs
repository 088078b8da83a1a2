// ============================================================================
// postrank - run the ranking pipeline and inspect its database
// ============================================================================
// Usage:
//   postrank run                                  Run ingestion, embedding, scoring, selection
//   postrank stats                                Show database statistics
//   postrank list-posts [--filter FILTER]         List stored posts
//   postrank export --format json                 Export the database as JSON
//   postrank feedback --id ID --weight 2 [--no-url]   Apply negative feedback
//   postrank rescore                              Drop all scores so they are recomputed
// ============================================================================

use anyhow::{anyhow, Result};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use postrank_core::platform::{HttpArticleSource, MastodonClient};
use postrank_core::{Config, Feedback, FeedbackOutcome, FeedbackProcessor, Pipeline, Post, PostDb, PostStore};
use std::sync::Arc;
use tracing::info;

/// Relevance-ranked Mastodon ingestion pipeline
#[derive(Parser)]
#[command(name = "postrank", version, about = "Ingest, embed and rank Mastodon posts")]
struct Cli {
    /// Path to the database file (default: ~/.postrank/postrank.redb)
    #[arg(long, global = true)]
    db_path: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline until Ctrl-C
    Run,

    /// Show database statistics
    Stats,

    /// List posts with optional filter
    ListPosts {
        /// Filter: all, unembedded, pending, ranked, weighted
        #[arg(long, default_value = "all")]
        filter: String,

        /// Maximum number of rows
        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// Export full database contents as JSON
    Export {
        /// Output format (currently only json is supported)
        #[arg(long, default_value = "json")]
        format: String,
    },

    /// Mark a post as a negative example
    Feedback {
        /// Platform id of the post
        #[arg(long, conflicts_with = "url")]
        id: Option<String>,

        /// Public URL of the post (resolved through search)
        #[arg(long)]
        url: Option<String>,

        /// Strength of the negative example
        #[arg(long)]
        weight: f64,

        /// Embed only the post text, not the linked article
        #[arg(long)]
        no_url: bool,
    },

    /// Clear all relevance scores so the scorer recomputes them
    Rescore,
}

#[derive(Debug, Clone, Copy)]
enum PostFilter {
    All,
    Unembedded,
    Pending,
    Ranked,
    Weighted,
}

fn parse_filter(s: &str) -> Result<PostFilter> {
    match s.to_lowercase().as_str() {
        "all" => Ok(PostFilter::All),
        "unembedded" => Ok(PostFilter::Unembedded),
        "pending" => Ok(PostFilter::Pending),
        "ranked" => Ok(PostFilter::Ranked),
        "weighted" => Ok(PostFilter::Weighted),
        _ => anyhow::bail!(
            "Unknown filter '{}'. Valid values: all, unembedded, pending, ranked, weighted",
            s
        ),
    }
}

fn format_timestamp(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("(invalid: {})", ms))
}

fn init_logging() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Warning: Could not load .env file: {}", e);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("postrank=info".parse()?)
                .add_directive("postrank_core=info".parse()?),
        )
        .init();
    Ok(())
}

/// Environment config with the command-line database path taking precedence
fn load_config(db_path: Option<String>) -> Result<Config> {
    let mut config = Config::from_env()?;
    if db_path.is_some() {
        config.db_path = db_path;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Run => cmd_run(cli.db_path).await,
        Commands::Stats => cmd_stats(&PostDb::open(cli.db_path.as_deref())?),
        Commands::ListPosts { filter, limit } => {
            cmd_list_posts(&PostDb::open(cli.db_path.as_deref())?, &filter, limit)
        }
        Commands::Export { format } => cmd_export(&PostDb::open(cli.db_path.as_deref())?, &format),
        Commands::Feedback {
            id,
            url,
            weight,
            no_url,
        } => cmd_feedback(cli.db_path, id, url, Feedback { weight, no_url }).await,
        Commands::Rescore => cmd_rescore(&PostDb::open(cli.db_path.as_deref())?),
    }
}

async fn cmd_run(db_path: Option<String>) -> Result<()> {
    let config = load_config(db_path)?;
    Pipeline::from_config(config)?.run().await
}

fn cmd_stats(db: &PostDb) -> Result<()> {
    let stats = db.stats()?;

    println!("=== postrank Database Stats ===");
    println!("Database: {}", db.path().display());
    println!();
    println!("Posts:      {} total", stats.total_posts);
    println!("  {:12} {}", "embedded", stats.embedded);
    println!("  {:12} {}", "scored", stats.scored);
    println!("  {:12} {}", "acted upon", stats.acted_upon);
    println!("  {:12} {}", "liked", stats.liked);
    println!("  {:12} {}", "negative", stats.negative);
    println!("Embedding calls: {}", stats.embedding_calls);
    for (model, count) in &stats.calls_by_model {
        println!("  {:28} {}", model, count);
    }

    Ok(())
}

fn select_posts(db: &PostDb, filter: PostFilter, limit: usize) -> Result<Vec<Post>> {
    let mut posts = match filter {
        PostFilter::All => db.list_posts()?,
        PostFilter::Unembedded => db.posts_missing_embedding(limit)?,
        PostFilter::Pending => db.posts_pending_score()?,
        PostFilter::Ranked => db.ranked_candidates(limit)?,
        PostFilter::Weighted => db.weighted_posts()?,
    };
    posts.truncate(limit);
    Ok(posts)
}

fn cmd_list_posts(db: &PostDb, filter: &str, limit: usize) -> Result<()> {
    let filter = parse_filter(filter)?;
    let posts = select_posts(db, filter, limit)?;

    if posts.is_empty() {
        println!("No posts found.");
        return Ok(());
    }

    println!(
        "{:<20}  {:>8}  {:<6}  {:<22}  {:<20}  {}",
        "POST ID", "SCORE", "FLAGS", "INGESTED AT", "ACCOUNT", "TEXT"
    );
    println!("{}", "-".repeat(110));

    for post in &posts {
        let score = post
            .score
            .map(|s| format!("{:.3}", s))
            .unwrap_or_else(|| "-".into());
        let flags = format!(
            "{}{}{}{}",
            if post.embedding.is_some() { 'E' } else { '.' },
            if post.liked { 'L' } else { '.' },
            if post.negative_weight.is_some() { 'N' } else { '.' },
            if post.acted_upon { 'A' } else { '.' },
        );
        let text = post.text.chars().take(40).collect::<String>();
        println!(
            "{:<20}  {:>8}  {:<6}  {:<22}  {:<20}  {}",
            post.platform_id,
            score,
            flags,
            format_timestamp(post.ingested_at),
            post.account.chars().take(20).collect::<String>(),
            text
        );
    }

    println!("\nTotal: {} posts", posts.len());
    Ok(())
}

fn cmd_export(db: &PostDb, format: &str) -> Result<()> {
    if format != "json" {
        anyhow::bail!("Unsupported format '{}'. Only 'json' is supported.", format);
    }

    let posts = db.list_posts()?;
    let stats = db.stats()?;

    let export = serde_json::json!({
        "exported_at": Utc::now().to_rfc3339(),
        "stats": stats,
        "posts": posts,
    });

    println!("{}", serde_json::to_string_pretty(&export)?);
    Ok(())
}

async fn cmd_feedback(
    db_path: Option<String>,
    id: Option<String>,
    url: Option<String>,
    feedback: Feedback,
) -> Result<()> {
    if !feedback.weight.is_finite() {
        anyhow::bail!("Weight must be a finite number");
    }

    let config = load_config(db_path)?;
    let store: Arc<dyn PostStore> = Arc::new(PostDb::open(config.db_path.as_deref())?);
    let platform = Arc::new(MastodonClient::new(
        &config.instance_url,
        config.access_token.clone(),
        config.http_timeout,
    )?);
    let articles = Arc::new(HttpArticleSource::new(config.http_timeout)?);
    let processor = FeedbackProcessor::new(store, platform, articles);

    let outcome = match (id, url) {
        (Some(id), _) => processor.apply(&id, feedback).await?,
        (None, Some(url)) => processor.apply_to_url(&url, feedback).await?,
        (None, None) => return Err(anyhow!("Either --id or --url is required")),
    };

    match outcome {
        FeedbackOutcome::Applied {
            platform_id,
            weight,
            no_url,
            vector_cleared,
        } => {
            info!("Feedback stored for {}", platform_id);
            println!("Post {}: negative weight {} (no_url: {})", platform_id, weight, no_url);
            if vector_cleared {
                println!("Vector cleared; the post will be re-embedded without its article.");
            }
        }
        other => println!("Nothing applied: {:?}", other),
    }
    Ok(())
}

fn cmd_rescore(db: &PostDb) -> Result<()> {
    let cleared = db.clear_scores()?;
    println!("Cleared {} scores; they are recomputed on the next scoring tick.", cleared);
    Ok(())
}
