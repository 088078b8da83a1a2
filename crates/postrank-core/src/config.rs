//! ============================================================================
//! Configuration - environment driven
//! ============================================================================
//! Values come from `POSTRANK_*` environment variables (a `.env` file is
//! loaded by the binary first). Only the instance URL and access token are
//! required; everything else has a default.
//! ============================================================================

use anyhow::{anyhow, Result};
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use crate::embedding::{QuotaPolicy, DEFAULT_EMBEDDING_MODEL, EMBEDDING_DIM};
use crate::pipeline::{BackoffConfig, SupervisorConfig};
use crate::ranking::{BoostPolicy, DelayStrategy};

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub dimensions: Option<usize>,
    pub quota: QuotaPolicy,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub instance_url: String,
    pub access_token: String,
    pub db_path: Option<String>,
    pub embedding: EmbeddingConfig,
    pub embed_interval: Duration,
    pub score_interval: Duration,
    pub selection_interval: Duration,
    /// None disables favourites polling
    pub favourites_interval: Option<Duration>,
    pub worker_pool_size: usize,
    pub excluded_accounts: HashSet<String>,
    pub boost: BoostPolicy,
    pub selection_delay: DelayStrategy,
    pub max_actions_per_day: Option<usize>,
    pub http_timeout: Duration,
    pub supervisor: SupervisorConfig,
}

fn parse_var<T: FromStr>(lookup: &dyn Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T> {
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| anyhow!("Invalid value for {}: '{}'", key, raw)),
        _ => Ok(default),
    }
}

fn secs(lookup: &dyn Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<Duration> {
    Ok(Duration::from_secs(parse_var(lookup, key, default)?))
}

fn required(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow!("{} must be set", key))
}

impl Config {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let instance_url = required(lookup, "POSTRANK_INSTANCE_URL")?;
        let access_token = required(lookup, "POSTRANK_ACCESS_TOKEN")?;

        let dimensions = match parse_var(lookup, "POSTRANK_EMBEDDING_DIMENSIONS", EMBEDDING_DIM)? {
            0 => None,
            n => Some(n),
        };

        let embedding = EmbeddingConfig {
            api_key: lookup("POSTRANK_EMBEDDING_API_KEY").filter(|k| !k.is_empty()),
            base_url: lookup("POSTRANK_EMBEDDING_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: lookup("POSTRANK_EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            dimensions,
            quota: QuotaPolicy {
                batch_size: parse_var(lookup, "POSTRANK_EMBEDDING_BATCH_SIZE", 3)?,
                max_calls: parse_var(lookup, "POSTRANK_EMBEDDING_MAX_CALLS", 3)?,
                window: secs(lookup, "POSTRANK_EMBEDDING_WINDOW_SECS", 600)?,
            },
        };

        let favourites_secs: u64 = parse_var(lookup, "POSTRANK_FAVOURITES_INTERVAL_SECS", 300)?;
        let max_actions: usize = parse_var(lookup, "POSTRANK_MAX_ACTIONS_PER_DAY", 5)?;

        let delay_raw = lookup("POSTRANK_SELECTION_DELAY").unwrap_or_else(|| "working-hours".to_string());
        let selection_delay = DelayStrategy::parse(&delay_raw)
            .ok_or_else(|| anyhow!("Invalid value for POSTRANK_SELECTION_DELAY: '{}'", delay_raw))?;

        let excluded_accounts = lookup("POSTRANK_EXCLUDED_ACCOUNTS")
            .map(|raw| {
                raw.split(',')
                    .map(|a| a.trim().to_string())
                    .filter(|a| !a.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            instance_url,
            access_token,
            db_path: lookup("POSTRANK_DB_PATH").filter(|p| !p.is_empty()),
            embedding,
            embed_interval: secs(lookup, "POSTRANK_EMBED_INTERVAL_SECS", 10)?,
            score_interval: secs(lookup, "POSTRANK_SCORE_INTERVAL_SECS", 10)?,
            selection_interval: secs(lookup, "POSTRANK_SELECTION_INTERVAL_SECS", 900)?,
            favourites_interval: (favourites_secs > 0).then(|| Duration::from_secs(favourites_secs)),
            worker_pool_size: parse_var(lookup, "POSTRANK_WORKER_POOL_SIZE", 4)?,
            excluded_accounts,
            boost: BoostPolicy {
                enabled: parse_var(lookup, "POSTRANK_BOOST_ENABLED", false)?,
                threshold: parse_var(lookup, "POSTRANK_BOOST_THRESHOLD", 0.5)?,
            },
            selection_delay,
            max_actions_per_day: (max_actions > 0).then_some(max_actions),
            http_timeout: secs(lookup, "POSTRANK_HTTP_TIMEOUT_SECS", 30)?,
            supervisor: SupervisorConfig {
                backoff: BackoffConfig::default(),
                restart_delay: secs(lookup, "POSTRANK_RESTART_DELAY_SECS", 30)?,
                healthy_after: secs(lookup, "POSTRANK_STREAM_HEALTHY_SECS", 60)?,
            },
        })
    }
}
