//! Mastodon API entities, reduced to the fields the pipeline reads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub id: String,
    pub username: String,
    pub acct: String,
}

/// Link preview attached to a status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Card {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Status {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub account: Account,
    /// HTML body
    pub content: String,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub card: Option<Card>,
    #[serde(default)]
    pub in_reply_to_id: Option<String>,
}

/// Direct-message thread as delivered by the `direct` stream
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub last_status: Option<Status>,
    #[serde(default)]
    pub unread: bool,
}

/// Visibility for statuses the bot creates (boosts)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Unlisted,
    Private,
    Direct,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Unlisted => "unlisted",
            Visibility::Private => "private",
            Visibility::Direct => "direct",
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResults {
    #[serde(default)]
    pub statuses: Vec<Status>,
}
