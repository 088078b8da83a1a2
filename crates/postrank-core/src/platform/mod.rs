//! ============================================================================
//! Platform - Mastodon REST client, streaming source, HTML handling
//! ============================================================================

pub mod article;
pub mod client;
pub mod html;
pub mod stream;
pub mod types;

pub use article::{ArticleSource, HttpArticleSource, NoArticles};
pub use client::{MastodonClient, PlatformClient};
pub use stream::{EventSource, PayloadStream, WebSocketSource};
pub use types::{Account, Card, Conversation, Status, Visibility};
