//! ============================================================================
//! Streaming source - Mastodon streaming API over WebSocket
//! ============================================================================
//! Each subscription is one WebSocket to `/api/v1/streaming?stream=<kind>`.
//! Frames are JSON envelopes `{"event": ..., "payload": "<json string>"}`;
//! only the payload string is passed on, decoding happens in the router.
//! ============================================================================

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

use crate::types::StreamKind;

/// Ordered payloads from one live connection. Ends when the connection ends.
pub type PayloadStream = BoxStream<'static, Result<String>>;

/// Opens live subscriptions
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn connect(&self, kind: StreamKind) -> Result<PayloadStream>;
}

#[derive(Debug, Deserialize)]
struct StreamEnvelope {
    event: String,
    #[serde(default)]
    payload: Option<String>,
}

/// WebSocket subscriber for one instance
pub struct WebSocketSource {
    instance_url: String,
    access_token: String,
}

impl WebSocketSource {
    pub fn new(instance_url: &str, access_token: String) -> Self {
        Self {
            instance_url: instance_url.trim_end_matches('/').to_string(),
            access_token,
        }
    }

    /// `https://host` -> `wss://host/api/v1/streaming?stream=<kind>`
    pub fn stream_url(&self, kind: StreamKind) -> Result<Url> {
        let mut url = Url::parse(&self.instance_url)
            .map_err(|e| anyhow!("Invalid instance URL '{}': {}", self.instance_url, e))?;

        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => return Err(anyhow!("Unsupported instance URL scheme: {}", other)),
        };
        url.set_scheme(scheme)
            .map_err(|_| anyhow!("Failed to set scheme {} on {}", scheme, self.instance_url))?;
        url.set_path("/api/v1/streaming");
        url.query_pairs_mut().clear().append_pair("stream", kind.as_query());
        Ok(url)
    }
}

/// Pull the payload out of a text frame. None for frames with nothing to route.
fn envelope_payload(kind: StreamKind, text: &str) -> Option<String> {
    match serde_json::from_str::<StreamEnvelope>(text) {
        Ok(envelope) => {
            debug!("{} stream event: {}", kind, envelope.event);
            envelope.payload
        }
        Err(e) => {
            warn!("Dropping undecodable {} frame: {}", kind, e);
            None
        }
    }
}

#[async_trait]
impl EventSource for WebSocketSource {
    async fn connect(&self, kind: StreamKind) -> Result<PayloadStream> {
        let url = self.stream_url(kind)?;

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| anyhow!("Failed to build stream request: {}", e))?;
        let auth = HeaderValue::from_str(&format!("Bearer {}", self.access_token))
            .map_err(|e| anyhow!("Invalid access token header: {}", e))?;
        request.headers_mut().insert("Authorization", auth);

        let (socket, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| anyhow!("Failed to connect {} stream: {}", kind, e))?;

        info!("Connected to {} stream", kind);

        let payloads = socket.filter_map(move |frame| async move {
            match frame {
                Ok(Message::Text(text)) => envelope_payload(kind, &text).map(Ok),
                Ok(Message::Close(reason)) => {
                    info!("{} stream closed by server: {:?}", kind, reason);
                    None
                }
                Ok(_) => None,
                Err(e) => Some(Err(anyhow!("{} stream read failed: {}", kind, e))),
            }
        });

        Ok(payloads.boxed())
    }
}
