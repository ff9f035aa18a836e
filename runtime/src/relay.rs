// Copyright 2026 Lexicon Contributors
// SPDX-License-Identifier: Apache-2.0

//! Relay boundary: where harvested batches, status changes and inspector
//! payloads leave the engine.
//!
//! Delivery is best effort. [`deliver`] spawns the send and only logs a
//! failure; nothing is retried and the harvester never waits on it.

use crate::error::{HarvestError, Result};
use crate::events::{EventBus, RelayMessage};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Somewhere relay messages can be sent.
#[async_trait]
pub trait Relay: Send + Sync {
    async fn send(&self, message: &RelayMessage) -> Result<()>;
}

/// Fire-and-forget delivery on a spawned task.
pub fn deliver(relay: &Arc<dyn Relay>, message: RelayMessage) {
    let relay = Arc::clone(relay);
    tokio::spawn(async move {
        match relay.send(&message).await {
            Ok(()) => debug!(endpoint = message.endpoint(), "relayed"),
            Err(e) => warn!(endpoint = message.endpoint(), "dropping message: {e}"),
        }
    });
}

// ── HTTP ─────────────────────────────────────────────────────────────────────

/// POSTs each message body as JSON to `<base>/<organId>/<endpoint>`.
///
/// Every request is bounded by `timeout`, so a stalled relay fails the send
/// instead of holding its task open.
pub struct HttpRelay {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRelay {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        url::Url::parse(base_url)
            .map_err(|e| HarvestError::InvalidParams(format!("relay url '{base_url}': {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HarvestError::Config(format!("relay client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn endpoint_url(&self, message: &RelayMessage) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            message.organ_id(),
            message.endpoint()
        )
    }
}

#[async_trait]
impl Relay for HttpRelay {
    async fn send(&self, message: &RelayMessage) -> Result<()> {
        let url = self.endpoint_url(message);
        let resp = self
            .client
            .post(&url)
            .json(&message.body())
            .send()
            .await
            .map_err(|e| HarvestError::RelayDelivery(format!("{url}: {e}")))?;

        if !resp.status().is_success() {
            return Err(HarvestError::RelayDelivery(format!(
                "{url}: status {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

// ── In-process ───────────────────────────────────────────────────────────────

/// Forwards messages into an unbounded channel.
pub struct ChannelRelay {
    sender: mpsc::UnboundedSender<RelayMessage>,
}

impl ChannelRelay {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RelayMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl Relay for ChannelRelay {
    async fn send(&self, message: &RelayMessage) -> Result<()> {
        self.sender
            .send(message.clone())
            .map_err(|_| HarvestError::RelayDelivery("channel closed".into()))
    }
}

#[async_trait]
impl Relay for EventBus {
    async fn send(&self, message: &RelayMessage) -> Result<()> {
        self.emit(message.clone());
        Ok(())
    }
}

/// Writes each message as one JSON line on stdout.
pub struct StdoutRelay;

#[async_trait]
impl Relay for StdoutRelay {
    async fn send(&self, message: &RelayMessage) -> Result<()> {
        let line = serde_json::to_string(message)?;
        println!("{line}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::HarvestStatus;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TIMEOUT: Duration = Duration::from_secs(3);

    fn status_message() -> RelayMessage {
        RelayMessage::Status {
            organ_id: "whatsapp".into(),
            status: HarvestStatus::Connected,
            timestamp: "2026-01-01T00:00:00.000Z".into(),
        }
    }

    #[tokio::test]
    async fn test_http_relay_posts_to_organ_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/whatsapp/status"))
            .and(body_json(serde_json::json!({
                "status": "connected",
                "timestamp": "2026-01-01T00:00:00.000Z"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let relay = HttpRelay::new(&format!("{}/", server.uri()), TIMEOUT).unwrap();
        relay.send(&status_message()).await.unwrap();
    }

    #[tokio::test]
    async fn test_http_relay_reports_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let relay = HttpRelay::new(&server.uri(), TIMEOUT).unwrap();
        let err = relay.send(&status_message()).await.unwrap_err();
        assert_eq!(err.code(), "E_RELAY_DELIVERY");
    }

    #[tokio::test]
    async fn test_http_relay_gives_up_on_stalled_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let relay = HttpRelay::new(&server.uri(), Duration::from_millis(100)).unwrap();
        let started = std::time::Instant::now();
        let err = relay.send(&status_message()).await.unwrap_err();
        assert_eq!(err.code(), "E_RELAY_DELIVERY");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_http_relay_rejects_bad_url() {
        assert!(HttpRelay::new("not a url", TIMEOUT).is_err());
    }

    #[tokio::test]
    async fn test_channel_relay() {
        let (relay, mut rx) = ChannelRelay::new();
        relay.send(&status_message()).await.unwrap();
        let got = rx.recv().await.unwrap();
        assert_eq!(got.endpoint(), "status");

        drop(rx);
        assert!(relay.send(&status_message()).await.is_err());
    }

    #[tokio::test]
    async fn test_deliver_swallows_failures() {
        let (relay, rx) = ChannelRelay::new();
        drop(rx);
        let relay: Arc<dyn Relay> = Arc::new(relay);
        deliver(&relay, status_message());
        tokio::task::yield_now().await;
    }
}
