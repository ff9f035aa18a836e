// Copyright 2026 Lexicon Contributors
// SPDX-License-Identifier: Apache-2.0

//! Messages the harvester hands to the relay boundary.
//!
//! Every outbound payload is a [`RelayMessage`]. The [`EventBus`] fans them
//! out in-process over a `tokio::sync::broadcast` channel; when no
//! subscribers exist, messages are silently dropped.

use crate::debug::{DebugSnapshot, QueryResult};
use crate::harvester::record::HarvestRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

/// Harvester lifecycle status reported to the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HarvestStatus {
    /// Readiness polling started.
    WaitingForMarker,
    /// A readiness marker appeared; scanning is live.
    Connected,
    /// Readiness polling gave up. Terminal.
    Timeout,
}

impl fmt::Display for HarvestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WaitingForMarker => write!(f, "waiting_for_marker"),
            Self::Connected => write!(f, "connected"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// One outbound message.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayMessage {
    // ── Harvest ───────────────────────────
    /// Records flushed together from the outgoing queue.
    Batch {
        organ_id: String,
        records: Vec<HarvestRecord>,
    },
    Status {
        organ_id: String,
        status: HarvestStatus,
        timestamp: String,
    },

    // ── Inspector ─────────────────────────
    DebugSnapshot {
        organ_id: String,
        snapshot: DebugSnapshot,
    },
    QueryResult {
        organ_id: String,
        result: QueryResult,
    },
}

impl RelayMessage {
    pub fn status(organ_id: &str, status: HarvestStatus) -> Self {
        Self::Status {
            organ_id: organ_id.to_string(),
            status,
            timestamp: now_timestamp(),
        }
    }

    pub fn organ_id(&self) -> &str {
        match self {
            Self::Batch { organ_id, .. }
            | Self::Status { organ_id, .. }
            | Self::DebugSnapshot { organ_id, .. }
            | Self::QueryResult { organ_id, .. } => organ_id,
        }
    }

    /// Last path segment of the HTTP endpoint this message is posted to.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::Batch { .. } => "batch",
            Self::Status { .. } => "status",
            Self::DebugSnapshot { .. } => "debug",
            Self::QueryResult { .. } => "query",
        }
    }

    /// JSON body as the host expects it, without the envelope.
    pub fn body(&self) -> serde_json::Value {
        let value = match self {
            Self::Batch { records, .. } => serde_json::to_value(records),
            Self::Status {
                status, timestamp, ..
            } => Ok(serde_json::json!({ "status": status, "timestamp": timestamp })),
            Self::DebugSnapshot { snapshot, .. } => serde_json::to_value(snapshot),
            Self::QueryResult { result, .. } => serde_json::to_value(result),
        };
        value.unwrap_or(serde_json::Value::Null)
    }
}

/// In-process fan-out of relay messages.
pub struct EventBus {
    sender: broadcast::Sender<RelayMessage>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit a message to all subscribers. Silently ignores if no subscribers.
    pub fn emit(&self, message: RelayMessage) {
        let _ = self.sender.send(message);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RelayMessage> {
        self.sender.subscribe()
    }
}

/// RFC 3339 timestamp for the current time.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_json_diff::assert_json_eq;

    #[test]
    fn test_status_body_shape() {
        let msg = RelayMessage::Status {
            organ_id: "whatsapp".into(),
            status: HarvestStatus::WaitingForMarker,
            timestamp: "2026-01-01T00:00:00.000Z".into(),
        };
        assert_eq!(msg.endpoint(), "status");
        assert_json_eq!(
            msg.body(),
            serde_json::json!({"status": "waiting_for_marker", "timestamp": "2026-01-01T00:00:00.000Z"})
        );
    }

    #[test]
    fn test_batch_body_is_record_array() {
        let msg = RelayMessage::Batch {
            organ_id: "whatsapp".into(),
            records: Vec::new(),
        };
        assert_eq!(msg.endpoint(), "batch");
        assert_eq!(msg.organ_id(), "whatsapp");
        assert!(msg.body().as_array().is_some());
    }

    #[test]
    fn test_envelope_serialization() {
        let msg = RelayMessage::status("whatsapp", HarvestStatus::Connected);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["status"], "connected");

        let parsed: RelayMessage = serde_json::from_value(json).unwrap();
        assert!(matches!(
            parsed,
            RelayMessage::Status {
                status: HarvestStatus::Connected,
                ..
            }
        ));
    }

    #[test]
    fn test_event_bus_emit_no_subscribers() {
        let bus = EventBus::new(16);
        bus.emit(RelayMessage::status("x", HarvestStatus::Timeout));
    }

    #[test]
    fn test_event_bus_subscribe_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.emit(RelayMessage::status("x", HarvestStatus::Connected));
        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.endpoint(), "status");
    }

    #[test]
    fn test_timestamp_is_rfc3339() {
        let ts = now_timestamp();
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
