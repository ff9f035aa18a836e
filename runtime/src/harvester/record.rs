// Copyright 2026 Lexicon Contributors
// SPDX-License-Identifier: Apache-2.0

//! Harvested records, their identities and the per-session bookkeeping
//! around them: the seen set and the outgoing batch queue.

use crate::dom::{collapse_whitespace, truncate_chars};
use fnv::{FnvHashSet, FnvHasher};
use serde::{Deserialize, Serialize};
use std::hash::Hasher;
use std::time::Duration;
use tokio::time::Instant;

/// Characters of element text folded into a derived id.
pub const TEXT_PREFIX_CHARS: usize = 64;

/// Identity of a harvested element, used only for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordId {
    /// The page's own stable id attribute.
    Native { id: String },
    /// Heuristic identity from container, position and a text prefix.
    /// May collide when the page reorders elements.
    Derived {
        container: String,
        index: usize,
        #[serde(rename = "textHash")]
        text_hash: u64,
    },
}

impl RecordId {
    pub fn native(id: impl Into<String>) -> Self {
        Self::Native { id: id.into() }
    }

    /// Derive an id from `(container, index, first 64 chars of text)`.
    pub fn derived(container: &str, index: usize, text: &str) -> Self {
        let prefix = truncate_chars(&collapse_whitespace(text), TEXT_PREFIX_CHARS);
        let mut hasher = FnvHasher::default();
        hasher.write(prefix.as_bytes());
        Self::Derived {
            container: container.to_string(),
            index,
            text_hash: hasher.finish(),
        }
    }
}

/// One structured item extracted from the live page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestRecord {
    pub record_id: RecordId,
    /// Name of the scan target that produced the record.
    pub target: String,
    /// Conversation or source the record belongs to.
    pub group_key: String,
    /// Sender or contact.
    pub subject_key: String,
    pub text: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_fields: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Record ids already emitted for one scan target. Grows for the life of
/// the session and is never pruned.
#[derive(Debug, Default)]
pub struct SeenSet {
    ids: FnvHashSet<RecordId>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.ids.contains(id)
    }

    /// Mark an id as emitted. Returns false if it was already present.
    pub fn insert(&mut self, id: RecordId) -> bool {
        self.ids.insert(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Records waiting to be flushed, plus the single pending flush deadline.
#[derive(Debug, Default)]
pub struct OutgoingQueue {
    records: Vec<HarvestRecord>,
    flush_at: Option<Instant>,
}

impl OutgoingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record. The first record on an empty queue arms the flush
    /// deadline `delay` from `now`; later records ride the same deadline.
    /// Returns true when this push armed the deadline.
    pub fn push(&mut self, record: HarvestRecord, now: Instant, delay: Duration) -> bool {
        self.records.push(record);
        if self.flush_at.is_none() {
            self.flush_at = Some(now + delay);
            true
        } else {
            false
        }
    }

    pub fn flush_deadline(&self) -> Option<Instant> {
        self.flush_at
    }

    pub fn is_due(&self, now: Instant) -> bool {
        matches!(self.flush_at, Some(at) if at <= now)
    }

    /// Swap the queue for an empty one. `None` when nothing is queued, so an
    /// empty batch can never be produced.
    pub fn take(&mut self) -> Option<Vec<HarvestRecord>> {
        self.flush_at = None;
        if self.records.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.records))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[HarvestRecord] {
        &self.records
    }
}
