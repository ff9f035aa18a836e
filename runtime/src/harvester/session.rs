// Copyright 2026 Lexicon Contributors
// SPDX-License-Identifier: Apache-2.0

//! Harvester session: every piece of mutable harvest state for one page.
//!
//! The session is a plain state machine driven by explicit `now` instants.
//! It never sleeps or spawns; the scheduler asks it for its next deadline,
//! waits, and calls [`HarvesterSession::advance`]. Outbound messages pile up
//! in an outbox the scheduler drains after every step.

use super::record::{HarvestRecord, OutgoingQueue, SeenSet};
use super::target::ScanTarget;
use crate::config::HarvestConfig;
use crate::debug::{DebugBridge, QuerySlot};
use crate::dom::{harvest_root, parse_selector};
use crate::error::HarvestError;
use crate::events::{now_timestamp, HarvestStatus, RelayMessage};
use crate::patterns::Pattern;
use scraper::Html;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Records kept per target for the scan report.
pub const RECENT_RECORDS: usize = 5;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// Waiting for a readiness marker; `attempts` probes have failed so far.
    Polling { attempts: u32 },
    Active,
    /// Readiness polling gave up. Terminal.
    TimedOut,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Polling { attempts } => write!(f, "polling({attempts})"),
            Self::Active => write!(f, "active"),
            Self::TimedOut => write!(f, "timed_out"),
        }
    }
}

/// A change to the live document reported by the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationBatch {
    /// Number of nodes the batch added. Removals alone never trigger a rescan.
    pub added_nodes: usize,
    /// Fresh serialized markup of the page, when the host sends it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markup: Option<String>,
}

/// Per-target scan state.
#[derive(Debug)]
pub struct TargetState {
    target: ScanTarget,
    seen: SeenSet,
    recent: VecDeque<HarvestRecord>,
    next_due: Option<Instant>,
}

impl TargetState {
    fn new(target: ScanTarget) -> Self {
        Self {
            target,
            seen: SeenSet::new(),
            recent: VecDeque::with_capacity(RECENT_RECORDS),
            next_due: None,
        }
    }

    pub fn target(&self) -> &ScanTarget {
        &self.target
    }

    pub fn seen_len(&self) -> usize {
        self.seen.len()
    }

    pub fn recent(&self) -> impl Iterator<Item = &HarvestRecord> {
        self.recent.iter()
    }

    fn remember(&mut self, record: &HarvestRecord) {
        if self.recent.len() == RECENT_RECORDS {
            self.recent.pop_front();
        }
        self.recent.push_back(record.clone());
    }
}

/// All mutable harvest state for one page.
#[derive(Debug)]
pub struct HarvesterSession {
    id: String,
    config: HarvestConfig,
    phase: Phase,
    markup: String,
    targets: Vec<TargetState>,
    queue: OutgoingQueue,
    poll_at: Option<Instant>,
    rescan_at: Option<Instant>,
    debug: Option<DebugBridge>,
    outbox: Vec<RelayMessage>,
}

impl HarvesterSession {
    pub fn new(config: HarvestConfig, targets: Vec<ScanTarget>) -> Self {
        let debug = DebugBridge::new(
            QuerySlot::new(),
            config.debug,
            config.snapshot_interval(),
            config.query_poll_interval(),
        );
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            config,
            phase: Phase::Idle,
            markup: String::new(),
            targets: targets.into_iter().map(TargetState::new).collect(),
            queue: OutgoingQueue::new(),
            poll_at: None,
            rescan_at: None,
            debug: Some(debug),
            outbox: Vec::new(),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn markup(&self) -> &str {
        &self.markup
    }

    pub fn targets(&self) -> &[TargetState] {
        &self.targets
    }

    pub fn target(&self, name: &str) -> Option<&TargetState> {
        self.targets.iter().find(|t| t.target.name == name)
    }

    /// Why the session went silent, once it has.
    pub fn failure(&self) -> Option<HarvestError> {
        (self.phase == Phase::TimedOut).then(|| HarvestError::HostNotFound {
            attempts: self.config.max_retries,
        })
    }

    /// Records waiting for the next flush.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn queue(&self) -> &OutgoingQueue {
        &self.queue
    }

    /// Mailbox for inspector selector queries.
    pub fn query_slot(&self) -> QuerySlot {
        match &self.debug {
            Some(bridge) => bridge.slot().clone(),
            None => QuerySlot::new(),
        }
    }

    /// Take every message produced since the last drain.
    pub fn drain_outbox(&mut self) -> Vec<RelayMessage> {
        std::mem::take(&mut self.outbox)
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    /// Begin readiness polling. Probes once immediately.
    pub fn start(&mut self, now: Instant) {
        if self.phase != Phase::Idle {
            return;
        }
        info!(session = %self.id, organ = %self.config.organ_id, "waiting for readiness marker");
        self.phase = Phase::Polling { attempts: 0 };
        self.emit_status(HarvestStatus::WaitingForMarker);
        if let Some(bridge) = self.debug.as_mut() {
            bridge.start(now);
        }
        self.probe(now);
    }

    /// Replace the document without scanning it.
    pub fn update_document(&mut self, markup: impl Into<String>) {
        self.markup = markup.into();
    }

    /// Apply a mutation batch. Added nodes re-arm the trailing rescan.
    pub fn on_mutation(&mut self, batch: MutationBatch, now: Instant) {
        if let Some(markup) = batch.markup {
            self.markup = markup;
        }
        if self.phase == Phase::Active && batch.added_nodes > 0 {
            self.rescan_at = Some(now + self.config.rescan_debounce());
        }
    }

    /// Stop all timers and hand any queued records out as a final batch.
    pub fn shutdown(&mut self) {
        self.poll_at = None;
        self.rescan_at = None;
        for state in &mut self.targets {
            state.next_due = None;
        }
        if let Some(bridge) = self.debug.as_mut() {
            bridge.stop();
        }
        self.flush();
        info!(session = %self.id, "harvester session closed");
    }

    // ── Targets ──────────────────────────────────────────────────────────

    /// Start harvesting a committed pattern. A target of the same name is
    /// replaced, seen set included.
    pub fn add_pattern_target(&mut self, pattern: &Pattern, now: Instant) {
        self.remove_target(&pattern.name);
        self.targets
            .push(TargetState::new(ScanTarget::from_pattern(pattern)));
        info!(pattern = %pattern.name, "pattern target added");

        if self.phase == Phase::Active {
            let idx = self.targets.len() - 1;
            self.scan_index(idx, now);
        }
    }

    /// Stop harvesting a target. Returns whether it existed.
    pub fn remove_target(&mut self, name: &str) -> bool {
        let before = self.targets.len();
        self.targets.retain(|t| t.target.name != name);
        before != self.targets.len()
    }

    // ── Scheduling ───────────────────────────────────────────────────────

    /// Earliest instant at which [`advance`](Self::advance) has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        let target_due = self.targets.iter().filter_map(|t| t.next_due);
        let debug_due = self.debug.as_ref().and_then(DebugBridge::next_deadline);
        [self.poll_at, self.rescan_at, self.queue.flush_deadline(), debug_due]
            .into_iter()
            .flatten()
            .chain(target_due)
            .min()
    }

    /// Run everything due at `now`.
    pub fn advance(&mut self, now: Instant) {
        if matches!(self.poll_at, Some(at) if at <= now) {
            self.probe(now);
        }

        if matches!(self.rescan_at, Some(at) if at <= now) {
            self.rescan_at = None;
            self.scan_all(now);
        }

        let due: Vec<usize> = self
            .targets
            .iter()
            .enumerate()
            .filter(|(_, t)| matches!(t.next_due, Some(at) if at <= now))
            .map(|(idx, _)| idx)
            .collect();
        if !due.is_empty() {
            let document = Html::parse_document(&self.markup);
            for idx in due {
                self.scan_in(&document, idx, now);
            }
        }

        if self.queue.is_due(now) {
            self.flush();
        }

        if let Some(mut bridge) = self.debug.take() {
            let messages = bridge.advance(now, self);
            self.outbox.extend(messages);
            self.debug = Some(bridge);
        }
    }

    fn probe(&mut self, now: Instant) {
        let Phase::Polling { attempts } = self.phase else {
            return;
        };

        if self.marker_present() {
            self.activate(now);
            return;
        }

        let attempts = attempts + 1;
        debug!(attempts, "readiness marker not found");
        if attempts >= self.config.max_retries {
            self.phase = Phase::TimedOut;
            if let Some(err) = self.failure() {
                warn!(organ = %self.config.organ_id, "{err}, giving up");
            }
            self.poll_at = None;
            if let Some(bridge) = self.debug.as_mut() {
                bridge.stop();
            }
            self.emit_status(HarvestStatus::Timeout);
        } else {
            self.phase = Phase::Polling { attempts };
            self.poll_at = Some(now + self.config.poll_interval());
        }
    }

    fn marker_present(&self) -> bool {
        if self.markup.is_empty() {
            return false;
        }
        let document = Html::parse_document(&self.markup);
        self.config
            .readiness_markers
            .iter()
            .filter_map(|m| parse_selector(m).ok())
            .any(|sel| document.select(&sel).next().is_some())
    }

    fn activate(&mut self, now: Instant) {
        info!(session = %self.id, organ = %self.config.organ_id, "host page ready");
        self.phase = Phase::Active;
        self.poll_at = None;
        self.emit_status(HarvestStatus::Connected);
        self.scan_all(now);
    }

    /// Scan every target once against the current document.
    pub fn scan_all(&mut self, now: Instant) -> usize {
        if self.phase != Phase::Active {
            return 0;
        }
        let document = Html::parse_document(&self.markup);
        (0..self.targets.len())
            .map(|idx| self.scan_in(&document, idx, now))
            .sum()
    }

    fn scan_index(&mut self, idx: usize, now: Instant) -> usize {
        let document = Html::parse_document(&self.markup);
        self.scan_in(&document, idx, now)
    }

    /// Scan one target, queue its new records and re-arm its backstop.
    fn scan_in(&mut self, document: &Html, idx: usize, now: Instant) -> usize {
        let root = harvest_root(document, &self.config.harvest_roots);
        let observed_at = now_timestamp();
        let flush_delay = self.config.flush_delay();

        let Some(state) = self.targets.get_mut(idx) else {
            return 0;
        };
        let outcome = state.target.scan(root, &mut state.seen, &observed_at);
        state.next_due = Some(now + state.target.interval);

        let count = outcome.records.len();
        for record in outcome.records {
            state.remember(&record);
            if self.queue.push(record, now, flush_delay) {
                debug!("flush armed");
            }
        }
        count
    }

    fn flush(&mut self) {
        if let Some(records) = self.queue.take() {
            info!(count = records.len(), "flushing batch");
            self.outbox.push(RelayMessage::Batch {
                organ_id: self.config.organ_id.clone(),
                records,
            });
        }
    }

    fn emit_status(&mut self, status: HarvestStatus) {
        self.outbox
            .push(RelayMessage::status(&self.config.organ_id, status));
    }
}
