// Copyright 2026 Lexicon Contributors
// SPDX-License-Identifier: Apache-2.0

//! Debug snapshots and the selector query bridge.
//!
//! An external inspector sees the page the way the harvester sees it: a
//! bounded descriptor tree of the harvest root, a scan report with hit
//! counts for every known strategy, and ad-hoc selector queries posted
//! through a single-slot [`QuerySlot`]. Nothing here can fail the harvester;
//! bad selectors come back as `{count: -1, error}`.

use crate::dom::{direct_text, harvest_root, parse_selector, truncate_chars};
use crate::events::RelayMessage;
use crate::harvester::record::HarvestRecord;
use crate::harvester::session::HarvesterSession;
use crate::harvester::target::{CandidateSource, TargetKind};
use crate::matcher::find_candidates;
use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Deepest level included in a snapshot tree.
pub const MAX_DEPTH: usize = 14;

/// Maximum class tokens per descriptor.
const MAX_NODE_CLASSES: usize = 6;

/// Direct text is cut to this many characters.
const DIRECT_TEXT_CHARS: usize = 80;

/// Query results returned per selector.
pub const MAX_QUERY_RESULTS: usize = 30;

/// Attributes copied into descriptors when present.
const SELECT_ATTRIBUTES: &[&str] = &[
    "role",
    "aria-label",
    "title",
    "data-testid",
    "data-id",
    "data-pre-plain-text",
    "dir",
    "href",
    "src",
];

/// Children kept per node: generous near the root, tight deep down.
fn child_cap(depth: usize) -> usize {
    match depth {
        0..=1 => 50,
        2..=4 => 25,
        _ => 10,
    }
}

/// Owned, serializable description of one element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDescriptor {
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeDescriptor>,
    /// Children omitted because of the per-depth cap.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub truncated: usize,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl NodeDescriptor {
    /// Describe a single element without its children.
    pub fn describe(el: &ElementRef<'_>) -> Self {
        let value = el.value();
        let attributes = SELECT_ATTRIBUTES
            .iter()
            .filter_map(|name| {
                value
                    .attr(name)
                    .map(|v| (name.to_string(), truncate_chars(v, DIRECT_TEXT_CHARS)))
            })
            .collect();

        Self {
            tag: value.name().to_string(),
            id: value.id().map(str::to_string),
            classes: value
                .classes()
                .take(MAX_NODE_CLASSES)
                .map(str::to_string)
                .collect(),
            attributes,
            text: truncate_chars(&direct_text(el), DIRECT_TEXT_CHARS),
            children: Vec::new(),
            truncated: 0,
        }
    }

    /// Describe an element and its descendants down to `max_depth`.
    pub fn tree(el: &ElementRef<'_>, max_depth: usize) -> Self {
        Self::tree_at(el, 0, max_depth)
    }

    fn tree_at(el: &ElementRef<'_>, depth: usize, max_depth: usize) -> Self {
        let mut node = Self::describe(el);
        let children: Vec<ElementRef<'_>> = el.children().filter_map(ElementRef::wrap).collect();
        if depth >= max_depth {
            node.truncated = children.len();
            return node;
        }
        let cap = child_cap(depth);
        node.truncated = children.len().saturating_sub(cap);
        node.children = children
            .iter()
            .take(cap)
            .map(|child| Self::tree_at(child, depth + 1, max_depth))
            .collect();
        node
    }
}

// ── Scan report ──────────────────────────────────────────────────────────────

/// How many elements one selector or strategy matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorHits {
    pub selector: String,
    pub hits: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetReport {
    pub name: String,
    pub kind: TargetKind,
    pub seen_size: usize,
    /// Hits per strategy (one entry per fallback strategy, or a single entry
    /// with the match count for pattern targets).
    pub strategies: Vec<SelectorHits>,
    pub recent: Vec<HarvestRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub session_id: String,
    pub phase: String,
    pub queued: usize,
    pub markers: Vec<SelectorHits>,
    pub targets: Vec<TargetReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugSnapshot {
    pub tree: NodeDescriptor,
    pub scan_report: ScanReport,
}

fn count_hits(root: ElementRef<'_>, selector: &str) -> usize {
    parse_selector(selector)
        .map(|sel| root.select(&sel).count())
        .unwrap_or(0)
}

/// Capture the current state of a session.
pub fn snapshot(session: &HarvesterSession) -> DebugSnapshot {
    let document = Html::parse_document(session.markup());
    let root = harvest_root(&document, &session.config().harvest_roots);

    let markers = session
        .config()
        .readiness_markers
        .iter()
        .map(|m| SelectorHits {
            selector: m.clone(),
            hits: count_hits(document.root_element(), m),
        })
        .collect();

    let targets = session
        .targets()
        .iter()
        .map(|state| {
            let target = state.target();
            let strategies = match &target.source {
                CandidateSource::Fallback(strategies) => strategies
                    .iter()
                    .map(|s| SelectorHits {
                        selector: s.label(),
                        hits: s.apply(root).len(),
                    })
                    .collect(),
                CandidateSource::Pattern(fp, _) => vec![SelectorHits {
                    selector: format!("fingerprint:{}", fp.tag),
                    hits: find_candidates(fp, root).map(|c| c.len()).unwrap_or(0),
                }],
            };
            TargetReport {
                name: target.name.clone(),
                kind: target.kind,
                seen_size: state.seen_len(),
                strategies,
                recent: state.recent().cloned().collect(),
            }
        })
        .collect();

    DebugSnapshot {
        tree: NodeDescriptor::tree(&root, MAX_DEPTH),
        scan_report: ScanReport {
            session_id: session.id().to_string(),
            phase: session.phase().to_string(),
            queued: session.queued(),
            markers,
            targets,
        },
    }
}

// ── Query bridge ─────────────────────────────────────────────────────────────

/// Single-slot mailbox for a pending selector query. A newer query replaces
/// one that has not been picked up yet.
#[derive(Debug, Clone, Default)]
pub struct QuerySlot {
    pending: Arc<Mutex<Option<String>>>,
}

impl QuerySlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, selector: impl Into<String>) {
        let mut guard = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(selector.into());
    }

    pub fn take(&self) -> Option<String> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }
}

/// Answer to one selector query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub selector: String,
    /// Number of matches, or -1 when the selector is invalid.
    pub count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<NodeDescriptor>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Run a selector against the whole document.
pub fn execute_query(document: &Html, selector: &str) -> QueryResult {
    match parse_selector(selector) {
        Ok(sel) => {
            let matched: Vec<ElementRef<'_>> = document.select(&sel).collect();
            QueryResult {
                selector: selector.to_string(),
                count: matched.len() as i64,
                results: Some(
                    matched
                        .iter()
                        .take(MAX_QUERY_RESULTS)
                        .map(NodeDescriptor::describe)
                        .collect(),
                ),
                error: None,
            }
        }
        Err(e) => QueryResult {
            selector: selector.to_string(),
            count: -1,
            results: None,
            error: Some(e.to_string()),
        },
    }
}

/// Drives periodic snapshots and query polling for one session.
#[derive(Debug)]
pub struct DebugBridge {
    slot: QuerySlot,
    snapshots: bool,
    snapshot_interval: Duration,
    query_interval: Duration,
    snapshot_at: Option<Instant>,
    query_at: Option<Instant>,
}

impl DebugBridge {
    pub fn new(
        slot: QuerySlot,
        snapshots: bool,
        snapshot_interval: Duration,
        query_interval: Duration,
    ) -> Self {
        Self {
            slot,
            snapshots,
            snapshot_interval,
            query_interval,
            snapshot_at: None,
            query_at: None,
        }
    }

    pub fn slot(&self) -> &QuerySlot {
        &self.slot
    }

    pub fn start(&mut self, now: Instant) {
        self.query_at = Some(now + self.query_interval);
        if self.snapshots {
            self.snapshot_at = Some(now + self.snapshot_interval);
        }
    }

    pub fn stop(&mut self) {
        self.query_at = None;
        self.snapshot_at = None;
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.query_at, self.snapshot_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Run whatever is due at `now` and return the messages it produced.
    pub fn advance(&mut self, now: Instant, session: &HarvesterSession) -> Vec<RelayMessage> {
        let mut out = Vec::new();
        let organ_id = &session.config().organ_id;

        if matches!(self.query_at, Some(at) if at <= now) {
            self.query_at = Some(now + self.query_interval);
            if let Some(selector) = self.slot.take() {
                let document = Html::parse_document(session.markup());
                let result = execute_query(&document, &selector);
                debug!(selector = %selector, count = result.count, "query answered");
                out.push(RelayMessage::QueryResult {
                    organ_id: organ_id.clone(),
                    result,
                });
            }
        }

        if matches!(self.snapshot_at, Some(at) if at <= now) {
            self.snapshot_at = Some(now + self.snapshot_interval);
            out.push(RelayMessage::DebugSnapshot {
                organ_id: organ_id.clone(),
                snapshot: snapshot(session),
            });
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_fields() {
        let html = Html::parse_fragment(
            r#"<div id="x" class="a b c d e f g h" role="row" data-foo="no">  hello <b>bold</b></div>"#,
        );
        let el = crate::dom::fragment_element(&html).unwrap();
        let node = NodeDescriptor::describe(&el);
        assert_eq!(node.tag, "div");
        assert_eq!(node.id.as_deref(), Some("x"));
        assert_eq!(node.classes.len(), MAX_NODE_CLASSES);
        assert_eq!(node.attributes.get("role").map(String::as_str), Some("row"));
        assert!(!node.attributes.contains_key("data-foo"));
        assert_eq!(node.text, "hello");
    }

    #[test]
    fn test_tree_caps_children_with_marker() {
        let items: String = (0..60).map(|i| format!("<li>{i}</li>")).collect();
        let html = Html::parse_fragment(&format!("<ul>{items}</ul>"));
        let ul = crate::dom::fragment_element(&html).unwrap();
        let tree = NodeDescriptor::tree(&ul, MAX_DEPTH);
        assert_eq!(tree.children.len(), 50);
        assert_eq!(tree.truncated, 10);
    }

    #[test]
    fn test_tree_depth_bound() {
        let mut markup = String::new();
        for _ in 0..20 {
            markup.push_str("<div>");
        }
        for _ in 0..20 {
            markup.push_str("</div>");
        }
        let html = Html::parse_fragment(&markup);
        let top = crate::dom::fragment_element(&html).unwrap();
        let tree = NodeDescriptor::tree(&top, MAX_DEPTH);

        let mut depth = 0;
        let mut node = &tree;
        while let Some(child) = node.children.first() {
            node = child;
            depth += 1;
        }
        assert_eq!(depth, MAX_DEPTH);
        assert_eq!(node.truncated, 1);
    }

    #[test]
    fn test_deep_tier_cap() {
        let leaves: String = (0..12).map(|_| "<i></i>").collect();
        let markup = format!("<div><div><div><div><div><p>{leaves}</p></div></div></div></div></div>");
        let html = Html::parse_fragment(&markup);
        let top = crate::dom::fragment_element(&html).unwrap();
        let tree = NodeDescriptor::tree(&top, MAX_DEPTH);
        let p = &tree.children[0].children[0].children[0].children[0].children[0];
        assert_eq!(p.tag, "p");
        assert_eq!(p.children.len(), 10);
        assert_eq!(p.truncated, 2);
    }

    #[test]
    fn test_query_valid_selector() {
        let doc = Html::parse_document("<ul><li class='a'>1</li><li class='a'>2</li></ul>");
        let result = execute_query(&doc, "li.a");
        assert_eq!(result.count, 2);
        assert_eq!(result.results.as_ref().unwrap().len(), 2);
        assert!(result.error.is_none());
    }

    #[test]
    fn test_query_invalid_selector() {
        let doc = Html::parse_document("<p></p>");
        let result = execute_query(&doc, "div[[[");
        assert_eq!(result.count, -1);
        assert!(result.error.is_some());
        assert!(result.results.is_none());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["count"], -1);
        assert!(json.get("results").is_none());
    }

    #[test]
    fn test_query_results_capped() {
        let items: String = (0..40).map(|i| format!("<li>{i}</li>")).collect();
        let doc = Html::parse_document(&format!("<ul>{items}</ul>"));
        let result = execute_query(&doc, "li");
        assert_eq!(result.count, 40);
        assert_eq!(result.results.unwrap().len(), MAX_QUERY_RESULTS);
    }

    #[test]
    fn test_query_slot_keeps_latest() {
        let slot = QuerySlot::new();
        let other = slot.clone();
        slot.put("a");
        other.put("b");
        assert_eq!(slot.take().as_deref(), Some("b"));
        assert_eq!(other.take(), None);
    }
}
