// Copyright 2026 Lexicon Contributors
// SPDX-License-Identifier: Apache-2.0

//! Scan targets: where to look, how to identify what is found, and how to
//! turn a found element into a record.
//!
//! A target scan is synchronous and pure apart from the seen set it is
//! handed. The session decides when to scan and where the records go.

use super::record::{HarvestRecord, RecordId, SeenSet};
use super::rules::PatternFieldsRule;
use crate::dom::element_text;
use crate::fingerprint::Fingerprint;
use crate::patterns::Pattern;
use crate::resolver::{resolve, resolve_with_hit, Strategy};
use scraper::ElementRef;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Broad category of a scan target; decides its default backstop cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// Rows of a list pane (e.g. conversations).
    List,
    /// Items of the currently open detail view (e.g. messages).
    Detail,
    /// Matches of an operator-committed pattern.
    Pattern,
}

impl TargetKind {
    pub fn default_interval(self) -> Duration {
        match self {
            Self::List => Duration::from_secs(5),
            Self::Detail => Duration::from_secs(3),
            Self::Pattern => Duration::from_secs(10),
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::List => write!(f, "list"),
            Self::Detail => write!(f, "detail"),
            Self::Pattern => write!(f, "pattern"),
        }
    }
}

/// How candidate elements are located.
#[derive(Debug, Clone)]
pub enum CandidateSource {
    /// Hardcoded selector chain, first non-empty wins.
    Fallback(Vec<Strategy>),
    /// Structural match against a committed fingerprint, keeping only valid
    /// matches with distinct content.
    Pattern(Fingerprint, PatternFieldsRule),
}

/// Where the container part of a derived id comes from.
#[derive(Debug, Clone)]
pub enum ContainerKey {
    Fixed(String),
    /// Read from the page on each scan: the `attr` of the first resolved
    /// element (its text when `attr` is `None`), else `fallback`.
    Resolved {
        strategies: Vec<Strategy>,
        attr: Option<String>,
        fallback: String,
    },
}

impl ContainerKey {
    pub fn resolve(&self, root: ElementRef<'_>) -> String {
        match self {
            Self::Fixed(key) => key.clone(),
            Self::Resolved {
                strategies,
                attr,
                fallback,
            } => resolve(strategies, root)
                .first()
                .and_then(|el| match attr {
                    Some(name) => el.value().attr(name).map(|v| v.trim().to_string()),
                    None => Some(element_text(el)),
                })
                .filter(|key| !key.is_empty())
                .unwrap_or_else(|| fallback.clone()),
        }
    }
}

/// How a candidate's [`RecordId`] is computed.
#[derive(Debug, Clone)]
pub struct IdentityRule {
    /// Attributes holding a page-native id, tried in order on the element
    /// and then on its descendants.
    pub native_attrs: Vec<String>,
    pub container: ContainerKey,
}

impl IdentityRule {
    pub fn identify(&self, el: &ElementRef<'_>, container_key: &str, index: usize) -> RecordId {
        for attr in &self.native_attrs {
            if let Some(id) = native_id(el, attr) {
                return RecordId::native(id);
            }
        }
        RecordId::derived(container_key, index, &element_text(el))
    }
}

fn native_id(el: &ElementRef<'_>, attr: &str) -> Option<String> {
    let own = el.value().attr(attr).filter(|v| !v.trim().is_empty());
    if let Some(id) = own {
        return Some(id.trim().to_string());
    }
    el.descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .find_map(|d| d.value().attr(attr).filter(|v| !v.trim().is_empty()))
        .map(|v| v.trim().to_string())
}

/// Per-scan facts an extraction rule may need.
#[derive(Debug, Clone, Copy)]
pub struct ScanContext<'c> {
    pub target: &'c str,
    pub container_key: &'c str,
    /// RFC 3339 time of the scan, used when the page shows no timestamp.
    pub observed_at: &'c str,
}

/// Fields pulled out of one element by an [`ExtractionRule`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub group_key: String,
    pub subject_key: String,
    pub text: String,
    pub timestamp: Option<String>,
    pub extra_fields: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Turns a located element into record fields. `None` skips the element
/// without marking it seen, so it is retried on the next scan.
pub trait ExtractionRule: Send + Sync {
    fn name(&self) -> &str;
    fn extract(&self, el: &ElementRef<'_>, ctx: &ScanContext<'_>) -> Option<Extraction>;
}

/// One thing the harvester keeps scanning for.
#[derive(Clone)]
pub struct ScanTarget {
    pub name: String,
    pub kind: TargetKind,
    pub source: CandidateSource,
    pub identity: IdentityRule,
    pub extractor: Arc<dyn ExtractionRule>,
    pub interval: Duration,
}

impl fmt::Debug for ScanTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanTarget")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("source", &self.source)
            .field("extractor", &self.extractor.name())
            .field("interval", &self.interval)
            .finish()
    }
}

/// What one target scan produced.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// New records in scan order.
    pub records: Vec<HarvestRecord>,
    /// Number of candidate elements located.
    pub candidates: usize,
    /// Index of the winning fallback strategy, if any.
    pub strategy_hit: Option<usize>,
}

impl ScanTarget {
    /// A target that keeps harvesting the matches of a committed pattern.
    pub fn from_pattern(pattern: &Pattern) -> Self {
        Self {
            name: pattern.name.clone(),
            kind: TargetKind::Pattern,
            source: CandidateSource::Pattern(
                pattern.fingerprint.clone(),
                PatternFieldsRule::new(pattern.fields.clone()),
            ),
            identity: IdentityRule {
                native_attrs: vec!["data-id".into(), "id".into()],
                container: ContainerKey::Fixed(pattern.name.clone()),
            },
            extractor: Arc::new(PatternFieldsRule::new(pattern.fields.clone())),
            interval: TargetKind::Pattern.default_interval(),
        }
    }

    /// Locate candidates under `root`, in the order records should be emitted.
    pub fn locate<'a>(&self, root: ElementRef<'a>) -> (Vec<ElementRef<'a>>, Option<usize>) {
        match &self.source {
            CandidateSource::Fallback(strategies) => {
                let hit = resolve_with_hit(strategies, root);
                (hit.elements, hit.strategy)
            }
            CandidateSource::Pattern(fp, rule) => match rule.matches(fp, root) {
                Ok(found) => (found.into_iter().map(|m| m.element).collect(), None),
                Err(e) => {
                    warn!(target_name = %self.name, "pattern scan skipped: {e}");
                    (Vec::new(), None)
                }
            },
        }
    }

    /// Run one scan: locate, identify, skip seen, extract, mark seen.
    pub fn scan(&self, root: ElementRef<'_>, seen: &mut SeenSet, observed_at: &str) -> ScanOutcome {
        let (elements, strategy_hit) = self.locate(root);
        let container_key = self.identity.container.resolve(root);
        let ctx = ScanContext {
            target: &self.name,
            container_key: &container_key,
            observed_at,
        };

        let mut records = Vec::new();
        for (index, el) in elements.iter().enumerate() {
            let id = self.identity.identify(el, &container_key, index);
            if seen.contains(&id) {
                continue;
            }
            let Some(extraction) = self.extractor.extract(el, &ctx) else {
                continue;
            };
            seen.insert(id.clone());
            records.push(HarvestRecord {
                record_id: id,
                target: self.name.clone(),
                group_key: extraction.group_key,
                subject_key: extraction.subject_key,
                text: extraction.text,
                timestamp: extraction
                    .timestamp
                    .unwrap_or_else(|| observed_at.to_string()),
                extra_fields: extraction.extra_fields,
            });
        }

        debug!(
            target_name = %self.name,
            candidates = elements.len(),
            new_records = records.len(),
            "scanned"
        );

        ScanOutcome {
            records,
            candidates: elements.len(),
            strategy_hit,
        }
    }
}
