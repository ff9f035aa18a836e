// Copyright 2026 Lexicon Contributors
// SPDX-License-Identifier: Apache-2.0

//! Extraction rules.
//!
//! Each rule is a small strategy object that knows how to read one kind of
//! element. Rules never touch harvester state; they see a borrowed element
//! and a [`ScanContext`] and either produce an [`Extraction`] or decline.

use super::target::{Extraction, ExtractionRule, ScanContext};
use crate::dom::{collapse_whitespace, direct_text, element_text, parse_selector, truncate_chars};
use crate::error::Result;
use crate::fingerprint::{extract_fields, FieldExtract, FieldSpec, Fingerprint};
use crate::matcher::{find_candidates, preview_text};
use fnv::FnvHashSet;
use regex::Regex;
use scraper::ElementRef;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::OnceLock;

// ── Chat list rows ───────────────────────────────────────────────────────────

/// Reads a conversation row of a messenger side pane.
///
/// The contact is the first `title` attribute in the row, the preview the
/// second. An element whose `aria-label` mentions "unread" is the badge.
#[derive(Debug, Default)]
pub struct ChatRowRule;

fn clock_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(\d{1,2}:\d{2}(\s?[ap]\.?m\.?)?|yesterday|today|\d{1,2}/\d{1,2}/\d{2,4}|monday|tuesday|wednesday|thursday|friday|saturday|sunday)$")
            .expect("clock regex is valid")
    })
}

fn first_number(text: &str) -> Option<u64> {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

impl ExtractionRule for ChatRowRule {
    fn name(&self) -> &str {
        "chat_row"
    }

    fn extract(&self, el: &ElementRef<'_>, ctx: &ScanContext<'_>) -> Option<Extraction> {
        let titled: Vec<&str> = el
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter_map(|d| d.value().attr("title"))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect();

        let contact = titled.first()?.to_string();
        let preview = titled.get(1).map(|t| t.to_string()).unwrap_or_default();

        let mut extra = Map::new();

        let badge = el.descendants().filter_map(ElementRef::wrap).find(|d| {
            d.value()
                .attr("aria-label")
                .is_some_and(|label| label.to_lowercase().contains("unread"))
        });
        if let Some(badge) = badge {
            let count = first_number(&element_text(&badge))
                .or_else(|| badge.value().attr("aria-label").and_then(first_number));
            if let Some(count) = count {
                extra.insert("unread".into(), Value::from(count));
            }
        }

        let clock = el
            .descendants()
            .filter_map(ElementRef::wrap)
            .map(|d| direct_text(&d))
            .find(|t| clock_re().is_match(t));
        if let Some(time) = clock {
            extra.insert("time".into(), Value::String(time));
        }

        Some(Extraction {
            group_key: ctx.container_key.to_string(),
            subject_key: contact,
            text: preview,
            timestamp: None,
            extra_fields: (!extra.is_empty()).then_some(extra),
        })
    }
}

// ── Conversation messages ────────────────────────────────────────────────────

/// Reads one message bubble of the open conversation.
///
/// Sender and time come from the `data-pre-plain-text` attribute
/// (`[10:42, 1/2/2026] Alice: `), text from `selectable-text` spans and the
/// direction from `message-in` / `message-out` classes.
#[derive(Debug, Default)]
pub struct MessageRule;

fn pre_plain_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\[(?P<time>[^\]]+)\]\s*(?P<sender>[^:]+):")
            .expect("pre-plain-text regex is valid")
    })
}

fn has_class_nearby(el: &ElementRef<'_>, class: &str) -> bool {
    let on_self_or_below = el
        .descendants()
        .filter_map(ElementRef::wrap)
        .any(|d| d.value().has_class(class, scraper::CaseSensitivity::CaseSensitive));
    on_self_or_below
        || el
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|a| a.value().has_class(class, scraper::CaseSensitivity::CaseSensitive))
}

impl ExtractionRule for MessageRule {
    fn name(&self) -> &str {
        "message"
    }

    fn extract(&self, el: &ElementRef<'_>, ctx: &ScanContext<'_>) -> Option<Extraction> {
        let meta = el
            .descendants()
            .filter_map(ElementRef::wrap)
            .find_map(|d| d.value().attr("data-pre-plain-text"))
            .and_then(|raw| pre_plain_re().captures(raw.trim()));
        let (time, sender) = match &meta {
            Some(caps) => (
                caps.name("time").map(|m| m.as_str().trim().to_string()),
                caps.name("sender").map(|m| m.as_str().trim().to_string()),
            ),
            None => (None, None),
        };

        let selectable = parse_selector("span.selectable-text, span[data-testid='selectable-text']").ok()?;
        let parts: Vec<String> = el
            .select(&selectable)
            .map(|s| element_text(&s))
            .filter(|t| !t.is_empty())
            .collect();
        let text = if parts.is_empty() {
            let copyable = parse_selector(".copyable-text").ok()?;
            el.select(&copyable)
                .map(|c| element_text(&c))
                .find(|t| !t.is_empty())?
        } else {
            parts.join(" ")
        };

        let direction = if has_class_nearby(el, "message-out") {
            "out"
        } else if has_class_nearby(el, "message-in") {
            "in"
        } else {
            "unknown"
        };

        let subject_key = match sender {
            Some(sender) => sender,
            None if direction == "out" => "me".to_string(),
            None => ctx.container_key.to_string(),
        };

        let mut extra = Map::new();
        extra.insert("direction".into(), Value::String(direction.into()));
        if let Some(time) = time {
            extra.insert("time".into(), Value::String(time));
        }

        Some(Extraction {
            group_key: ctx.container_key.to_string(),
            subject_key,
            text,
            timestamp: None,
            extra_fields: Some(extra),
        })
    }
}

// ── Committed patterns ───────────────────────────────────────────────────────

/// Share of a pattern's fields a match must populate to count as real.
const MIN_FIELD_RATIO: f64 = 0.4;

/// Text that is page plumbing rather than content.
fn garbage_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*\{|^\s*\[|resolvedServerColorMode|data-hydro|uh oh|reload this page|skip to content|there was an error")
            .expect("garbage regex is valid")
    })
}

/// Characters of each value that count towards a content key.
const CONTENT_KEY_CHARS: usize = 80;

/// A pattern match that passed validation.
#[derive(Debug, Clone)]
pub struct PatternMatch<'a> {
    pub element: ElementRef<'a>,
    pub text: String,
    pub fields: BTreeMap<String, String>,
}

/// Extracts the discovered fields of a committed pattern.
#[derive(Debug, Clone)]
pub struct PatternFieldsRule {
    fields: Vec<FieldSpec>,
}

impl PatternFieldsRule {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    /// Fewest populated fields a match needs: 40% of the sample's fields,
    /// at least two, never more than the sample has.
    pub fn min_populated(&self) -> usize {
        let needed = (self.fields.len() as f64 * MIN_FIELD_RATIO).ceil() as usize;
        needed.max(2).min(self.fields.len())
    }

    /// Preview text and field values of `el`, or `None` when it is too
    /// sparse or looks like page plumbing.
    pub fn validate(&self, el: &ElementRef<'_>) -> Option<(String, BTreeMap<String, String>)> {
        let text = preview_text(el);
        if text.is_empty() || garbage_re().is_match(&text) {
            return None;
        }

        let values = extract_fields(&self.fields, el);
        if !self.fields.is_empty() && values.len() < self.min_populated() {
            return None;
        }
        if values.values().any(|v| garbage_re().is_match(v)) {
            return None;
        }
        Some((text, values))
    }

    /// Every valid match of `fp` under `root` in page order, keeping only
    /// the first of several matches with the same content.
    pub fn matches<'a>(&self, fp: &Fingerprint, root: ElementRef<'a>) -> Result<Vec<PatternMatch<'a>>> {
        let mut candidates = find_candidates(fp, root)?;
        candidates.sort_by_key(|c| c.position);

        let mut seen = FnvHashSet::default();
        let mut out = Vec::new();
        for candidate in candidates {
            let Some((text, fields)) = self.validate(&candidate.element) else {
                continue;
            };
            if !seen.insert(content_key(&text, &fields)) {
                continue;
            }
            out.push(PatternMatch {
                element: candidate.element,
                text,
                fields,
            });
        }
        Ok(out)
    }
}

/// Normalised content of a match: its field values when it has any, its
/// text otherwise.
fn content_key(text: &str, fields: &BTreeMap<String, String>) -> String {
    let normalise = |v: &str| truncate_chars(&collapse_whitespace(&v.to_lowercase()), CONTENT_KEY_CHARS);
    if fields.is_empty() {
        return normalise(text);
    }
    fields
        .iter()
        .map(|(k, v)| format!("{k}:{}", normalise(v)))
        .collect::<Vec<_>>()
        .join("|")
}

impl ExtractionRule for PatternFieldsRule {
    fn name(&self) -> &str {
        "pattern_fields"
    }

    fn extract(&self, el: &ElementRef<'_>, ctx: &ScanContext<'_>) -> Option<Extraction> {
        let (text, values) = self.validate(el)?;

        let subject_key = self
            .fields
            .iter()
            .filter(|f| f.extract == FieldExtract::Text)
            .find_map(|f| values.get(&f.label))
            .cloned()
            .unwrap_or_default();

        let extra: Map<String, Value> = values
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();

        Some(Extraction {
            group_key: ctx.target.to_string(),
            subject_key,
            text,
            timestamp: None,
            extra_fields: (!extra.is_empty()).then_some(extra),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::fragment_element;
    use scraper::Html;

    fn ctx<'c>() -> ScanContext<'c> {
        ScanContext {
            target: "t",
            container_key: "Bob",
            observed_at: "2026-01-01T00:00:00Z",
        }
    }

    #[test]
    fn test_chat_row_rule() {
        let html = Html::parse_fragment(
            r#"<div role="listitem">
                 <span title="Alice">Alice</span>
                 <div>10:42</div>
                 <span title="Hi">Hi</span>
                 <span aria-label="2 unread messages">2</span>
               </div>"#,
        );
        let row = fragment_element(&html).unwrap();
        let out = ChatRowRule.extract(&row, &ctx()).unwrap();
        assert_eq!(out.subject_key, "Alice");
        assert_eq!(out.text, "Hi");
        let extra = out.extra_fields.unwrap();
        assert_eq!(extra["unread"], 2);
        assert_eq!(extra["time"], "10:42");
    }

    #[test]
    fn test_chat_row_without_contact_is_skipped() {
        let html = Html::parse_fragment("<div><span>no title</span></div>");
        let row = fragment_element(&html).unwrap();
        assert!(ChatRowRule.extract(&row, &ctx()).is_none());
    }

    #[test]
    fn test_message_rule_incoming() {
        let html = Html::parse_fragment(
            r#"<div class="message-in">
                 <div class="copyable-text" data-pre-plain-text="[10:42, 1/2/2026] Alice: ">
                   <span class="selectable-text"><span>See you</span></span>
                 </div>
               </div>"#,
        );
        let bubble = fragment_element(&html).unwrap();
        let out = MessageRule.extract(&bubble, &ctx()).unwrap();
        assert_eq!(out.subject_key, "Alice");
        assert_eq!(out.text, "See you");
        assert_eq!(out.group_key, "Bob");
        let extra = out.extra_fields.unwrap();
        assert_eq!(extra["direction"], "in");
        assert_eq!(extra["time"], "10:42, 1/2/2026");
    }

    #[test]
    fn test_message_rule_outgoing_without_meta() {
        let html = Html::parse_fragment(
            r#"<div class="message-out"><span class="selectable-text">ok</span></div>"#,
        );
        let bubble = fragment_element(&html).unwrap();
        let out = MessageRule.extract(&bubble, &ctx()).unwrap();
        assert_eq!(out.subject_key, "me");
        assert_eq!(out.text, "ok");
    }

    #[test]
    fn test_message_rule_needs_text() {
        let html = Html::parse_fragment(r#"<div class="message-in"><img src="x.png"></div>"#);
        let bubble = fragment_element(&html).unwrap();
        assert!(MessageRule.extract(&bubble, &ctx()).is_none());
    }

    #[test]
    fn test_pattern_rule_requires_field_ratio() {
        let sample = Fingerprint::from_fragment(
            r#"<div class="card"><h3>Name</h3><p>Body text</p><small>meta</small></div>"#,
        )
        .unwrap();
        let rule = PatternFieldsRule::new(sample.fields.clone());
        assert_eq!(sample.fields.len(), 3);
        assert_eq!(rule.min_populated(), 2);

        let full = Html::parse_fragment(r#"<div class="card"><h3>Other</h3><p>More</p></div>"#);
        let out = rule.extract(&fragment_element(&full).unwrap(), &ctx()).unwrap();
        assert_eq!(out.subject_key, "Other");
        assert_eq!(out.group_key, "t");
        assert_eq!(out.extra_fields.unwrap()["p"], "More");

        let sparse = Html::parse_fragment(r#"<div class="card"><h3>Only</h3></div>"#);
        assert!(rule.extract(&fragment_element(&sparse).unwrap(), &ctx()).is_none());
    }

    #[test]
    fn test_pattern_rule_rejects_garbage() {
        let rule = PatternFieldsRule::new(Vec::new());
        let html = Html::parse_fragment(r#"<div>{"resolvedServerColorMode":"day"}</div>"#);
        assert!(rule.extract(&fragment_element(&html).unwrap(), &ctx()).is_none());

        let html = Html::parse_fragment("<div>Plain content</div>");
        let out = rule.extract(&fragment_element(&html).unwrap(), &ctx()).unwrap();
        assert_eq!(out.text, "Plain content");
        assert!(out.extra_fields.is_none());
    }

    #[test]
    fn test_min_populated_needs_two_fields() {
        let fields = |n: usize| {
            let tags = ["h3", "p", "small", "em", "b"];
            let inner: String = tags[..n].iter().map(|t| format!("<{t}>value {t}</{t}>")).collect();
            Fingerprint::from_fragment(&format!(r#"<div class="card">{inner}</div>"#))
                .unwrap()
                .fields
        };
        assert_eq!(PatternFieldsRule::new(fields(1)).min_populated(), 1);
        assert_eq!(PatternFieldsRule::new(fields(2)).min_populated(), 2);
        assert_eq!(PatternFieldsRule::new(fields(5)).min_populated(), 2);
    }

    #[test]
    fn test_pattern_matches_drop_garbage_and_duplicates() {
        let sample = Fingerprint::from_fragment(
            r#"<div class="card"><h3>Name</h3><p>Body text</p></div>"#,
        )
        .unwrap();
        let rule = PatternFieldsRule::new(sample.fields.clone());
        let doc = Html::parse_document(
            r#"<main>
                <div class="card"><h3>Alice</h3><p>First post</p></div>
                <div class="card"><h3>{"json":1}</h3><p>Hidden state</p></div>
                <div class="card"><h3>Bob</h3><p>Second post</p></div>
                <div class="card"><h3>alice</h3><p>First   post</p></div>
            </main>"#,
        );
        let found = rule.matches(&sample.fingerprint, doc.root_element()).unwrap();
        let names: Vec<&str> = found.iter().map(|m| m.fields["heading"].as_str()).collect();
        assert_eq!(names, vec!["Alice", "Bob"]);
    }
}
