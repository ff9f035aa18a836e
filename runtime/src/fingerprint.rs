// Copyright 2026 Lexicon Contributors
// SPDX-License-Identifier: Apache-2.0

//! Structural fingerprints of sample elements.
//!
//! An operator hands the engine one example element (an outer-HTML fragment
//! copied from devtools, or an element picked on the live page). The
//! fingerprint captures just enough structure to find its siblings again:
//! the tag, a bounded sorted set of class tokens, the tags of its immediate
//! children and which "notable" attributes it carries.
//!
//! Alongside the fingerprint, [`Fingerprint::from_fragment`] walks the whole
//! sample subtree and discovers leaf **fields** (link text, image URLs,
//! timestamps, labels). Each field is addressed by a CSS path relative to the
//! container, so every structural match can later be turned into a structured
//! object instead of flat text.

use crate::dom::{self, child_elements, element_text, truncate_chars};
use crate::error::Result;
use scraper::{ElementRef, Selector};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Maximum number of class tokens kept in a fingerprint.
pub const MAX_CLASSES: usize = 10;

/// Maximum length of the immediate-child tag schema.
pub const MAX_CHILD_SCHEMA: usize = 16;

/// Attribute names whose presence on both sample and candidate earns a bonus.
pub const NOTABLE_ATTRIBUTES: [&str; 4] = ["role", "data-testid", "title", "aria-label"];

/// Maximum number of fields discovered in one sample.
const MAX_FIELDS: usize = 24;

/// Leaf text longer than this is treated as prose, not a field.
const FIELD_TEXT_LIMIT: usize = 300;

/// Extracted field values are capped at this many characters.
const FIELD_VALUE_LIMIT: usize = 500;

/// Tags whose text content is usually meaningful.
const TEXT_TAGS: &[&str] = &[
    "a", "span", "p", "h1", "h2", "h3", "h4", "h5", "h6", "label", "button", "li", "td", "th",
    "strong", "em", "b", "i", "small", "time", "relative-time", "code", "pre", "figcaption",
];

/// Tags that carry their data in an attribute.
const ATTR_TAGS: &[&str] = &["img", "a", "time", "relative-time"];

/// Subtrees that are page chrome rather than data.
const SKIP_TAGS: &[&str] = &[
    "svg", "path", "circle", "script", "style", "template", "dialog", "form", "noscript",
    "tool-tip", "include-fragment", "anchored-position",
];

/// Classes that mark screen-reader or overlay chrome.
const SKIP_CLASSES: &[&str] = &["sr-only", "visually-hidden", "octicon", "Overlay", "SelectMenu"];

/// Structural signature of one sample element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fingerprint {
    /// Lower-case tag name.
    pub tag: String,
    /// Sorted, duplicate-free class tokens (at most [`MAX_CLASSES`]).
    pub classes: Vec<String>,
    /// Tag names of the immediate element children, in order.
    pub child_schema: Vec<String>,
    /// Sorted names of the [`NOTABLE_ATTRIBUTES`] present on the sample.
    #[serde(default)]
    pub attributes: Vec<String>,
}

impl Fingerprint {
    /// Fingerprint a live or parsed element.
    pub fn from_element(el: &ElementRef<'_>) -> Self {
        let value = el.value();

        let mut classes: Vec<String> = Vec::new();
        for class in value.classes() {
            if !classes.iter().any(|c| c == class) {
                classes.push(class.to_string());
            }
            if classes.len() == MAX_CLASSES {
                break;
            }
        }
        classes.sort();

        let child_schema = child_elements(el)
            .take(MAX_CHILD_SCHEMA)
            .map(|child| child.value().name().to_string())
            .collect();

        let attributes = notable_attributes(el);

        Self {
            tag: value.name().to_ascii_lowercase(),
            classes,
            child_schema,
            attributes,
        }
    }

    /// Parse an operator-supplied fragment and analyse its single element.
    ///
    /// Fails with [`crate::HarvestError::Parse`] unless the fragment holds
    /// exactly one root element.
    pub fn from_fragment(fragment: &str) -> Result<SampleAnalysis> {
        let html = dom::parse_single_element(fragment)?;
        let el = dom::fragment_element(&html)
            .ok_or_else(|| crate::HarvestError::Parse("fragment contains no element".into()))?;
        Ok(SampleAnalysis {
            fingerprint: Self::from_element(&el),
            fields: discover_fields(&el),
        })
    }

    /// True when the sample had no classes and matching falls back to the tag.
    pub fn is_tag_only(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Names of the notable attributes present on an element, sorted.
pub fn notable_attributes(el: &ElementRef<'_>) -> Vec<String> {
    let mut names: Vec<String> = NOTABLE_ATTRIBUTES
        .iter()
        .filter(|name| el.value().attr(name).is_some())
        .map(|name| name.to_string())
        .collect();
    names.sort();
    names
}

/// What to pull out of a field's element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldExtract {
    Text,
    Src,
    Href,
    Datetime,
}

/// One extractable leaf inside a sample container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    /// Human-readable, unique label (e.g. `title`, `avatar`, `time_1`).
    pub label: String,
    /// CSS path relative to the container; empty means the container itself.
    pub path: String,
    /// Which value to extract.
    pub extract: FieldExtract,
    /// Value observed on the sample.
    pub example: String,
}

impl FieldSpec {
    /// Extract this field from a matched container. Empty values are `None`.
    pub fn extract_from(&self, container: &ElementRef<'_>) -> Option<String> {
        let target = if self.path.is_empty() {
            *container
        } else {
            let sel = Selector::parse(&self.path).ok()?;
            container.select(&sel).next()?
        };

        let value = match self.extract {
            FieldExtract::Text => truncate_chars(&element_text(&target), FIELD_VALUE_LIMIT),
            FieldExtract::Src => target.value().attr("src").unwrap_or_default().to_string(),
            FieldExtract::Href => target.value().attr("href").unwrap_or_default().to_string(),
            FieldExtract::Datetime => match target.value().attr("datetime") {
                Some(dt) => dt.to_string(),
                None => element_text(&target),
            },
        };

        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }
}

/// Extract every field of a container into a label → value map.
pub fn extract_fields(fields: &[FieldSpec], container: &ElementRef<'_>) -> BTreeMap<String, String> {
    fields
        .iter()
        .filter_map(|f| f.extract_from(container).map(|v| (f.label.clone(), v)))
        .collect()
}

/// Fingerprint plus the fields discovered in the sample's subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleAnalysis {
    pub fingerprint: Fingerprint,
    pub fields: Vec<FieldSpec>,
}

// ── Field discovery ──────────────────────────────────────────────────────────

/// Walk a sample container and discover its meaningful leaf fields.
pub fn discover_fields(root: &ElementRef<'_>) -> Vec<FieldSpec> {
    let mut walker = FieldWalker {
        root: *root,
        fields: Vec::new(),
        labels: HashMap::new(),
    };
    walker.walk(*root, 0, &[]);
    walker.fields
}

struct FieldWalker<'a> {
    root: ElementRef<'a>,
    fields: Vec<FieldSpec>,
    labels: HashMap<String, usize>,
}

impl<'a> FieldWalker<'a> {
    fn walk(&mut self, el: ElementRef<'a>, depth: usize, hints: &[String]) {
        if self.fields.len() >= MAX_FIELDS || should_skip(&el, depth) {
            return;
        }

        let tag = el.value().name();
        let own_text = dom::direct_text(&el);
        let is_leaf_text = TEXT_TAGS.contains(&tag)
            && !own_text.is_empty()
            && own_text.chars().count() < FIELD_TEXT_LIMIT;
        let has_attr_data = ATTR_TAGS.contains(&tag);

        if is_leaf_text || has_attr_data {
            self.record(&el, hints);
        }

        let mut child_hints = hints.to_vec();
        if tag != "div" && tag != "span" {
            child_hints.push(tag.to_string());
        }
        for child in child_elements(&el) {
            self.walk(child, depth + 1, &child_hints);
        }
    }

    fn record(&mut self, el: &ElementRef<'a>, hints: &[String]) {
        let tag = el.value().name();
        let label = auto_label(el, hints);
        let path = css_path(el, &self.root);

        let (extract, example) = match tag {
            "img" => (
                FieldExtract::Src,
                truncate_chars(el.value().attr("src").unwrap_or_default(), 150),
            ),
            "time" | "relative-time" => {
                let dt = match el.value().attr("datetime") {
                    Some(dt) => dt.to_string(),
                    None => element_text(el),
                };
                (FieldExtract::Datetime, truncate_chars(&dt, 60))
            }
            _ => (FieldExtract::Text, truncate_chars(&element_text(el), 100)),
        };

        if tag == "a" {
            if let Some(href) = el.value().attr("href") {
                if !href.is_empty() && !href.starts_with('#') {
                    let href_label = if label == "link" {
                        "url".to_string()
                    } else {
                        format!("{label}_url")
                    };
                    if !self.labels.contains_key(&href_label) {
                        self.labels.insert(href_label.clone(), 1);
                        self.fields.push(FieldSpec {
                            label: href_label,
                            path: path.clone(),
                            extract: FieldExtract::Href,
                            example: truncate_chars(href, 150),
                        });
                    }
                }
            }
        }

        let label = match self.labels.get_mut(&label) {
            Some(count) => {
                let numbered = format!("{label}_{count}");
                *count += 1;
                numbered
            }
            None => {
                self.labels.insert(label.clone(), 1);
                label
            }
        };

        if example.chars().count() > 1 && self.fields.len() < MAX_FIELDS {
            self.fields.push(FieldSpec {
                label,
                path,
                extract,
                example,
            });
        }
    }
}

fn should_skip(el: &ElementRef<'_>, depth: usize) -> bool {
    let value = el.value();
    if SKIP_TAGS.contains(&value.name()) {
        return true;
    }
    if value.classes().any(|c| SKIP_CLASSES.contains(&c)) {
        return true;
    }
    depth > 0 && (value.attr("hidden").is_some() || value.attr("aria-hidden") == Some("true"))
}

/// Build a CSS path from `root` (exclusive) down to `el`.
fn css_path(el: &ElementRef<'_>, root: &ElementRef<'_>) -> String {
    let mut parts = Vec::new();
    let mut current = Some(*el);
    while let Some(node) = current {
        if node == *root {
            break;
        }
        let mut part = node.value().name().to_string();
        let useful: Vec<&str> = node
            .value()
            .classes()
            .filter(|c| !c.starts_with("js-") && c.len() < 40 && is_plain_class(c))
            .take(2)
            .collect();
        for class in useful {
            part.push('.');
            part.push_str(class);
        }
        parts.push(part);
        current = node.parent().and_then(ElementRef::wrap);
    }
    parts.reverse();
    parts.join(" > ")
}

/// Classes containing selector metacharacters would need escaping; skip them.
fn is_plain_class(class: &str) -> bool {
    class
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        && !class.starts_with(|c: char| c.is_ascii_digit())
}

/// Derive a human-readable field label from context clues.
fn auto_label(el: &ElementRef<'_>, hints: &[String]) -> String {
    let value = el.value();
    let tag = value.name();

    if let Some(aria) = value.attr("aria-label").map(str::trim) {
        if !aria.is_empty() && aria.len() < 40 {
            return slug(aria);
        }
    }
    if let Some(kind) = value.attr("data-hovercard-type").filter(|k| !k.is_empty()) {
        return kind.to_string();
    }
    if let Some(prop) = value.attr("itemprop").filter(|p| !p.is_empty()) {
        return slug(prop);
    }

    let classes = value.classes().collect::<Vec<_>>().join(" ").to_lowercase();

    match tag {
        "img" => {
            let alt = value.attr("alt").unwrap_or_default().to_lowercase();
            if alt.contains("avatar") || alt.contains("profile") || classes.contains("avatar") {
                return "avatar".into();
            }
            return "image".into();
        }
        "time" | "relative-time" => return "time".into(),
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            if classes.contains("muted") || classes.contains("text-small") {
                return "meta".into();
            }
            return "heading".into();
        }
        _ => {}
    }

    if classes.contains("avatar") {
        return "avatar".into();
    }
    if classes.contains("language") {
        return "language".into();
    }
    if classes.contains("text-bold") || classes.contains("link--primary") || classes.contains("title") {
        return "title".into();
    }

    if tag == "a" {
        let href = value.attr("href").unwrap_or_default();
        if !href.is_empty() && !href.starts_with('#') && !href.starts_with("javascript") {
            return "link".into();
        }
    }
    if tag == "span" {
        return match hints.last() {
            Some(hint) if !hint.is_empty() => hint.clone(),
            _ => "text".into(),
        };
    }

    tag.to_string()
}

/// Lower-case, underscore-separated identifier of at most 30 characters.
fn slug(raw: &str) -> String {
    let mut out = String::new();
    let mut pending_sep = false;
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    truncate_chars(&out, 30)
}
