// Copyright 2026 Lexicon Contributors
// SPDX-License-Identifier: Apache-2.0

//! Small DOM helpers shared by the fingerprinting, matching, harvesting and
//! debug layers.
//!
//! Everything here is **synchronous** and operates on borrowed
//! [`scraper::ElementRef`] values. The `scraper` tree types are `!Send`, so a
//! parsed [`Html`] must never be held across an `.await`; callers parse,
//! inspect and drop it inside one synchronous call.

use crate::error::{HarvestError, Result};
use scraper::{ElementRef, Html, Selector};

/// Collapse every run of whitespace into a single space and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// All descendant text of an element, whitespace-collapsed.
pub fn element_text(el: &ElementRef<'_>) -> String {
    el.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Only the text nodes that are direct children of the element.
pub fn direct_text(el: &ElementRef<'_>) -> String {
    let parts: Vec<&str> = el
        .children()
        .filter_map(|node| node.value().as_text().map(|t| &**t))
        .collect();
    collapse_whitespace(&parts.join(" "))
}

/// Truncate to at most `max` characters (not bytes).
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Immediate element children, skipping text and comment nodes.
pub fn child_elements<'a>(el: &ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    el.children().filter_map(ElementRef::wrap)
}

/// Parse a selector, mapping failures into [`HarvestError::SelectorSyntax`].
pub fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| HarvestError::SelectorSyntax {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

/// Resolve the bounded harvest root: the first element matched by any of the
/// given selectors, or the document's root element when none match.
pub fn harvest_root<'a>(document: &'a Html, selectors: &[String]) -> ElementRef<'a> {
    for raw in selectors {
        if let Ok(sel) = Selector::parse(raw) {
            if let Some(el) = document.select(&sel).next() {
                return el;
            }
        }
    }
    document.root_element()
}

/// Parse an operator-supplied fragment that must contain exactly one element.
///
/// Whitespace and comments around the element are tolerated; stray text or
/// sibling elements are a [`HarvestError::Parse`].
pub fn parse_single_element(fragment: &str) -> Result<Html> {
    let trimmed = fragment.trim();
    if trimmed.is_empty() {
        return Err(HarvestError::Parse("empty fragment".into()));
    }

    let html = Html::parse_fragment(trimmed);
    let wrapper = html.root_element();

    let stray_text = wrapper
        .children()
        .filter_map(|node| node.value().as_text().map(|t| t.trim().to_string()))
        .any(|t| !t.is_empty());
    if stray_text {
        return Err(HarvestError::Parse(
            "fragment contains text outside its root element".into(),
        ));
    }

    match child_elements(&wrapper).count() {
        1 => Ok(html),
        0 => Err(HarvestError::Parse("fragment contains no element".into())),
        n => Err(HarvestError::Parse(format!(
            "fragment must contain exactly one root element, found {n}"
        ))),
    }
}

/// The single element of a fragment accepted by [`parse_single_element`].
pub fn fragment_element(html: &Html) -> Option<ElementRef<'_>> {
    child_elements(&html.root_element()).next()
}
