// Copyright 2026 Lexicon Contributors
// SPDX-License-Identifier: Apache-2.0

//! Structural matcher and scorer.
//!
//! Given a [`Fingerprint`] and a live root, find every element that looks
//! like the sample and rank it.
//!
//! # Scoring model
//!
//! The score is a weighted sum in `[0.0, 1.0]`:
//!
//! | component | weight | measure |
//! |---|---|---|
//! | classes | 0.50 | Jaccard similarity of class sets |
//! | children | 0.35 | `1 - normalized edit distance` of immediate child tags |
//! | attributes | 0.15 | share of the sample's notable attributes present |
//!
//! A component the sample cannot express (no classes, no notable attributes)
//! is dropped and the remaining weights are renormalised, so a tag-only
//! fingerprint is judged purely on child structure.

use crate::dom::{child_elements, collapse_whitespace, element_text, truncate_chars};
use crate::error::{HarvestError, Result};
use crate::fingerprint::{extract_fields, FieldSpec, Fingerprint, MAX_CHILD_SCHEMA};
use scraper::ElementRef;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Above this many candidates the fingerprint is considered too generic.
pub const MAX_CANDIDATES: usize = 2_000;

/// Minimum score a candidate needs to count as a match.
pub const MIN_SCORE: f32 = 0.65;

/// Number of matches returned in a preview.
pub const PREVIEW_LIMIT: usize = 20;

const PREVIEW_TEXT_CHARS: usize = 200;

const CLASS_WEIGHT: f32 = 0.50;
const CHILD_WEIGHT: f32 = 0.35;
const ATTRIBUTE_WEIGHT: f32 = 0.15;

/// A scored live element. Borrowed from the parsed document, never owned.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub element: ElementRef<'a>,
    pub score: f32,
    /// Index of the element among the candidate universe, in document order.
    pub position: usize,
}

/// Lightweight, owned description of one match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchPreview {
    pub score: f32,
    pub position: usize,
    pub text: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

/// Result of matching a fingerprint against a live root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchReport {
    /// True number of matches above the threshold.
    pub count: usize,
    /// At most [`PREVIEW_LIMIT`] best matches.
    pub matches: Vec<MatchPreview>,
    pub fingerprint: Fingerprint,
}

/// Find and rank every element under `root` matching `fp`. The root
/// itself is never a candidate.
///
/// Returns all candidates at or above [`MIN_SCORE`], sorted by descending
/// score with ties in document order.
pub fn find_candidates<'a>(fp: &Fingerprint, root: ElementRef<'a>) -> Result<Vec<Candidate<'a>>> {
    let sample_classes: HashSet<&str> = fp.classes.iter().map(String::as_str).collect();

    let universe: Vec<ElementRef<'a>> = root
        .descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name().eq_ignore_ascii_case(&fp.tag))
        .filter(|el| {
            sample_classes.is_empty() || el.value().classes().any(|c| sample_classes.contains(c))
        })
        .collect();

    if universe.len() > MAX_CANDIDATES {
        return Err(HarvestError::TooManyCandidates {
            found: universe.len(),
            cap: MAX_CANDIDATES,
        });
    }

    let mut candidates: Vec<Candidate<'a>> = universe
        .into_iter()
        .enumerate()
        .map(|(position, element)| Candidate {
            element,
            score: score(fp, &element),
            position,
        })
        .filter(|c| c.score >= MIN_SCORE)
        .collect();

    // Stable sort keeps document order among equal scores.
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    Ok(candidates)
}

/// Match a fingerprint and build an owned preview report.
pub fn match_fingerprint(fp: &Fingerprint, root: ElementRef<'_>) -> Result<MatchReport> {
    match_with_fields(fp, &[], root)
}

/// Like [`match_fingerprint`], additionally extracting sample fields from
/// every previewed match.
pub fn match_with_fields(
    fp: &Fingerprint,
    fields: &[FieldSpec],
    root: ElementRef<'_>,
) -> Result<MatchReport> {
    let candidates = find_candidates(fp, root)?;
    let matches = candidates
        .iter()
        .take(PREVIEW_LIMIT)
        .map(|c| MatchPreview {
            score: c.score,
            position: c.position,
            text: preview_text(&c.element),
            fields: extract_fields(fields, &c.element),
        })
        .collect();

    Ok(MatchReport {
        count: candidates.len(),
        matches,
        fingerprint: fp.clone(),
    })
}

/// Trimmed, whitespace-collapsed, truncated text of an element.
pub fn preview_text(el: &ElementRef<'_>) -> String {
    truncate_chars(&collapse_whitespace(&element_text(el)), PREVIEW_TEXT_CHARS)
}

/// Score one element against a fingerprint.
pub fn score(fp: &Fingerprint, el: &ElementRef<'_>) -> f32 {
    let mut total = 0.0;
    let mut weight = 0.0;

    if !fp.classes.is_empty() {
        let classes: Vec<String> = el.value().classes().map(str::to_string).collect();
        total += CLASS_WEIGHT * class_jaccard(&fp.classes, &classes);
        weight += CLASS_WEIGHT;
    }

    let children: Vec<String> = child_elements(el)
        .take(MAX_CHILD_SCHEMA)
        .map(|c| c.value().name().to_string())
        .collect();
    total += CHILD_WEIGHT * child_schema_similarity(&fp.child_schema, &children);
    weight += CHILD_WEIGHT;

    if !fp.attributes.is_empty() {
        let present = fp
            .attributes
            .iter()
            .filter(|name| el.value().attr(name).is_some())
            .count();
        total += ATTRIBUTE_WEIGHT * present as f32 / fp.attributes.len() as f32;
        weight += ATTRIBUTE_WEIGHT;
    }

    total / weight
}

/// Jaccard similarity of two class-token sets. Two empty sets are identical.
pub fn class_jaccard(a: &[String], b: &[String]) -> f32 {
    let a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let b: HashSet<&str> = b.iter().map(String::as_str).collect();
    let union = a.union(&b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(&b).count() as f32 / union as f32
}

/// `1 - levenshtein(schema, actual) / max(len)` over child tag sequences.
pub fn child_schema_similarity(schema: &[String], actual: &[String]) -> f32 {
    let longest = schema.len().max(actual.len());
    if longest == 0 {
        return 1.0;
    }
    1.0 - edit_distance(schema, actual) as f32 / longest as f32
}

fn edit_distance(a: &[String], b: &[String]) -> usize {
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, x) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, y) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(x != y);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn fingerprint(fragment: &str) -> Fingerprint {
        Fingerprint::from_fragment(fragment).unwrap().fingerprint
    }

    #[test]
    fn test_class_jaccard() {
        assert_eq!(class_jaccard(&strings(&["a", "b"]), &strings(&["a", "b"])), 1.0);
        assert!((class_jaccard(&strings(&["a", "b"]), &strings(&["a", "c"])) - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(class_jaccard(&[], &[]), 1.0);
        assert_eq!(class_jaccard(&strings(&["a"]), &[]), 0.0);
    }

    #[test]
    fn test_child_schema_similarity() {
        let schema = strings(&["img", "span", "p"]);
        assert_eq!(child_schema_similarity(&schema, &schema), 1.0);
        assert!((child_schema_similarity(&schema, &strings(&["img", "p"])) - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(child_schema_similarity(&[], &[]), 1.0);
        assert_eq!(child_schema_similarity(&strings(&["span"]), &[]), 0.0);
    }

    #[test]
    fn test_row_item_matches_exclude_other_rows() {
        let mut body = String::new();
        for i in 0..5 {
            body.push_str(&format!(r#"<div class="row item"><span>Item {i}</span></div>"#));
        }
        body.push_str(r#"<div class="row other"><span>Other</span></div>"#);
        body.push_str(r#"<div class="row other"><span>Other 2</span></div>"#);
        let doc = Html::parse_document(&format!("<html><body>{body}</body></html>"));

        let fp = fingerprint(r#"<div class="row item"><span>X</span></div>"#);
        let report = match_fingerprint(&fp, doc.root_element()).unwrap();

        assert_eq!(report.count, 5);
        assert!(report.matches.iter().all(|m| !m.text.starts_with("Other")));
        assert_eq!(report.matches[0].text, "Item 0");
    }

    #[test]
    fn test_match_is_idempotent() {
        let doc = Html::parse_document(
            r#"<ul>
                <li class="msg in"><span>a</span><time>1</time></li>
                <li class="msg out"><span>b</span></li>
                <li class="msg in"><span>c</span><time>2</time></li>
            </ul>"#,
        );
        let fp = fingerprint(r#"<li class="msg in"><span>x</span><time>0</time></li>"#);
        let first = match_fingerprint(&fp, doc.root_element()).unwrap();
        let second = match_fingerprint(&fp, doc.root_element()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.count, 2);
    }

    #[test]
    fn test_ties_keep_document_order_and_better_scores_first() {
        let doc = Html::parse_document(
            r#"<div>
                <p class="card">first</p>
                <p class="card hot"><b>x</b></p>
                <p class="card">second</p>
            </div>"#,
        );
        let fp = fingerprint(r#"<p class="card">sample</p>"#);
        let candidates = find_candidates(&fp, doc.root_element()).unwrap();
        let positions: Vec<usize> = candidates.iter().map(|c| c.position).collect();
        // The two exact matches tie at 1.0 and keep document order.
        assert_eq!(positions[..2], [0, 2]);
        assert!(candidates[0].score >= candidates.last().unwrap().score);
    }

    #[test]
    fn test_no_match_is_count_zero() {
        let doc = Html::parse_document("<div><p>nothing here</p></div>");
        let fp = fingerprint(r#"<section class="feed"></section>"#);
        let report = match_fingerprint(&fp, doc.root_element()).unwrap();
        assert_eq!(report.count, 0);
        assert!(report.matches.is_empty());
    }

    #[test]
    fn test_too_many_candidates() {
        let rows = "<span class=\"x\"></span>".repeat(MAX_CANDIDATES + 1);
        let doc = Html::parse_document(&format!("<div>{rows}</div>"));
        let fp = fingerprint(r#"<span class="x"></span>"#);
        let err = match_fingerprint(&fp, doc.root_element()).unwrap_err();
        assert!(matches!(
            err,
            HarvestError::TooManyCandidates { found, cap } if found == MAX_CANDIDATES + 1 && cap == MAX_CANDIDATES
        ));
    }

    #[test]
    fn test_preview_is_capped_but_count_is_true_total() {
        let rows = r#"<li class="r"><a>x</a></li>"#.repeat(PREVIEW_LIMIT + 7);
        let doc = Html::parse_document(&format!("<ul>{rows}</ul>"));
        let fp = fingerprint(r#"<li class="r"><a>y</a></li>"#);
        let report = match_fingerprint(&fp, doc.root_element()).unwrap();
        assert_eq!(report.count, PREVIEW_LIMIT + 7);
        assert_eq!(report.matches.len(), PREVIEW_LIMIT);
    }

    #[test]
    fn test_notable_attributes_earn_bonus() {
        let doc = Html::parse_document(
            r#"<div>
                <div class="cell" role="gridcell"><span>a</span></div>
                <div class="cell"><span>b</span></div>
            </div>"#,
        );
        let fp = fingerprint(r#"<div class="cell" role="gridcell"><span>s</span></div>"#);
        let candidates = find_candidates(&fp, doc.root_element()).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].score, 1.0);
        assert!(candidates[1].score < 1.0);
    }

    #[test]
    fn test_root_is_never_a_candidate() {
        let doc = Html::parse_document(
            r#"<div class="row" id="outer"><div class="row"><span>a</span></div></div>"#,
        );
        let sel = scraper::Selector::parse("#outer").unwrap();
        let outer = doc.select(&sel).next().unwrap();
        let fp = fingerprint(r#"<div class="row"><span>x</span></div>"#);
        let candidates = find_candidates(&fp, outer).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_ne!(candidates[0].element.id(), outer.id());
    }

    #[test]
    fn test_preview_text_is_collapsed() {
        let doc = Html::parse_document("<p class='t'>  hello \n\n   world  </p>");
        let fp = fingerprint("<p class='t'>x</p>");
        let report = match_fingerprint(&fp, doc.root_element()).unwrap();
        assert_eq!(report.matches[0].text, "hello world");
    }
}
