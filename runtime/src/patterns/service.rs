// Copyright 2026 Lexicon Contributors
// SPDX-License-Identifier: Apache-2.0

//! Operator-facing pattern operations: match a sample, commit it as a named
//! scrape, re-run committed scrapes, delete.
//!
//! Every operation takes the current page markup explicitly; the service
//! holds no document of its own.

use super::store::PatternStore;
use super::{Pattern, ScrapedItem};
use crate::dom::harvest_root;
use crate::error::{HarvestError, Result};
use crate::events::now_timestamp;
use crate::fingerprint::{FieldSpec, Fingerprint};
use crate::harvester::rules::PatternFieldsRule;
use crate::matcher::{match_with_fields, MatchPreview};
use scraper::Html;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Answer to a `match` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResponse {
    pub count: usize,
    pub fingerprint: Fingerprint,
    pub fields: Vec<FieldSpec>,
    pub matches: Vec<MatchPreview>,
}

/// Answer to a `commit_scrape` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitResponse {
    pub count: usize,
    pub name: String,
}

/// Which committed patterns to re-run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RescrapeTarget {
    Named(String),
    All,
}

/// One pattern's fresh scrape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RescrapeResult {
    pub name: String,
    pub count: usize,
    pub items: Vec<ScrapedItem>,
}

pub struct PatternService {
    store: Box<dyn PatternStore>,
    organ_id: String,
    harvest_roots: Vec<String>,
}

impl PatternService {
    pub fn new(store: Box<dyn PatternStore>, organ_id: &str, harvest_roots: Vec<String>) -> Self {
        Self {
            store,
            organ_id: organ_id.to_string(),
            harvest_roots,
        }
    }

    pub fn store(&self) -> &dyn PatternStore {
        self.store.as_ref()
    }

    /// Fingerprint a sample and preview its matches on the page.
    pub fn match_fragment(&self, fragment: &str, markup: &str) -> Result<MatchResponse> {
        let sample = Fingerprint::from_fragment(fragment)?;
        let document = Html::parse_document(markup);
        let root = harvest_root(&document, &self.harvest_roots);
        let report = match_with_fields(&sample.fingerprint, &sample.fields, root)?;
        Ok(MatchResponse {
            count: report.count,
            fingerprint: report.fingerprint,
            fields: sample.fields,
            matches: report.matches,
        })
    }

    /// Commit a sample under `name` and store everything it matches now.
    pub fn commit_scrape(&self, fragment: &str, name: &str, markup: &str) -> Result<(CommitResponse, Pattern)> {
        let name = name.trim();
        if name.is_empty() {
            return Err(HarvestError::InvalidParams("pattern name must not be empty".into()));
        }

        let sample = Fingerprint::from_fragment(fragment)?;
        let pattern = Pattern {
            name: name.to_string(),
            fingerprint: sample.fingerprint,
            fields: sample.fields,
            organ_id: self.organ_id.clone(),
            created_at: now_timestamp(),
        };

        let items = scrape(&pattern, markup, &self.harvest_roots)?;
        self.store.insert(&pattern)?;
        self.store.save_items(&pattern.name, &items)?;
        info!(pattern = %pattern.name, count = items.len(), "pattern committed");

        Ok((
            CommitResponse {
                count: items.len(),
                name: pattern.name.clone(),
            },
            pattern,
        ))
    }

    /// Re-run one or all committed patterns against the page.
    pub fn rescrape(&self, target: &RescrapeTarget, markup: &str) -> Result<Vec<RescrapeResult>> {
        let patterns = match target {
            RescrapeTarget::Named(name) => vec![self
                .store
                .get(name)?
                .ok_or_else(|| HarvestError::PatternNotFound(name.clone()))?],
            RescrapeTarget::All => self.store.list()?,
        };

        let mut results = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let items = scrape(&pattern, markup, &self.harvest_roots)?;
            self.store.save_items(&pattern.name, &items)?;
            results.push(RescrapeResult {
                name: pattern.name,
                count: items.len(),
                items,
            });
        }
        Ok(results)
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        if self.store.delete(name)? {
            info!(pattern = %name, "pattern deleted");
            Ok(())
        } else {
            Err(HarvestError::PatternNotFound(name.to_string()))
        }
    }
}

/// Every current match of a pattern, in page order, validated and
/// deduplicated exactly as a live pattern target sees them.
fn scrape(pattern: &Pattern, markup: &str, harvest_roots: &[String]) -> Result<Vec<ScrapedItem>> {
    let document = Html::parse_document(markup);
    let root = harvest_root(&document, harvest_roots);
    let rule = PatternFieldsRule::new(pattern.fields.clone());
    Ok(rule
        .matches(&pattern.fingerprint, root)?
        .into_iter()
        .map(|m| ScrapedItem {
            text: m.text,
            fields: m.fields,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::MemoryPatternStore;

    const PAGE: &str = r#"<html><body><div id="app">
        <div class="row item"><span>one</span></div>
        <div class="row item"><span>two</span></div>
        <div class="row item"><span>three</span></div>
        <div class="row other"><p>x</p><p>y</p></div>
    </div></body></html>"#;

    const SAMPLE: &str = r#"<div class="row item"><span>X</span></div>"#;

    fn service() -> PatternService {
        PatternService::new(
            Box::new(MemoryPatternStore::new()),
            "whatsapp",
            vec!["#app".into()],
        )
    }

    #[test]
    fn test_match_fragment() {
        let resp = service().match_fragment(SAMPLE, PAGE).unwrap();
        assert_eq!(resp.count, 3);
        assert_eq!(resp.fingerprint.classes, vec!["item", "row"]);
        assert!(resp.fields.is_empty());
        assert_eq!(resp.matches[0].text, "one");
    }

    #[test]
    fn test_match_fragment_parse_error() {
        let err = service().match_fragment("<p>a</p><p>b</p>", PAGE).unwrap_err();
        assert_eq!(err.code(), "E_PARSE");
    }

    #[test]
    fn test_commit_then_rescrape() {
        let svc = service();
        let (resp, pattern) = svc.commit_scrape(SAMPLE, "rows", PAGE).unwrap();
        assert_eq!(resp, CommitResponse { count: 3, name: "rows".into() });
        assert_eq!(pattern.organ_id, "whatsapp");
        let stored = svc.store().items("rows").unwrap();
        let texts: Vec<&str> = stored.iter().map(|i| i.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);

        let grown = PAGE.replace(
            "</div></body>",
            r#"<div class="row item"><span>four</span></div></div></body>"#,
        );
        let results = svc
            .rescrape(&RescrapeTarget::Named("rows".into()), &grown)
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].count, 4);
        assert_eq!(svc.store().items("rows").unwrap().len(), 4);
    }

    #[test]
    fn test_commit_duplicate_name_conflicts() {
        let svc = service();
        svc.commit_scrape(SAMPLE, "rows", PAGE).unwrap();
        let err = svc.commit_scrape(SAMPLE, "rows", PAGE).unwrap_err();
        assert_eq!(err.code(), "E_PATTERN_EXISTS");
    }

    #[test]
    fn test_commit_requires_name() {
        let err = service().commit_scrape(SAMPLE, "  ", PAGE).unwrap_err();
        assert_eq!(err.code(), "E_INVALID_PARAMS");
    }

    #[test]
    fn test_rescrape_all_and_missing() {
        let svc = service();
        svc.commit_scrape(SAMPLE, "a", PAGE).unwrap();
        svc.commit_scrape(r#"<div class="row other"><p>x</p><p>y</p></div>"#, "b", PAGE)
            .unwrap();
        let results = svc.rescrape(&RescrapeTarget::All, PAGE).unwrap();
        let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);

        let err = svc
            .rescrape(&RescrapeTarget::Named("nope".into()), PAGE)
            .unwrap_err();
        assert_eq!(err.code(), "E_PATTERN_NOT_FOUND");
    }

    #[test]
    fn test_delete_and_recreate() {
        let svc = service();
        svc.commit_scrape(SAMPLE, "rows", PAGE).unwrap();
        svc.delete("rows").unwrap();
        assert_eq!(svc.delete("rows").unwrap_err().code(), "E_PATTERN_NOT_FOUND");
        svc.commit_scrape(SAMPLE, "rows", PAGE).unwrap();
    }

    #[test]
    fn test_scrape_skips_garbage_and_duplicate_cards() {
        let page = r#"<html><body><div id="app">
            <div class="card"><h3>Alice</h3><p>First post</p></div>
            <div class="card"><h3>Bob</h3><p>Second post</p></div>
            <div class="card"><h3>{"json":1}</h3><p>state</p></div>
            <div class="card"><h3>Alice</h3><p>First post</p></div>
        </div></body></html>"#;
        let svc = service();
        let (resp, _) = svc
            .commit_scrape(r#"<div class="card"><h3>Name</h3><p>Body text</p></div>"#, "cards", page)
            .unwrap();
        assert_eq!(resp.count, 2);
        let stored = svc.store().items("cards").unwrap();
        let headings: Vec<&str> = stored.iter().map(|i| i.fields["heading"].as_str()).collect();
        assert_eq!(headings, vec!["Alice", "Bob"]);

        let results = svc.rescrape(&RescrapeTarget::All, page).unwrap();
        assert_eq!(results[0].count, 2);
    }
}
