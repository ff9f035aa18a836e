// Copyright 2026 Lexicon Contributors
// SPDX-License-Identifier: Apache-2.0

//! Operator-committed patterns and what they scraped.
//!
//! A pattern is a named fingerprint plus the fields discovered in its
//! sample. Once committed it never changes; to alter one, delete it and
//! commit again.

pub mod service;
pub mod sqlite;
pub mod store;

pub use service::{CommitResponse, MatchResponse, PatternService, RescrapeResult, RescrapeTarget};
pub use sqlite::SqlitePatternStore;
pub use store::{MemoryPatternStore, PatternStore};

use crate::fingerprint::{FieldSpec, Fingerprint};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named, immutable structural pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pattern {
    pub name: String,
    pub fingerprint: Fingerprint,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    pub organ_id: String,
    /// RFC 3339 commit time.
    pub created_at: String,
}

/// One element scraped by a pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedItem {
    pub text: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}
