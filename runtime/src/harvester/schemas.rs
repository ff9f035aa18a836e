// Copyright 2026 Lexicon Contributors
// SPDX-License-Identifier: Apache-2.0

//! Hardcoded scan schemas for the messenger organ.
//!
//! The page ships obfuscated, frequently rotated class names, so every
//! target carries a fallback chain ending in ARIA roles and structure under
//! stable ids.

use super::rules::{ChatRowRule, MessageRule};
use super::target::{CandidateSource, ContainerKey, IdentityRule, ScanTarget, TargetKind};
use crate::resolver::Strategy;
use std::sync::Arc;

pub const CHAT_LIST: &str = "chat_list";
pub const CHAT_MESSAGES: &str = "chat_messages";

/// Selectors whose presence means the app shell has rendered.
pub fn readiness_markers() -> Vec<String> {
    vec![
        "#pane-side".into(),
        "[aria-label='Chat list']".into(),
        "div[data-testid='chat-list']".into(),
        "#side".into(),
    ]
}

/// Preferred harvest roots, most specific first.
pub fn harvest_roots() -> Vec<String> {
    vec!["#app".into(), "body".into()]
}

/// Conversation rows of the side pane.
pub fn chat_list() -> ScanTarget {
    ScanTarget {
        name: CHAT_LIST.into(),
        kind: TargetKind::List,
        source: CandidateSource::Fallback(vec![
            Strategy::selector("div._ak8l"),
            Strategy::selector("[aria-label='Chat list'] [role='listitem']"),
            Strategy::selector("#pane-side [role='listitem']"),
            Strategy::selector("#pane-side [role='row']"),
        ]),
        identity: IdentityRule {
            native_attrs: vec!["data-id".into()],
            container: ContainerKey::Fixed("chat-list".into()),
        },
        extractor: Arc::new(ChatRowRule),
        interval: TargetKind::List.default_interval(),
    }
}

/// Message bubbles of the open conversation.
pub fn chat_messages() -> ScanTarget {
    ScanTarget {
        name: CHAT_MESSAGES.into(),
        kind: TargetKind::Detail,
        source: CandidateSource::Fallback(vec![
            Strategy::selector("#main .message-in, #main .message-out"),
            Strategy::selector("#main [role='row'] [data-id]"),
            Strategy::predicate("has pre-plain-text", Some("#main div[data-id]"), |el| {
                el.descendants()
                    .filter_map(scraper::ElementRef::wrap)
                    .any(|d| d.value().attr("data-pre-plain-text").is_some())
            }),
        ]),
        identity: IdentityRule {
            native_attrs: vec!["data-id".into()],
            container: ContainerKey::Resolved {
                strategies: vec![
                    Strategy::selector("#main header span[title]"),
                    Strategy::selector("#main header [dir='auto']"),
                ],
                attr: Some("title".into()),
                fallback: "unknown".into(),
            },
        },
        extractor: Arc::new(MessageRule),
        interval: TargetKind::Detail.default_interval(),
    }
}

/// Every hardcoded target of the messenger organ.
pub fn messenger_targets() -> Vec<ScanTarget> {
    vec![chat_list(), chat_messages()]
}
