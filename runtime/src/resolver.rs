// Copyright 2026 Lexicon Contributors
// SPDX-License-Identifier: Apache-2.0

//! Selector fallback resolver.
//!
//! Hardcoded extraction targets survive markup renames by carrying an
//! ordered list of strategies: usually an obfuscated class first, then an
//! ARIA role, then a structural selector under a stable container id. The
//! first strategy that yields a non-empty set wins. Resolution is pure and
//! synchronous; an unparsable selector simply counts as an empty strategy.

use crate::dom::parse_selector;
use scraper::ElementRef;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Predicate over a live element.
pub type ElementPredicate = Arc<dyn Fn(&ElementRef<'_>) -> bool + Send + Sync>;

/// One way of locating elements.
#[derive(Clone)]
pub enum Strategy {
    /// A CSS selector evaluated against the root's descendants.
    Selector(String),
    /// A named predicate tested on every element matched by `scope`
    /// (or on every descendant when `scope` is `None`).
    Predicate {
        label: String,
        scope: Option<String>,
        test: ElementPredicate,
    },
}

impl Strategy {
    pub fn selector(selector: impl Into<String>) -> Self {
        Self::Selector(selector.into())
    }

    pub fn predicate<F>(label: impl Into<String>, scope: Option<&str>, test: F) -> Self
    where
        F: Fn(&ElementRef<'_>) -> bool + Send + Sync + 'static,
    {
        Self::Predicate {
            label: label.into(),
            scope: scope.map(str::to_string),
            test: Arc::new(test),
        }
    }

    /// Short human-readable name, used in scan reports.
    pub fn label(&self) -> String {
        match self {
            Self::Selector(sel) => sel.clone(),
            Self::Predicate { label, scope, .. } => match scope {
                Some(scope) => format!("{scope} :: {label}"),
                None => label.clone(),
            },
        }
    }

    /// Every element this strategy matches under `root`, in document order.
    pub fn apply<'a>(&self, root: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        match self {
            Self::Selector(raw) => match parse_selector(raw) {
                Ok(sel) => root.select(&sel).collect(),
                Err(e) => {
                    debug!("skipping strategy: {e}");
                    Vec::new()
                }
            },
            Self::Predicate { scope, test, .. } => match scope {
                Some(raw) => match parse_selector(raw) {
                    Ok(sel) => root.select(&sel).filter(|el| test(el)).collect(),
                    Err(e) => {
                        debug!("skipping strategy: {e}");
                        Vec::new()
                    }
                },
                None => root
                    .descendants()
                    .skip(1)
                    .filter_map(ElementRef::wrap)
                    .filter(|el| test(el))
                    .collect(),
            },
        }
    }
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Selector(sel) => f.debug_tuple("Selector").field(sel).finish(),
            Self::Predicate { label, scope, .. } => f
                .debug_struct("Predicate")
                .field("label", label)
                .field("scope", scope)
                .finish_non_exhaustive(),
        }
    }
}

/// Elements found by the winning strategy.
#[derive(Debug)]
pub struct Resolution<'a> {
    pub elements: Vec<ElementRef<'a>>,
    /// Index of the strategy that produced `elements`, if any did.
    pub strategy: Option<usize>,
}

/// Try each strategy in order; return the first non-empty result.
pub fn resolve<'a>(strategies: &[Strategy], root: ElementRef<'a>) -> Vec<ElementRef<'a>> {
    resolve_with_hit(strategies, root).elements
}

/// Like [`resolve`], also reporting which strategy won.
pub fn resolve_with_hit<'a>(strategies: &[Strategy], root: ElementRef<'a>) -> Resolution<'a> {
    for (idx, strategy) in strategies.iter().enumerate() {
        let elements = strategy.apply(root);
        if !elements.is_empty() {
            return Resolution {
                elements,
                strategy: Some(idx),
            };
        }
    }
    Resolution {
        elements: Vec::new(),
        strategy: None,
    }
}
