// Copyright 2026 Lexicon Contributors
// SPDX-License-Identifier: Apache-2.0

//! `lexicon-harvest watch`: run a live harvester over a page file.
//!
//! Whenever the file's content changes the new markup is fed to the session
//! as a mutation batch. Records go to the HTTP relay when one is configured,
//! otherwise to stdout as JSON lines.

use crate::cli::output;
use crate::config::{resolve_store_path, HarvestConfig};
use crate::harvester::{schemas, HarvestEvent, HarvesterHandle, HarvesterSession, MutationBatch};
use crate::patterns::{PatternStore, SqlitePatternStore};
use crate::relay::{HttpRelay, Relay, StdoutRelay};
use anyhow::{Context, Result};
use scraper::{Html, Selector};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

pub async fn run(
    config: HarvestConfig,
    page: &Path,
    with_patterns: bool,
    store_path: Option<PathBuf>,
) -> Result<()> {
    let relay: Arc<dyn Relay> = match &config.relay_url {
        Some(url) => Arc::new(
            HttpRelay::new(url, config.relay_timeout()).context("invalid relay URL")?,
        ),
        None => Arc::new(StdoutRelay),
    };

    let patterns = if with_patterns {
        let path = resolve_store_path(store_path.as_deref());
        SqlitePatternStore::open(&path)
            .and_then(|store| store.list())
            .with_context(|| format!("cannot load patterns from {}", path.display()))?
    } else {
        Vec::new()
    };

    let mut session = HarvesterSession::new(config.clone(), schemas::messenger_targets());
    let mut markup = read_page(page).await;
    let mut elements = element_count(&markup);
    session.update_document(markup.clone());

    let handle = HarvesterHandle::spawn(session, relay);
    for pattern in patterns {
        info!(pattern = %pattern.name, "watching committed pattern");
        handle.send(HarvestEvent::AddPattern(pattern)).await;
    }

    let mut ticker = tokio::time::interval(config.poll_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut changes = 0usize;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            _ = ticker.tick() => {
                let next = read_page(page).await;
                if next == markup {
                    continue;
                }
                let count = element_count(&next);
                let added = count.saturating_sub(elements).max(1);
                debug!(added, elements = count, "page changed");
                markup = next;
                elements = count;
                changes += 1;
                let batch = MutationBatch {
                    added_nodes: added,
                    markup: Some(markup.clone()),
                };
                if !handle.send(HarvestEvent::Mutation(batch)).await {
                    warn!("harvester stopped");
                    break;
                }
            }
        }
    }

    let Some(session) = handle.shutdown().await else {
        anyhow::bail!("harvester task failed");
    };

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "session": session.id(),
            "phase": session.phase().to_string(),
            "changes": changes,
            "targets": session
                .targets()
                .iter()
                .map(|t| serde_json::json!({
                    "name": t.target().name,
                    "seen": t.seen_len(),
                }))
                .collect::<Vec<_>>(),
        }));
    } else if !output::is_quiet() {
        eprintln!("  Session {} ended ({})", session.id(), session.phase());
        if let Some(err) = session.failure() {
            eprintln!("  {err}");
        }
        eprintln!("  {changes} page change(s) observed");
        for target in session.targets() {
            eprintln!("    {:<24} {:>6} seen", target.target().name, target.seen_len());
        }
    }
    Ok(())
}

/// Missing or unreadable pages read as empty so the harvester keeps
/// polling for its readiness markers.
async fn read_page(page: &Path) -> String {
    match tokio::fs::read_to_string(page).await {
        Ok(markup) => markup,
        Err(e) => {
            debug!(page = %page.display(), "page not readable: {e}");
            String::new()
        }
    }
}

fn element_count(markup: &str) -> usize {
    static ANY: OnceLock<Selector> = OnceLock::new();
    let any = ANY.get_or_init(|| Selector::parse("*").expect("universal selector is valid"));
    Html::parse_document(markup).select(any).count()
}
