// Copyright 2026 Lexicon Contributors
// SPDX-License-Identifier: Apache-2.0

//! One-shot commands against a saved page: `fingerprint`, `match`, `query`,
//! `snapshot`.

use crate::cli::output;
use crate::config::HarvestConfig;
use crate::debug::{execute_query, snapshot};
use crate::fingerprint::Fingerprint;
use crate::harvester::{schemas, HarvesterSession};
use crate::patterns::{MemoryPatternStore, PatternService};
use anyhow::{Context, Result};
use scraper::Html;
use std::path::Path;
use tokio::time::Instant;

/// `lexicon-harvest fingerprint <sample>`
pub fn run_fingerprint(sample: &Path) -> Result<()> {
    let fragment = output::read_input(sample)?;
    let analysis = Fingerprint::from_fragment(&fragment).context("could not fingerprint sample")?;

    if output::is_json() {
        output::print_json(&analysis);
        return Ok(());
    }

    let fp = &analysis.fingerprint;
    println!("  tag:         {}", fp.tag);
    println!("  classes:     {}", fp.classes.join(" "));
    println!("  children:    {}", fp.child_schema.join(", "));
    println!("  attributes:  {}", fp.attributes.join(", "));
    if analysis.fields.is_empty() {
        println!("  fields:      (none)");
    } else {
        println!("  fields:");
        for field in &analysis.fields {
            println!(
                "    {:<16} {:<8} {:<40} {}",
                field.label,
                format!("{:?}", field.extract).to_lowercase(),
                field.path,
                field.example
            );
        }
    }
    Ok(())
}

/// `lexicon-harvest match --page <page> <sample>`
pub fn run_match(config: &HarvestConfig, page: &Path, sample: &Path) -> Result<()> {
    let markup = output::read_input(page)?;
    let fragment = output::read_input(sample)?;
    let service = PatternService::new(
        Box::new(MemoryPatternStore::new()),
        &config.organ_id,
        config.harvest_roots.clone(),
    );
    let resp = service.match_fragment(&fragment, &markup)?;

    if output::is_json() {
        output::print_json(&resp);
        return Ok(());
    }

    if resp.count == 0 {
        if !output::is_quiet() {
            eprintln!("  No structurally similar elements found.");
        }
        return Ok(());
    }

    eprintln!(
        "  {} match(es); showing {}:",
        resp.count,
        resp.matches.len()
    );
    for m in &resp.matches {
        println!("    [{:>4}] {:.2}  {}", m.position, m.score, m.text);
    }
    Ok(())
}

/// `lexicon-harvest query --page <page> <selector>`
pub fn run_query(page: &Path, selector: &str) -> Result<()> {
    let markup = output::read_input(page)?;
    let document = Html::parse_document(&markup);
    let result = execute_query(&document, selector);

    if output::is_json() {
        output::print_json(&result);
        return Ok(());
    }

    if let Some(error) = &result.error {
        anyhow::bail!("invalid selector '{selector}': {error}");
    }
    eprintln!("  {} element(s) match '{selector}'", result.count);
    for node in result.results.iter().flatten() {
        let id = node.id.as_deref().map(|id| format!("#{id}")).unwrap_or_default();
        let classes: String = node.classes.iter().map(|c| format!(".{c}")).collect();
        println!("    <{}{}{}> {}", node.tag, id, classes, node.text);
    }
    Ok(())
}

/// `lexicon-harvest snapshot --page <page>`: scan the page once with the
/// built-in targets and print the debug snapshot.
pub fn run_snapshot(config: &HarvestConfig, page: &Path) -> Result<()> {
    let markup = output::read_input(page)?;
    let mut session = HarvesterSession::new(config.clone(), schemas::messenger_targets());
    session.update_document(markup);
    session.start(Instant::now());

    let snap = snapshot(&session);
    if output::is_json() {
        output::print_json(&snap);
        return Ok(());
    }

    let report = &snap.scan_report;
    println!("  phase: {}   queued: {}", report.phase, report.queued);
    for marker in &report.markers {
        println!("    marker {:<40} {:>4}", marker.selector, marker.hits);
    }
    for target in &report.targets {
        println!("  target {} ({}) seen={}", target.name, target.kind, target.seen_size);
        for s in &target.strategies {
            println!("    {:<50} {:>4}", s.selector, s.hits);
        }
        for record in &target.recent {
            println!("      {} | {} | {}", record.group_key, record.subject_key, record.text);
        }
    }
    Ok(())
}
