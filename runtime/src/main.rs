// Copyright 2026 Lexicon Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use lexicon_harvest::cli;
use lexicon_harvest::config::HarvestConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "lexicon-harvest",
    about = "Lexicon: structural DOM harvester",
    version,
    after_help = "Run 'lexicon-harvest <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit logs as JSON on stderr
    #[arg(long, global = true)]
    log_json: bool,

    /// Harvester config file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fingerprint a sample element and list its discovered fields
    Fingerprint {
        /// File holding the sample fragment ('-' for stdin)
        sample: PathBuf,
    },
    /// Find elements on a page that look like a sample
    Match {
        /// Saved page markup
        #[arg(long)]
        page: PathBuf,
        /// File holding the sample fragment ('-' for stdin)
        sample: PathBuf,
    },
    /// Run a CSS selector against a page
    Query {
        #[arg(long)]
        page: PathBuf,
        selector: String,
    },
    /// Scan a page once with the built-in targets and print a debug snapshot
    Snapshot {
        #[arg(long)]
        page: PathBuf,
    },
    /// Answer JSON-lines pattern requests on stdin
    Serve {
        /// Page file, re-read for every request
        #[arg(long)]
        page: PathBuf,
        /// Pattern database path
        #[arg(long)]
        store: Option<PathBuf>,
        /// Keep patterns in memory only
        #[arg(long, conflicts_with = "store")]
        memory: bool,
    },
    /// Harvest a page file continuously until interrupted
    Watch {
        #[arg(long)]
        page: PathBuf,
        /// Also harvest every committed pattern
        #[arg(long)]
        patterns: bool,
        /// Pattern database path
        #[arg(long)]
        store: Option<PathBuf>,
        /// Relay base URL (overrides config)
        #[arg(long)]
        relay: Option<String>,
        /// Emit periodic debug snapshots
        #[arg(long)]
        debug: bool,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

fn init_tracing(verbose: bool, log_json: bool) {
    let level = if verbose { "debug" } else { "info" };
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = format!("lexicon_harvest={level}").parse() {
        filter = filter.add_directive(directive);
    }

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global flags via environment variables so all modules can check them
    if cli.json {
        std::env::set_var("LEXICON_JSON", "1");
    }
    if cli.quiet {
        std::env::set_var("LEXICON_QUIET", "1");
    }

    init_tracing(cli.verbose, cli.log_json);

    let result = run(cli).await;

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if cli::output::is_json() {
            cli::output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        } else if !cli::output::is_quiet() {
            eprintln!("  Error: {e:#}");
        }
        std::process::exit(1);
    }

    result
}

async fn run(cli: Cli) -> Result<()> {
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "lexicon-harvest", &mut std::io::stdout());
        return Ok(());
    }

    let mut config = HarvestConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Fingerprint { sample } => cli::page_cmd::run_fingerprint(&sample),
        Commands::Match { page, sample } => cli::page_cmd::run_match(&config, &page, &sample),
        Commands::Query { page, selector } => cli::page_cmd::run_query(&page, &selector),
        Commands::Snapshot { page } => cli::page_cmd::run_snapshot(&config, &page),
        Commands::Serve {
            page,
            store,
            memory,
        } => cli::serve::run(&config, &page, store, memory).await,
        Commands::Watch {
            page,
            patterns,
            store,
            relay,
            debug,
        } => {
            if relay.is_some() {
                config.relay_url = relay;
            }
            config.debug |= debug;
            cli::watch::run(config, &page, patterns, store).await
        }
        Commands::Completions { .. } => Ok(()),
    }
}
