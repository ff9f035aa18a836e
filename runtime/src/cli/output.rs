// Copyright 2026 Lexicon Contributors
// SPDX-License-Identifier: Apache-2.0

//! Output mode shared by every subcommand.
//!
//! `main` records the global `--json` / `--quiet` flags in the environment
//! so commands can check them without threading flags through.

use serde::Serialize;

pub fn is_json() -> bool {
    std::env::var_os("LEXICON_JSON").is_some()
}

pub fn is_quiet() -> bool {
    std::env::var_os("LEXICON_QUIET").is_some()
}

/// Pretty-print a value as JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("  Error: could not encode output: {e}"),
    }
}

/// Read a page or fragment file; `-` reads stdin.
pub fn read_input(path: &std::path::Path) -> anyhow::Result<String> {
    use anyhow::Context;
    use std::io::Read;

    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}
