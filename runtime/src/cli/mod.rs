// Copyright 2026 Lexicon Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI subcommand implementations for the lexicon-harvest binary.

pub mod output;
pub mod page_cmd;
pub mod serve;
pub mod watch;
