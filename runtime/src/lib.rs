// Copyright 2026 Lexicon Contributors
// SPDX-License-Identifier: Apache-2.0

//! Lexicon harvest: structural DOM harvesting.
//!
//! Fingerprint a sample element, find its structural look-alikes in a page,
//! and keep a live session that rescans on mutation, deduplicates records
//! per target and batches them to a relay.

pub mod cli;
pub mod config;
pub mod debug;
pub mod dom;
pub mod error;
pub mod events;
pub mod fingerprint;
pub mod harvester;
pub mod matcher;
pub mod patterns;
pub mod protocol;
pub mod relay;
pub mod resolver;

pub use config::HarvestConfig;
pub use error::{HarvestError, Result};
pub use events::{HarvestStatus, RelayMessage};
pub use fingerprint::{FieldSpec, Fingerprint};
pub use harvester::{HarvestEvent, HarvestRecord, HarvesterHandle, HarvesterSession};
pub use patterns::{Pattern, PatternService};
pub use relay::Relay;
