// Copyright 2026 Lexicon Contributors
// SPDX-License-Identifier: Apache-2.0

//! Live harvester.
//!
//! Repeatedly applies scan targets to the live document, deduplicates what
//! it finds per target and batches new records for the relay.
//!
//! ```text
//! Idle ──start──▶ Polling ──marker──▶ Active ⇄ (scan, batch, flush)
//!                    │
//!                    └──retries exhausted──▶ TimedOut
//! ```

pub mod record;
pub mod rules;
pub mod scheduler;
pub mod schemas;
pub mod session;
pub mod target;

pub use record::{HarvestRecord, OutgoingQueue, RecordId, SeenSet};
pub use scheduler::{run_session, HarvestEvent, HarvesterHandle};
pub use session::{HarvesterSession, MutationBatch, Phase};
pub use target::{ExtractionRule, ScanTarget, TargetKind};
