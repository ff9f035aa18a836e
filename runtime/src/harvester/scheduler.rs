// Copyright 2026 Lexicon Contributors
// SPDX-License-Identifier: Apache-2.0

//! The scan-scheduling loop.
//!
//! One task owns the [`HarvesterSession`]. It waits on two things only: the
//! next session deadline and the event channel. Every scan runs
//! synchronously inside the loop; relay sends are spawned and never awaited.

use super::session::{HarvesterSession, MutationBatch};
use crate::debug::QuerySlot;
use crate::patterns::Pattern;
use crate::relay::{deliver, Relay};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Input to a running harvester.
#[derive(Debug, Clone)]
pub enum HarvestEvent {
    /// The host observed DOM mutations.
    Mutation(MutationBatch),
    /// Start harvesting a newly committed pattern.
    AddPattern(Pattern),
    /// Stop harvesting the named target.
    RemoveTarget(String),
    /// Flush and end the loop.
    Shutdown,
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

fn deliver_all(relay: &Arc<dyn Relay>, session: &mut HarvesterSession) {
    for message in session.drain_outbox() {
        deliver(relay, message);
    }
}

/// Drive a session until `Shutdown` or until every event sender is gone.
/// Returns the session for inspection.
pub async fn run_session(
    mut session: HarvesterSession,
    mut events: mpsc::Receiver<HarvestEvent>,
    relay: Arc<dyn Relay>,
) -> HarvesterSession {
    session.start(Instant::now());
    deliver_all(&relay, &mut session);

    loop {
        let deadline = session.next_deadline();
        tokio::select! {
            event = events.recv() => match event {
                Some(HarvestEvent::Mutation(batch)) => {
                    debug!(added = batch.added_nodes, "mutation");
                    session.on_mutation(batch, Instant::now());
                }
                Some(HarvestEvent::AddPattern(pattern)) => {
                    session.add_pattern_target(&pattern, Instant::now());
                }
                Some(HarvestEvent::RemoveTarget(name)) => {
                    if !session.remove_target(&name) {
                        warn!(target_name = %name, "no such scan target");
                    }
                }
                Some(HarvestEvent::Shutdown) | None => {
                    session.shutdown();
                    deliver_all(&relay, &mut session);
                    break;
                }
            },
            _ = sleep_until_opt(deadline) => {
                session.advance(Instant::now());
            }
        }
        deliver_all(&relay, &mut session);
    }

    info!(session = %session.id(), "harvester loop ended");
    session
}

/// Handle to a harvester running on its own task.
pub struct HarvesterHandle {
    events: mpsc::Sender<HarvestEvent>,
    query_slot: QuerySlot,
    join: JoinHandle<HarvesterSession>,
}

impl HarvesterHandle {
    /// Spawn the scheduling loop for `session`.
    pub fn spawn(session: HarvesterSession, relay: Arc<dyn Relay>) -> Self {
        let (tx, rx) = mpsc::channel(64);
        let query_slot = session.query_slot();
        let join = tokio::spawn(run_session(session, rx, relay));
        Self {
            events: tx,
            query_slot,
            join,
        }
    }

    /// A sender for feeding events from other tasks.
    pub fn sender(&self) -> mpsc::Sender<HarvestEvent> {
        self.events.clone()
    }

    pub fn query_slot(&self) -> &QuerySlot {
        &self.query_slot
    }

    /// Send one event. Returns false once the loop has ended.
    pub async fn send(&self, event: HarvestEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    /// Ask the loop to stop and wait for it to hand back the session.
    pub async fn shutdown(self) -> Option<HarvesterSession> {
        let _ = self.events.send(HarvestEvent::Shutdown).await;
        match self.join.await {
            Ok(session) => Some(session),
            Err(e) => {
                warn!("harvester task failed: {e}");
                None
            }
        }
    }
}
