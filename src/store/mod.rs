//! Process-wide detection state.
//!
//! The store outlives any mounted screen. Screens only read (`snapshot`,
//! `subscribe`); writes come from the capture controller and detection rounds.
mod snapshot;

pub use snapshot::{CommitOutcome, DetectionSnapshot, WriteTicket};

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use tokio::sync::watch;

use crate::{
    enrichment::IdentityEnricher,
    models::{DetectionBatch, EnrichedDetection, RawDetection},
    settings::OrderingPolicy,
};

const ENABLE_LOGS: bool = true;
const LOG_TAG: &str = "store";

use crate::log_debug;

#[derive(Clone)]
pub struct DetectionStore {
    tx: Arc<watch::Sender<DetectionSnapshot>>,
    next_seq: Arc<AtomicU64>,
    ordering: OrderingPolicy,
}

impl DetectionStore {
    pub fn new(ordering: OrderingPolicy) -> Self {
        let (tx, _rx) = watch::channel(DetectionSnapshot::default());
        Self {
            tx: Arc::new(tx),
            next_seq: Arc::new(AtomicU64::new(0)),
            ordering,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<DetectionSnapshot> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> DetectionSnapshot {
        self.tx.borrow().clone()
    }

    pub fn is_live(&self) -> bool {
        self.tx.borrow().live
    }

    pub fn raw_results(&self) -> Vec<RawDetection> {
        self.tx.borrow().batch.raw_results.clone()
    }

    pub fn enriched_results(&self) -> Vec<EnrichedDetection> {
        self.tx.borrow().batch.enriched_results.clone()
    }

    /// Marks the session live under a fresh epoch and returns it.
    pub(crate) fn go_live(&self) -> u64 {
        let mut epoch = 0;
        self.tx.send_modify(|state| {
            state.epoch += 1;
            state.live = true;
            state.batch = DetectionBatch::empty();
            state.committed_seq = 0;
            epoch = state.epoch;
        });
        epoch
    }

    /// Marks the session idle and drops the current batch. Rounds still in
    /// flight become stale.
    pub(crate) fn go_idle(&self) {
        self.tx.send_modify(|state| {
            state.epoch += 1;
            state.live = false;
            state.batch = DetectionBatch::empty();
            state.committed_seq = 0;
        });
    }

    pub(crate) fn issue_ticket(&self, epoch: u64) -> WriteTicket {
        WriteTicket {
            epoch,
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst) + 1,
        }
    }

    /// Whether a commit with this ticket would currently be accepted.
    pub(crate) fn accepts(&self, ticket: &WriteTicket) -> bool {
        self.check(&self.tx.borrow(), ticket) == CommitOutcome::Committed
    }

    /// Replaces the raw results, derives the enriched ones, and publishes both
    /// in a single write.
    pub(crate) async fn set_batch(
        &self,
        ticket: WriteTicket,
        raw: Vec<RawDetection>,
        enricher: &IdentityEnricher,
    ) -> CommitOutcome {
        if raw.is_empty() {
            return self.clear(ticket);
        }
        // Skip name lookups for a round that can no longer land.
        if !self.accepts(&ticket) {
            return self.commit(ticket, DetectionBatch::empty());
        }

        let enriched = enricher.enrich(&raw).await;
        self.commit(ticket, DetectionBatch::new(raw, enriched))
    }

    /// Empties both result lists (an empty or failed round).
    pub(crate) fn clear(&self, ticket: WriteTicket) -> CommitOutcome {
        self.commit(ticket, DetectionBatch::empty())
    }

    fn commit(&self, ticket: WriteTicket, batch: DetectionBatch) -> CommitOutcome {
        let mut outcome = CommitOutcome::Stale;
        self.tx.send_if_modified(|state| {
            outcome = self.check(state, &ticket);
            if outcome != CommitOutcome::Committed {
                return false;
            }
            state.batch = batch;
            state.committed_seq = ticket.seq;
            true
        });

        if outcome != CommitOutcome::Committed {
            log_debug!(
                "discarded round #{} (epoch {}): {:?}",
                ticket.seq,
                ticket.epoch,
                outcome
            );
        }
        outcome
    }

    fn check(&self, state: &DetectionSnapshot, ticket: &WriteTicket) -> CommitOutcome {
        if !state.live || state.epoch != ticket.epoch {
            return CommitOutcome::Stale;
        }
        match self.ordering {
            OrderingPolicy::LastWriterWins => CommitOutcome::Committed,
            OrderingPolicy::DropStale if ticket.seq > state.committed_seq => CommitOutcome::Committed,
            OrderingPolicy::DropStale => CommitOutcome::Superseded,
        }
    }
}

impl Default for DetectionStore {
    fn default() -> Self {
        Self::new(OrderingPolicy::default())
    }
}
