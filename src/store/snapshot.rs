use serde::Serialize;

use crate::models::{DetectionBatch, EnrichedDetection, RawDetection};

/// What every mounted screen observes.
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DetectionSnapshot {
    pub live: bool,
    pub batch: DetectionBatch,
    /// Bumped on every start and stop. Rounds dispatched under an older epoch
    /// can no longer write.
    pub epoch: u64,
    /// Sequence number of the round that produced `batch`; zero when cleared by
    /// a lifecycle transition.
    pub committed_seq: u64,
}

impl DetectionSnapshot {
    pub fn raw_results(&self) -> &[RawDetection] {
        &self.batch.raw_results
    }

    pub fn enriched_results(&self) -> &[EnrichedDetection] {
        &self.batch.enriched_results
    }
}

/// Issued when a frame is sampled; presented when its round tries to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteTicket {
    pub(crate) epoch: u64,
    pub(crate) seq: u64,
}

impl WriteTicket {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// The session stopped (or restarted) after this round was dispatched.
    Stale,
    /// A newer round already committed and the store drops older ones.
    Superseded,
}
