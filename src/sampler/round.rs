use std::sync::Arc;

use tokio::time::Instant;

use crate::{
    detection::{DetectionClient, SessionTag},
    enrichment::IdentityEnricher,
    events::{EventSink, MonitorEvent},
    models::EncodedFrame,
    store::{CommitOutcome, DetectionStore, WriteTicket},
};

const ENABLE_LOGS: bool = true;
const LOG_TAG: &str = "round";

use crate::log_debug;

/// Everything one detection round needs: submit the frame, enrich the answer,
/// publish the batch.
#[derive(Clone)]
pub struct DetectionPipeline {
    client: DetectionClient,
    enricher: IdentityEnricher,
    store: DetectionStore,
    events: Arc<dyn EventSink>,
}

impl DetectionPipeline {
    pub fn new(
        client: DetectionClient,
        enricher: IdentityEnricher,
        store: DetectionStore,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            client,
            enricher,
            store,
            events,
        }
    }

    pub fn store(&self) -> &DetectionStore {
        &self.store
    }

    pub(crate) fn issue_ticket(&self, epoch: u64) -> WriteTicket {
        self.store.issue_ticket(epoch)
    }

    /// Runs one round to completion. Nothing here is cancelled by `stop()`;
    /// the ticket decides whether the result may still land.
    pub(crate) async fn run(&self, frame: EncodedFrame, ticket: WriteTicket) -> CommitOutcome {
        let started = Instant::now();
        let tag = SessionTag::generate();

        let raw = self.client.submit(&frame, tag).await;
        let detect_ms = started.elapsed().as_millis();
        let count = raw.len();

        let outcome = self.store.set_batch(ticket, raw, &self.enricher).await;
        if outcome == CommitOutcome::Committed {
            self.events.emit(MonitorEvent::DetectionsUpdated { count });
        }

        log_debug!(
            "round #{} finished in {}ms (detect: {}ms, faces: {}, outcome: {:?})",
            ticket.seq(),
            started.elapsed().as_millis(),
            detect_ms,
            count,
            outcome
        );
        outcome
    }
}
