//! Ordered batch retrieval from the sequencer.

use crate::error::Result;
use crate::normalize::{normalize_batch, NormalizedBatch};
use crate::source::Sequencer;
use replica_transport::LogQuery;
use std::sync::Arc;
use tracing::debug;

/// Fetches a window of the log and validates it into ascending [`replica_types::Message`]s.
#[derive(Clone)]
pub struct MessageFetcher {
    sequencer: Arc<dyn Sequencer>,
    page_size: usize,
}

impl MessageFetcher {
    pub fn new(sequencer: Arc<dyn Sequencer>, page_size: usize) -> Self {
        Self {
            sequencer,
            page_size,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Entries with nonce in `[from_nonce, to_nonce]`, at most `page_size` of them.
    ///
    /// Callers pass `last_processed_nonce + 1`. Network and validation
    /// errors propagate; nothing is retried here.
    pub async fn fetch(
        &self,
        process_id: &str,
        from_nonce: u64,
        to_nonce: Option<u64>,
    ) -> Result<NormalizedBatch> {
        let query = LogQuery::from_nonce(from_nonce)
            .to_nonce(to_nonce)
            .limit(self.page_size);
        let page = self.sequencer.fetch_log(process_id, query).await?;
        let raw_len = page.entries.len();
        let batch = normalize_batch(process_id, page)?;
        debug!(
            process_id,
            from_nonce,
            ?to_nonce,
            entries = raw_len,
            has_next_page = batch.has_next_page,
            "fetched message batch"
        );
        Ok(batch)
    }

    /// Head nonce according to the sequencer itself.
    pub async fn latest_nonce(&self, process_id: &str) -> Result<Option<u64>> {
        Ok(self.sequencer.latest_nonce(process_id).await?)
    }
}
